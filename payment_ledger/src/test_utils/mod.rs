//! Support code for tests that need a real database or a stand-in payment provider.
pub mod mock_provider;
pub mod prepare_env;
pub mod seed;
