mod command_def;
mod command_handler;
mod config;

pub use command_def::ReconcileParams;
pub use command_handler::{handle_dedup_command, handle_reconcile_command};
pub use config::ReconcilerConfig;
