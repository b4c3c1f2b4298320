mod id_extractor;
mod keyed_locks;

pub use id_extractor::{
    charge_id_for_payment_intent,
    extract_payment_ids,
    extract_payment_ids_or,
    first_charge,
    id_of,
    json_i64,
    json_str,
    metadata_str,
    unwrap_event_object,
    ObjectKind,
};
pub use keyed_locks::{KeyGuard, KeyedLocks};
