pub mod ledger;
pub use ledger::{BatchLedger, KeySlot, KeyStatus};
