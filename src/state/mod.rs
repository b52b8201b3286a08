//! Vault state record.
//!
//! Persists which machine holds a writable mount of a vault and whether a
//! backup is pending, as a small JSON document per vault name.

pub mod record;

pub use record::{state_path, SaveOutcome, StateRecord, VaultState, SCHEMA_VERSION};
