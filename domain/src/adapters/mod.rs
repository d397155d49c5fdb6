//! In-process adapters that live inside the domain crate for convenience.
//!
//! These back unit tests and the local `link-check` harness. Production
//! adapters (SQL store, edge blocklist, folder ACL service) live elsewhere.

pub mod memory;
