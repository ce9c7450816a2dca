//! Diagnostic store: DTC table with pending → confirmed promotion and a
//! fixed-capacity circular event log.
//!
//! The store is the fault-data back-end for every subsystem. All
//! collections are statically sized (`heapless`); nothing in here
//! allocates after construction.

pub mod events;
pub mod store;

pub use events::{EventLog, EventRecord};
pub use store::{DiagnosticStatistics, DiagnosticStore, DtcEntry};
