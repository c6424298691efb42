//! Ledger subsystems.

pub mod archive;
pub mod checkpoint;
pub mod coordinator;
pub mod drift;
pub mod goals;
pub mod phase;
pub mod recovery;
pub mod session;
