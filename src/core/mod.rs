//! Shared primitives for the ledger: storage layout, the broker thin waist,
//! schema, configuration, anchors, errors and time.

pub mod anchor;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod schemas;
pub mod store;
pub mod time;
