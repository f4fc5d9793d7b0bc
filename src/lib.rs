pub mod anchor;
pub mod audit;
pub mod config;
pub mod database;
pub mod error;
pub mod guard;
pub mod server;
pub mod service;

pub use error::LedgerError;
pub use service::AuditLedger;
