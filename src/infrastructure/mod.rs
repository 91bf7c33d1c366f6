pub mod bootstrap_cache;
pub mod config;
pub mod error;
pub mod event_store;
pub mod logging;
pub mod ports;
