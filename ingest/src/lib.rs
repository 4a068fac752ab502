pub mod api;
pub mod audit;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod endpoint;
pub mod fingerprint;
pub mod notify;
pub mod payload;
pub mod processor;
pub mod prometheus;
pub mod redact;
pub mod redis;
pub mod registry;
pub mod router;
pub mod server;
pub mod store;
pub mod time;
pub mod validate;
