//! Prometheus exporter for [Kvrocks](https://kvrocks.apache.org), a
//! distributed key value store compatible with the Redis protocol.
//!
//! Every scrape connects to the instance, runs a few diagnostic commands
//! (`CONFIG GET *`, `INFO`, `SLOWLOG`, optionally `CLIENT LIST`) and turns
//! their replies into metrics.

#[macro_use]
extern crate tracing;

pub mod built_info;
pub mod clients;
pub mod config;
pub mod encoding;
pub mod exporter;
pub mod http;
pub mod info;
pub mod metric;
pub mod server_config;
pub mod slowlog;
pub mod tls;
pub mod trace;
