//! Decode the text report of `INFO` into metrics.
//!
//! The report is a list of sections, each starts with a `# Name` header
//! and is followed by `key:value` lines.
//!
//! ```text
//! # Server
//! kvrocks_version:2.8.0
//! uptime_in_seconds:3600
//!
//! # Keyspace
//! db0:keys=12,expires=3,avg_ttl=0,expired=0
//! ```
//!
//! Nothing in here touches the network, the caller hands in the report and
//! gets un-namespaced metrics back.

mod commandstats;
mod keyspace;
mod replication;
mod rocksdb;
mod tables;

use std::collections::{BTreeMap, BTreeSet};
use std::num::{ParseFloatError, ParseIntError};

use chrono::{DateTime, Utc};

pub use commandstats::{
    CommandHistogram, CommandStats, handle_command_stats, parse_command_histogram,
    parse_command_stats,
};
pub use keyspace::{Keyspace, parse_keyspace};
pub use replication::{ConnectedSlave, handle_replication_metrics, parse_connected_slave};
pub use rocksdb::parse_rocksdb;

use crate::metric::{Metric, Tags};
use crate::tags;
use tables::{
    COUNTER_METRICS, GAUGE_METRICS, INSTANCE_INFO_FIELDS, SLAVE_INFO_FIELDS, SYSTEM_METRICS,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {0} line")]
    InvalidStatsLine(&'static str),

    #[error("invalid value {0:?}")]
    InvalidValue(String),

    #[error("uneven number of keys for bucket")]
    UnevenHistogram,

    #[error(transparent)]
    ParseFloat(#[from] ParseFloatError),

    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
}

/// Lines start with these look like headers, but they are comments.
const SKIP_PREFIXES: [&str; 3] = ["# Last DBSIZE SCAN", "# Last scan db time", "# WARN:"];

/// Parse `name=value` into value.
pub fn extract_value(s: &str) -> Result<f64, Error> {
    let mut parts = s.split('=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_name), Some(value), None) => Ok(value.parse::<f64>()?),
        _ => Err(Error::InvalidValue(s.to_string())),
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Section<'a> {
    /// before the first header
    None,
    Server,
    Clients,
    Memory,
    Persistence,
    Stats,
    Replication,
    Cpu,
    Commandstats,
    Keyspace,
    RocksDB,
    Unknown(&'a str),
}

impl<'a> Section<'a> {
    fn from_name(name: &'a str) -> Self {
        match name {
            "Server" => Section::Server,
            "Clients" => Section::Clients,
            "Memory" => Section::Memory,
            "Persistence" => Section::Persistence,
            "Stats" => Section::Stats,
            "Replication" => Section::Replication,
            "CPU" | "Cpu" => Section::Cpu,
            "Commandstats" | "CommandStats" => Section::Commandstats,
            "Keyspace" => Section::Keyspace,
            "RocksDB" => Section::RocksDB,
            _ => Section::Unknown(name),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Line<'a> {
    Header(Section<'a>),
    Field { key: &'a str, value: &'a str },
    Skip,
}

/// Classify one line of the report.
pub fn classify(line: &str) -> Line<'_> {
    let line = line.trim();

    if let Some(name) = line.strip_prefix("# ") {
        if SKIP_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            return Line::Skip;
        }

        return Line::Header(Section::from_name(name));
    }

    if line.len() < 2 {
        return Line::Skip;
    }

    // the value is whatever follows the last colon
    match line.rsplit_once(':') {
        Some((key, value)) => Line::Field { key, value },
        None => Line::Skip,
    }
}

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// export host level fields, e.g. `total_system_memory`
    pub include_system_metrics: bool,
}

/// Everything the scan remembers between lines.
struct ScanState<'a> {
    section: Section<'a>,
    fields: BTreeMap<&'a str, &'a str>,
    master_host: &'a str,
    master_port: &'a str,
    handled_dbs: BTreeSet<&'a str>,
}

/// Decode a whole INFO report, `databases` is the number of databases the
/// server is configured with, every database without a keyspace line gets
/// zero valued key gauges.
pub fn extract_info_metrics(
    info: &str,
    databases: u64,
    options: &Options,
    now: DateTime<Utc>,
) -> Vec<Metric> {
    let mut metrics = Vec::with_capacity(128);
    let mut state = ScanState {
        section: Section::None,
        fields: BTreeMap::new(),
        master_host: "",
        master_port: "",
        handled_dbs: BTreeSet::new(),
    };

    for line in info.lines() {
        let (key, value) = match classify(line) {
            Line::Header(section) => {
                state.section = section;
                continue;
            }
            Line::Field { key, value } => (key, value),
            Line::Skip => continue,
        };

        state.fields.insert(key, value);
        match key {
            "master_host" => state.master_host = value,
            "master_port" => state.master_port = value,
            _ => {}
        }

        match state.section {
            Section::Replication => {
                if let Some(partial) = handle_replication_metrics(
                    state.master_host,
                    state.master_port,
                    key,
                    value,
                ) {
                    metrics.extend(partial);
                    continue;
                }
            }

            Section::Server => {
                if let Some(metric) = handle_server_metrics(key, value, now) {
                    metrics.push(metric);
                }
            }

            Section::Commandstats => {
                metrics.extend(handle_command_stats(key, value));
                continue;
            }

            Section::Keyspace => match parse_keyspace(key, value) {
                Ok(keyspace) => {
                    metrics.extend(keyspace_metrics(key, &keyspace));
                    state.handled_dbs.insert(key);
                    continue;
                }
                Err(err) => {
                    debug!(message = "invalid keyspace line", key, value, %err);
                }
            },

            Section::RocksDB => {
                if let Some(metric) = parse_rocksdb(key, value) {
                    metrics.push(metric);
                }
            }

            _ => {}
        }

        if let Some(metric) = parse_generic(key, value, options) {
            metrics.push(metric);
        }
    }

    for index in 0..databases {
        let db = format!("db{index}");
        if state.handled_dbs.contains(db.as_str()) {
            continue;
        }

        metrics.extend(keyspace_metrics(
            &db,
            &Keyspace {
                keys: 0.0,
                expires: 0.0,
                avg_ttl: None,
                expired: 0.0,
            },
        ));
    }

    metrics.push(Metric::gauge_with_tags(
        "instance_info",
        "Information about the kvrocks instance",
        1,
        labels_from_fields(&state.fields, &INSTANCE_INFO_FIELDS),
    ));

    if state.fields.get("role") == Some(&"slave") {
        metrics.push(Metric::gauge_with_tags(
            "slave_info",
            "Information about the Kvrocks slave",
            1,
            labels_from_fields(&state.fields, &SLAVE_INFO_FIELDS),
        ));
    }

    metrics
}

fn labels_from_fields(fields: &BTreeMap<&str, &str>, labels: &[(&str, &str)]) -> Tags {
    let mut tags = Tags::default();
    for (label, field) in labels {
        tags.insert(*label, fields.get(field).copied().unwrap_or_default());
    }

    tags
}

fn handle_server_metrics(key: &str, value: &str, now: DateTime<Utc>) -> Option<Metric> {
    if key != "uptime_in_seconds" {
        return None;
    }

    match value.parse::<f64>() {
        Ok(uptime) => Some(Metric::gauge(
            "start_time_seconds",
            "Start time of the kvrocks instance since unix epoch in seconds.",
            now.timestamp() as f64 - uptime,
        )),
        Err(err) => {
            debug!(message = "invalid uptime", value, %err);
            None
        }
    }
}

fn keyspace_metrics(db: &str, keyspace: &Keyspace) -> Vec<Metric> {
    let mut metrics = vec![
        Metric::gauge_with_tags(
            "db_keys",
            "Total number of keys by DB",
            keyspace.keys,
            tags!(
                "db" => db,
            ),
        ),
        Metric::gauge_with_tags(
            "db_keys_expiring",
            "Total number of expiring keys by DB",
            keyspace.expires,
            tags!(
                "db" => db,
            ),
        ),
        Metric::gauge_with_tags(
            "db_keys_expired",
            "Total number of expired keys by DB",
            keyspace.expired,
            tags!(
                "db" => db,
            ),
        ),
    ];

    if let Some(avg_ttl) = keyspace.avg_ttl {
        metrics.push(Metric::gauge_with_tags(
            "db_avg_ttl_seconds",
            "Avg TTL in seconds",
            avg_ttl,
            tags!(
                "db" => db,
            ),
        ));
    }

    metrics
}

fn parse_generic(key: &str, value: &str, options: &Options) -> Option<Metric> {
    let gauge = GAUGE_METRICS.get(key).or_else(|| {
        if options.include_system_metrics {
            SYSTEM_METRICS.get(key)
        } else {
            None
        }
    });
    let counter = COUNTER_METRICS.get(key);
    if gauge.is_none() && counter.is_none() {
        return None;
    }

    let value = match value {
        "ok" | "true" => 1.0,
        "err" | "fail" | "false" => 0.0,
        _ => match value.parse::<f64>() {
            Ok(value) => value,
            Err(err) => {
                debug!(message = "invalid metric value", key, value, %err);
                return None;
            }
        },
    };

    if let Some((name, desc)) = gauge {
        return Some(Metric::gauge(*name, *desc, value));
    }

    counter.map(|(name, desc)| Metric::sum(*name, *desc, value))
}
