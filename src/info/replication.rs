use std::collections::BTreeMap;

use super::Error;
use crate::metric::Metric;
use crate::tags;

#[derive(Debug, PartialEq)]
pub struct ConnectedSlave<'a> {
    pub offset: f64,
    pub ip: &'a str,
    pub port: &'a str,
    pub state: &'a str,
    /// `None` for servers which don't report the lag
    pub lag: Option<f64>,
}

/// the slave line looks like
///
/// ```text
/// slave0:ip=10.254.11.1,port=6379,state=online,offset=1751844676,lag=0
/// slave1:ip=10.254.11.2,port=6379,state=online,offset=1751844222,lag=0
/// ```
pub fn parse_connected_slave<'a>(key: &str, value: &'a str) -> Result<ConnectedSlave<'a>, Error> {
    if !validate_slave_key(key) {
        return Err(Error::InvalidStatsLine("ConnectedSlave"));
    }

    let mut fields = BTreeMap::new();
    for part in value.split(',') {
        let mut kv = part.split('=');
        match (kv.next(), kv.next(), kv.next()) {
            (Some(k), Some(v), None) => {
                fields.insert(k, v);
            }
            _ => return Err(Error::InvalidStatsLine("ConnectedSlave")),
        }
    }

    let offset = fields
        .get("offset")
        .ok_or(Error::InvalidStatsLine("ConnectedSlave"))?
        .parse::<f64>()?;
    let lag = match fields.get("lag") {
        Some(lag) => Some(lag.parse::<f64>()?),
        None => None,
    };

    Ok(ConnectedSlave {
        offset,
        ip: fields.get("ip").copied().unwrap_or_default(),
        port: fields.get("port").copied().unwrap_or_default(),
        state: fields.get("state").copied().unwrap_or_default(),
        lag,
    })
}

/// `slave` followed by at least one digit
fn validate_slave_key(key: &str) -> bool {
    key.strip_prefix("slave")
        .and_then(|index| index.bytes().next())
        .is_some_and(|c| c.is_ascii_digit())
}

/// Returns `None` if the field is not a replication field this decoder
/// knows about, so the caller can try the generic tables.
pub fn handle_replication_metrics(
    master_host: &str,
    master_port: &str,
    key: &str,
    value: &str,
) -> Option<Vec<Metric>> {
    // only slaves have this field
    if key == "master_link_status" {
        return Some(vec![Metric::gauge_with_tags(
            "master_link_up",
            "Master link status on Kvrocks slave",
            value == "up",
            tags!(
                "master_host" => master_host,
                "master_port" => master_port,
            ),
        )]);
    }

    let desc = match key {
        "master_last_io_seconds_ago" => "Master last io seconds ago",
        "slave_repl_offset" => "Slave replication offset",
        "master_sync_in_progress" => "Master sync in progress",
        _ => {
            // not a slave, try extracting master metrics
            return match parse_connected_slave(key, value) {
                Ok(slave) => Some(connected_slave_metrics(&slave)),
                Err(err) => {
                    trace!(message = "not a connected slave line", key, %err);
                    None
                }
            };
        }
    };

    // a value that is not an integer is reported as 0
    let value = value.parse::<i64>().unwrap_or_else(|err| {
        debug!(message = "invalid replication field", key, value, %err);
        0
    });

    Some(vec![Metric::gauge_with_tags(
        key,
        desc,
        value,
        tags!(
            "master_host" => master_host,
            "master_port" => master_port,
        ),
    )])
}

fn connected_slave_metrics(slave: &ConnectedSlave) -> Vec<Metric> {
    let tags = tags!(
        "slave_ip" => slave.ip,
        "slave_port" => slave.port,
        "slave_state" => slave.state,
    );

    let mut metrics = vec![Metric::gauge_with_tags(
        "connected_slave_offset_bytes",
        "Offset of connected slave",
        slave.offset,
        tags.clone(),
    )];

    if let Some(lag) = slave.lag {
        metrics.push(Metric::gauge_with_tags(
            "connected_slave_lag_seconds",
            "Lag of connected slave",
            lag,
            tags,
        ));
    }

    metrics
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::metric::MetricValue;

    #[test]
    fn parse_slave() {
        for (key, value, want) in [
            (
                "slave0",
                "ip=10.254.11.1,port=6379,state=online,offset=1751844676,lag=0",
                Some(ConnectedSlave {
                    offset: 1751844676.0,
                    ip: "10.254.11.1",
                    port: "6379",
                    state: "online",
                    lag: Some(0.0),
                }),
            ),
            (
                "slave0",
                "ip=2a00:1450:400e:808::200e,port=6379,state=online,offset=1751844676,lag=0",
                Some(ConnectedSlave {
                    offset: 1751844676.0,
                    ip: "2a00:1450:400e:808::200e",
                    port: "6379",
                    state: "online",
                    lag: Some(0.0),
                }),
            ),
            (
                "slave1",
                "offset=1,lag=0",
                Some(ConnectedSlave {
                    offset: 1.0,
                    ip: "",
                    port: "",
                    state: "",
                    lag: Some(0.0),
                }),
            ),
            (
                "slave1",
                "offset=1",
                Some(ConnectedSlave {
                    offset: 1.0,
                    ip: "",
                    port: "",
                    state: "",
                    lag: None,
                }),
            ),
            (
                "slave2",
                "ip=1.2.3.4,state=online,offset=123,lag=42",
                Some(ConnectedSlave {
                    offset: 123.0,
                    ip: "1.2.3.4",
                    port: "",
                    state: "online",
                    lag: Some(42.0),
                }),
            ),
            ("slave", "offset=1751844676,lag=0", None),
            ("slaveA", "offset=1751844676,lag=0", None),
            ("slave0", "offset=abc,lag=0", None),
            ("slave0", "offset=0,lag=abc", None),
            ("slave0", "ip=1.2.3.4,lag=0", None),
            ("slave0", "offset=1,lag", None),
        ] {
            let got = parse_connected_slave(key, value).ok();
            assert_eq!(got, want, "{key}:{value}");
        }
    }

    #[test]
    fn fixed_fields() {
        let metrics =
            handle_replication_metrics("10.0.0.1", "6666", "master_link_status", "down").unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "master_link_up");
        assert_eq!(metrics[0].value, MetricValue::Gauge(0.0));
        assert_eq!(metrics[0].tag_value("master_host"), Some("10.0.0.1"));
        assert_eq!(metrics[0].tag_value("master_port"), Some("6666"));

        let metrics =
            handle_replication_metrics("10.0.0.1", "6666", "slave_repl_offset", "1024").unwrap();
        assert_eq!(metrics[0].name(), "slave_repl_offset");
        assert_eq!(metrics[0].value, MetricValue::Gauge(1024.0));

        for (key, value) in [
            ("master_last_io_seconds_ago", "1.5"),
            ("master_last_io_seconds_ago", ""),
            ("slave_repl_offset", "-"),
            ("master_sync_in_progress", "yes"),
        ] {
            let metrics = handle_replication_metrics("10.0.0.1", "6666", key, value).unwrap();
            assert_eq!(metrics.len(), 1, "{key}:{value}");
            assert_eq!(metrics[0].name(), key);
            assert_eq!(metrics[0].value, MetricValue::Gauge(0.0), "{key}:{value}");
            assert_eq!(metrics[0].tag_value("master_host"), Some("10.0.0.1"));
            assert_eq!(metrics[0].tag_value("master_port"), Some("6666"));
        }

        assert!(handle_replication_metrics("", "", "connected_slaves", "1").is_none());
    }

    #[test]
    fn connected_slave_without_lag() {
        let metrics = handle_replication_metrics(
            "",
            "",
            "slave0",
            "ip=10.0.0.2,port=6666,state=online,offset=100",
        )
        .unwrap();

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "connected_slave_offset_bytes");
        assert_eq!(
            metrics[0].tags().keys().collect::<Vec<_>>(),
            vec!["slave_ip", "slave_port", "slave_state"]
        );
    }
}
