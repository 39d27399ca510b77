use resp::{Connection, Value};

use crate::exporter::Error;
use crate::metric::Metric;

pub async fn slowlog_metrics(conn: &mut Connection) -> Result<Vec<Metric>, Error> {
    let length = match conn.execute::<i64>(&["SLOWLOG", "LEN"]).await {
        Ok(length) => length,
        Err(resp::Error::UnknownCommand(_)) => {
            debug!(message = "SLOWLOG is not supported by the server");
            return Ok(vec![]);
        }
        Err(err) => return Err(err.into()),
    };

    let last = conn.execute::<Value>(&["SLOWLOG", "GET", "1"]).await?;

    Ok(decode_slowlog(length, &last))
}

/// `SLOWLOG GET 1` returns at most one entry, which looks like
///
/// ```text
/// 1) 1) (integer) 14            id
///    2) (integer) 1309448221    timestamp
///    3) (integer) 15            duration, in microseconds
///    4) 1) "ping"               arguments
/// ```
///
/// An empty slowlog reports zero for both the id and the duration.
pub fn decode_slowlog(length: i64, last: &Value) -> Vec<Metric> {
    let entry = last
        .as_array()
        .and_then(|entries| entries.first())
        .and_then(Value::as_array)
        .unwrap_or_default();

    let last_id = entry.first().and_then(Value::as_integer).unwrap_or(0);
    let duration = entry
        .get(2)
        .and_then(Value::as_integer)
        .map(|us| us as f64 / 1e6)
        .unwrap_or(0.0);

    vec![
        Metric::gauge("slowlog_length", "Total slowlog", length),
        Metric::gauge("slowlog_last_id", "Last id of slowlog", last_id),
        Metric::gauge(
            "last_slow_execution_duration_seconds",
            "The amount of time needed for last slow execution, in seconds",
            duration,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::metric::MetricValue;

    fn values(metrics: &[Metric]) -> Vec<(&str, f64)> {
        metrics
            .iter()
            .map(|m| {
                let MetricValue::Gauge(v) = m.value else {
                    panic!("gauge expected");
                };

                (m.name(), v)
            })
            .collect()
    }

    #[test]
    fn decode() {
        let last = Value::Array(vec![Value::Array(vec![
            Value::Integer(14),
            Value::Integer(1309448221),
            Value::Integer(1500),
            Value::Array(vec![Value::Data(Bytes::from_static(b"ping"))]),
            Value::Data(Bytes::from_static(b"127.0.0.1:58217")),
            Value::Data(Bytes::new()),
        ])]);

        assert_eq!(
            values(&decode_slowlog(3, &last)),
            vec![
                ("slowlog_length", 3.0),
                ("slowlog_last_id", 14.0),
                ("last_slow_execution_duration_seconds", 0.0015),
            ]
        );
    }

    #[test]
    fn empty() {
        for last in [Value::Array(vec![]), Value::Nil] {
            assert_eq!(
                values(&decode_slowlog(0, &last)),
                vec![
                    ("slowlog_length", 0.0),
                    ("slowlog_last_id", 0.0),
                    ("last_slow_execution_duration_seconds", 0.0),
                ]
            );
        }
    }
}
