use std::collections::BTreeMap;

use super::{Error, extract_value};
use crate::metric::{Bucket, Metric};
use crate::tags;

#[derive(Debug, PartialEq)]
pub struct CommandStats<'a> {
    pub cmd: &'a str,
    pub calls: f64,
    /// total time spent, in microseconds
    pub usec: f64,
}

/// ```text
/// Format:
///     cmdstat_get:calls=21,usec=175,usec_per_call=8.33
///     cmdstat_set:calls=61,usec=3139,usec_per_call=51.46
///     cmdstat_setex:calls=75,usec=1260,usec_per_call=16.80
///     cmdstat_georadius_ro:calls=75,usec=1260,usec_per_call=16.80
///
/// broken up like this:
///     key   = cmdstat_get
///     value = calls=21,usec=175,usec_per_call=8.33
/// ```
pub fn parse_command_stats<'a>(key: &'a str, value: &str) -> Result<CommandStats<'a>, Error> {
    let Some(cmd) = key.strip_prefix("cmdstat_") else {
        return Err(Error::InvalidStatsLine("Commandstats"));
    };

    let parts = value.split(',').collect::<Vec<_>>();
    if parts.len() < 3 {
        return Err(Error::InvalidStatsLine("Commandstats"));
    }

    let calls = extract_value(parts[0])?;
    let usec = extract_value(parts[1])?;

    Ok(CommandStats { cmd, calls, usec })
}

#[derive(Debug, PartialEq)]
pub struct CommandHistogram<'a> {
    pub cmd: &'a str,
    pub count: u64,
    /// total time spent, in microseconds
    pub sum: u64,
    /// cumulative buckets, upper bounds in seconds and sorted ascending
    pub buckets: Vec<Bucket>,
}

/// ```text
/// Format:
///     cmdstathist_get:10=1191,20=1,50=0,70=0,100=0,150=0,inf=0,sum=12388,count=1192
///
/// broken up like this:
///     key   = cmdstathist_get
///     value = 10=1191,20=1,50=0,70=0,100=0,150=0,inf=0,sum=12388,count=1192
/// ```
///
/// Bucket boundaries are in microseconds and the counts are per bucket, the
/// returned buckets are converted to seconds and accumulated.
pub fn parse_command_histogram<'a>(
    key: &'a str,
    value: &str,
) -> Result<CommandHistogram<'a>, Error> {
    let Some(cmd) = key.strip_prefix("cmdstathist_") else {
        return Err(Error::InvalidStatsLine("Commandstats"));
    };

    let tokens = value
        .split(['=', ','])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    if tokens.len() % 2 != 0 {
        return Err(Error::UnevenHistogram);
    }

    let mut sum = 0;
    let mut count = 0;
    // f64 is not Ord, the bit pattern of positive floats sorts the same way
    let mut buckets = BTreeMap::new();
    for pair in tokens.chunks_exact(2) {
        let (k, v) = (pair[0], pair[1]);

        match k {
            "sum" => sum = v.parse::<u64>()?,
            "count" => count = v.parse::<u64>()?,
            _ => {
                let bucket_count = v.parse::<u64>()?;
                let upper = parse_boundary(k)?;

                buckets.insert(upper.to_bits(), bucket_count);
            }
        }
    }

    let mut total = 0;
    let buckets = buckets
        .into_iter()
        .map(|(upper, count)| {
            total += count;

            Bucket {
                upper: f64::from_bits(upper),
                count: total,
            }
        })
        .collect();

    Ok(CommandHistogram {
        cmd,
        count,
        sum,
        buckets,
    })
}

/// microseconds in, seconds out
fn parse_boundary(s: &str) -> Result<f64, Error> {
    let s = s.trim();
    if s == "inf" {
        return Ok(f64::INFINITY);
    }

    let upper = s.parse::<f64>()?;
    if upper.is_nan() || upper.is_sign_negative() {
        return Err(Error::InvalidValue(s.to_string()));
    }

    Ok(upper / 1e6)
}

pub fn handle_command_stats(key: &str, value: &str) -> Vec<Metric> {
    let mut metrics = Vec::with_capacity(3);

    match parse_command_stats(key, value) {
        Ok(stats) => metrics.extend([
            Metric::sum_with_tags(
                "commands_total",
                "Total number of calls per command",
                stats.calls,
                tags!(
                    "cmd" => stats.cmd,
                ),
            ),
            Metric::sum_with_tags(
                "commands_duration_seconds_total",
                "Total amount of time in seconds spent per command",
                stats.usec / 1e6,
                tags!(
                    "cmd" => stats.cmd,
                ),
            ),
        ]),
        Err(err) => trace!(message = "not a command stats line", key, %err),
    }

    match parse_command_histogram(key, value) {
        Ok(hist) => metrics.push(Metric::histogram_with_tags(
            "commands_duration_seconds",
            "Histogram of the amount of time in seconds spent per command",
            tags!(
                "cmd" => hist.cmd,
            ),
            hist.count,
            hist.sum as f64 / 1e6,
            hist.buckets,
        )),
        Err(err) => trace!(message = "not a command histogram line", key, %err),
    }

    metrics
}
