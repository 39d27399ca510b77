//! Prometheus text exposition format.
//!
//! https://prometheus.io/docs/instrumenting/exposition_formats/#text-based-format

use std::collections::BTreeMap;
use std::fmt::{Result, Write};

use crate::metric::{Metric, MetricValue, Tags};

/// Write all metrics, grouped and sorted by name.
///
/// Every series of one name must carry the same label names as the first
/// series of that name, the others are dropped since Prometheus would reject
/// the whole scrape otherwise.
pub fn encode<W: Write>(w: &mut W, metrics: &[Metric]) -> Result {
    let mut families = BTreeMap::<&str, Vec<&Metric>>::new();
    for metric in metrics {
        families.entry(metric.name()).or_default().push(metric);
    }

    for (name, series) in families {
        let Some(first) = series.first() else {
            continue;
        };

        if first.description.is_empty() {
            writeln!(w, "# HELP {}", name)?;
        } else {
            writeln!(w, "# HELP {} {}", name, escape_help(&first.description))?;
        }
        writeln!(w, "# TYPE {} {}", name, first.value.kind())?;

        for metric in &series {
            if !metric.tags().keys().eq(first.tags().keys()) {
                warn!(
                    message = "inconsistent label names, drop the series",
                    name,
                    %metric,
                );
                continue;
            }

            if metric.value.kind() != first.value.kind() {
                warn!(
                    message = "inconsistent metric type, drop the series",
                    name,
                    %metric,
                );
                continue;
            }

            write_metric(w, metric)?;
        }
    }

    Ok(())
}

fn write_metric<W: Write>(w: &mut W, metric: &Metric) -> Result {
    let name = metric.name();
    let tags = metric.tags();

    match &metric.value {
        MetricValue::Gauge(v) | MetricValue::Sum(v) => write_sample(w, name, "", tags, None, *v),
        MetricValue::Histogram {
            count,
            sum,
            buckets,
        } => {
            let mut has_inf = false;
            for bucket in buckets {
                has_inf = bucket.upper == f64::INFINITY;
                write_sample(
                    w,
                    name,
                    "_bucket",
                    tags,
                    Some(("le", bucket.upper)),
                    bucket.count as f64,
                )?;
            }

            if !has_inf {
                write_sample(
                    w,
                    name,
                    "_bucket",
                    tags,
                    Some(("le", f64::INFINITY)),
                    *count as f64,
                )?;
            }

            write_sample(w, name, "_sum", tags, None, *sum)?;
            write_sample(w, name, "_count", tags, None, *count as f64)
        }
        MetricValue::Summary {
            count,
            sum,
            quantiles,
        } => {
            for q in quantiles {
                write_sample(w, name, "", tags, Some(("quantile", q.quantile)), q.value)?;
            }

            write_sample(w, name, "_sum", tags, None, *sum)?;
            write_sample(w, name, "_count", tags, None, *count as f64)
        }
    }
}

fn write_sample<W: Write>(
    w: &mut W,
    name: &str,
    suffix: &str,
    tags: &Tags,
    extra: Option<(&str, f64)>,
    value: f64,
) -> Result {
    w.write_str(name)?;
    w.write_str(suffix)?;

    if !tags.is_empty() || extra.is_some() {
        w.write_char('{')?;

        let mut first = true;
        for (key, value) in tags.iter() {
            if !first {
                w.write_char(',')?;
            }
            first = false;

            write!(w, "{}=\"", key)?;
            write_escaped_label(w, value)?;
            w.write_char('"')?;
        }

        if let Some((key, value)) = extra {
            if !first {
                w.write_char(',')?;
            }

            write!(w, "{}=\"{}\"", key, format_value(value))?;
        }

        w.write_char('}')?;
    }

    writeln!(w, " {}", format_value(value))
}

/// Label values escape backslash, double quote and line feed.
fn write_escaped_label<W: Write>(w: &mut W, value: &str) -> Result {
    for c in value.chars() {
        match c {
            '\\' => w.write_str(r"\\")?,
            '"' => w.write_str(r#"\""#)?,
            '\n' => w.write_str(r"\n")?,
            c => w.write_char(c)?,
        }
    }

    Ok(())
}

/// Help text escapes backslash and line feed only.
fn escape_help(help: &str) -> String {
    help.replace('\\', r"\\").replace('\n', r"\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}
