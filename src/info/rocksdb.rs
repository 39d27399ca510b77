use super::tables::ROCKSDB_FAMILIES;
use crate::metric::Metric;
use crate::tags;

/// Decode one field of the `# RocksDB` section, there are two shapes
///
/// ```text
/// block_cache_usage:0
/// estimate_keys[default]:0
/// ```
///
/// The first one is shared by all column families, the second one carries
/// the column family in brackets.
pub fn parse_rocksdb(key: &str, value: &str) -> Option<Metric> {
    if key == "block_cache_usage" {
        let value = value.parse::<f64>().ok()?;

        return Some(Metric::gauge_with_tags(
            key,
            ROCKSDB_FAMILIES[0].1,
            value,
            tags!(
                "column_family" => "-",
            ),
        ));
    }

    for (prefix, desc) in ROCKSDB_FAMILIES {
        if !key.starts_with(prefix) {
            continue;
        }

        let mut parts = key.split('[');
        let (Some(name), Some(family), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };

        let value = value.parse::<f64>().ok()?;
        return Some(Metric::gauge_with_tags(
            name.trim_end_matches(':'),
            desc,
            value,
            tags!(
                "column_family" => family.trim_end_matches(']'),
            ),
        ));
    }

    None
}
