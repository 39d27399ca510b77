use std::fmt::{Display, Formatter};

/// Label pairs of a metric, in the order the emitter declared them.
///
/// Prometheus doesn't care about the order, but the label names and their
/// order for one metric name never vary, which keeps the output stable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[macro_export]
macro_rules! tags {
    ( $($x:expr => $y:expr),* ) => ({
        let mut _tags = $crate::metric::Tags::default();
        $(
            _tags.insert($x, $y);
        )*
        _tags
    });
    ( $($x:expr => $y:expr,)* ) => (
        $crate::tags!{$($x => $y),*}
    );
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Bucket {
    /// upper bound in seconds, `f64::INFINITY` for the last bucket
    pub upper: f64,
    /// cumulative count of observations `<= upper`
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Quantile {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    Sum(f64),
    Gauge(f64),
    Histogram {
        count: u64,
        sum: f64,
        buckets: Vec<Bucket>,
    },
    Summary {
        count: u64,
        sum: f64,
        quantiles: Vec<Quantile>,
    },
}

impl MetricValue {
    pub fn kind(&self) -> &'static str {
        match self {
            MetricValue::Sum(_) => "counter",
            MetricValue::Gauge(_) => "gauge",
            MetricValue::Histogram { .. } => "histogram",
            MetricValue::Summary { .. } => "summary",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    name: String,
    pub description: String,
    tags: Tags,
    pub value: MetricValue,
}

impl Display for Metric {
    /// Display a metric the way it looks in the Prometheus text format,
    /// histograms and summaries only show their name and tags.
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{}", self.name)?;

        if !self.tags.is_empty() {
            write!(fmt, "{{")?;
            for (n, (k, v)) in self.tags.iter().enumerate() {
                if n != 0 {
                    write!(fmt, ",")?;
                }
                write!(fmt, "{k}=\"{v}\"")?;
            }
            write!(fmt, "}}")?;
        }

        match self.value {
            MetricValue::Sum(v) | MetricValue::Gauge(v) => write!(fmt, " {v}"),
            _ => Ok(()),
        }
    }
}

pub trait IntoF64 {
    fn into_f64(self) -> f64;
}

macro_rules! impl_intof64 {
    ($typ:ident) => {
        impl IntoF64 for $typ {
            #[inline]
            fn into_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_intof64!(usize);
impl_intof64!(i64);
impl_intof64!(u64);
impl_intof64!(f64);
impl_intof64!(u32);
impl_intof64!(i32);

impl IntoF64 for bool {
    #[inline]
    fn into_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }
}

impl IntoF64 for std::time::Duration {
    #[inline]
    fn into_f64(self) -> f64 {
        self.as_secs_f64()
    }
}

impl Metric {
    #[inline]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tags: Tags,
        value: MetricValue,
    ) -> Metric {
        Metric {
            name: name.into(),
            description: description.into(),
            tags,
            value,
        }
    }

    #[inline]
    pub fn gauge<N, D, V>(name: N, desc: D, v: V) -> Metric
    where
        N: Into<String>,
        D: Into<String>,
        V: IntoF64,
    {
        Metric::new(name, desc, Tags::default(), MetricValue::Gauge(v.into_f64()))
    }

    #[inline]
    pub fn gauge_with_tags<N, D, V>(name: N, desc: D, value: V, tags: Tags) -> Metric
    where
        N: Into<String>,
        D: Into<String>,
        V: IntoF64,
    {
        Metric::new(name, desc, tags, MetricValue::Gauge(value.into_f64()))
    }

    #[inline]
    pub fn sum<N, D, V>(name: N, desc: D, v: V) -> Metric
    where
        N: Into<String>,
        D: Into<String>,
        V: IntoF64,
    {
        Metric::new(name, desc, Tags::default(), MetricValue::Sum(v.into_f64()))
    }

    #[inline]
    pub fn sum_with_tags<N, D, V>(name: N, desc: D, value: V, tags: Tags) -> Metric
    where
        N: Into<String>,
        D: Into<String>,
        V: IntoF64,
    {
        Metric::new(name, desc, tags, MetricValue::Sum(value.into_f64()))
    }

    #[inline]
    pub fn histogram_with_tags<N, D, S>(
        name: N,
        desc: D,
        tags: Tags,
        count: u64,
        sum: S,
        buckets: Vec<Bucket>,
    ) -> Metric
    where
        N: Into<String>,
        D: Into<String>,
        S: IntoF64,
    {
        Metric::new(
            name,
            desc,
            tags,
            MetricValue::Histogram {
                count,
                sum: sum.into_f64(),
                buckets,
            },
        )
    }

    #[inline]
    pub fn summary<N, D, S>(
        name: N,
        desc: D,
        count: u64,
        sum: S,
        quantiles: Vec<Quantile>,
    ) -> Metric
    where
        N: Into<String>,
        D: Into<String>,
        S: IntoF64,
    {
        Metric::new(
            name,
            desc,
            Tags::default(),
            MetricValue::Summary {
                count,
                sum: sum.into_f64(),
                quantiles,
            },
        )
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    #[inline]
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags.get(name)
    }

    #[inline]
    pub fn insert_tag(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge() {
        let m = Metric::gauge("name", "desc", 1);
        assert_eq!(m.name(), "name");
        assert_eq!(m.description, "desc");
        assert_eq!(m.value, MetricValue::Gauge(1.0));
        assert!(m.tags().is_empty());
    }

    #[test]
    fn sum() {
        let m = Metric::sum_with_tags("name", "desc", 2, tags!("foo" => "bar"));
        assert_eq!(m.name(), "name");
        assert_eq!(m.value, MetricValue::Sum(2.0));
        assert_eq!(m.tag_value("foo"), Some("bar"));
    }

    #[test]
    fn tags_keep_insertion_order() {
        let mut tags = tags!(
            "role" => "master",
            "version" => "2.8.0",
            "git_sha1" => "",
        );
        tags.insert("version", "2.9.0");

        assert_eq!(
            tags.keys().collect::<Vec<_>>(),
            vec!["role", "version", "git_sha1"]
        );
        assert_eq!(tags.get("version"), Some("2.9.0"));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn display() {
        let m = Metric::gauge_with_tags(
            "db_keys",
            "Total number of keys by DB",
            12,
            tags!("db" => "db0"),
        );
        assert_eq!(m.to_string(), r#"db_keys{db="db0"} 12"#);
        assert_eq!(Metric::sum("up", "", true).to_string(), "up 1");
    }
}
