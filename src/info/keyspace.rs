use super::{Error, extract_value};

#[derive(Debug, PartialEq)]
pub struct Keyspace {
    pub keys: f64,
    pub expires: f64,
    /// average TTL in seconds, `None` when the server doesn't report it
    pub avg_ttl: Option<f64>,
    pub expired: f64,
}

/// valid examples:
///
/// ```text
/// db0:keys=1,expires=0,avg_ttl=0
/// db0:keys=1,expires=10,avg_ttl=0,expired=2
/// ```
pub fn parse_keyspace(key: &str, value: &str) -> Result<Keyspace, Error> {
    if !key.starts_with("db") {
        return Err(Error::InvalidStatsLine("Keyspace"));
    }

    let parts = value.split(',').collect::<Vec<_>>();
    if parts.len() < 2 || parts.len() > 4 {
        return Err(Error::InvalidStatsLine("Keyspace"));
    }

    let keys = extract_value(parts[0])?;
    let expires = extract_value(parts[1])?;
    let avg_ttl = match parts.get(2) {
        Some(part) => Some(extract_value(part)? / 1000.0),
        None => None,
    };
    let expired = match parts.get(3) {
        Some(part) => extract_value(part)?,
        None => 0.0,
    };

    Ok(Keyspace {
        keys,
        expires,
        avg_ttl,
        expired,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        for (key, value, want) in [
            ("xxx", "", None),
            ("xxx", "keys=1,expires=0,avg_ttl=0", None),
            ("db0", "xxx", None),
            ("db1", "keys=abcd,expires=0,avg_ttl=0", None),
            ("db2", "keys=1234=1234,expires=0,avg_ttl=0", None),
            ("db3", "keys=abcde,expires=0", None),
            ("db3", "keys=213,expires=xxx", None),
            ("db3", "keys=123,expires=0,avg_ttl=zzz", None),
            ("db3", "keys=1,expires=0,avg_ttl=0,expired=0,foo=1", None),
            (
                "db0",
                "keys=22113592,expires=21683101,avg_ttl=3816396,expired=340250",
                Some(Keyspace {
                    keys: 22113592.0,
                    expires: 21683101.0,
                    avg_ttl: Some(3816.396),
                    expired: 340250.0,
                }),
            ),
            (
                "db0",
                "keys=1,expires=0,avg_ttl=0",
                Some(Keyspace {
                    keys: 1.0,
                    expires: 0.0,
                    avg_ttl: Some(0.0),
                    expired: 0.0,
                }),
            ),
            (
                "db1",
                "keys=100,expires=50",
                Some(Keyspace {
                    keys: 100.0,
                    expires: 50.0,
                    avg_ttl: None,
                    expired: 0.0,
                }),
            ),
        ] {
            let got = parse_keyspace(key, value).ok();
            assert_eq!(got, want, "{key}:{value}");
        }
    }
}
