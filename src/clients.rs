use chrono::{DateTime, Utc};
use resp::Connection;

use crate::exporter::Error;
use crate::metric::{Metric, Tags};

#[derive(Debug, Default, PartialEq)]
pub struct ClientInfo<'a> {
    pub name: &'a str,
    /// unix timestamp, in seconds
    pub created_at: i64,
    /// unix timestamp, in seconds
    pub idle_since: i64,
    pub flags: &'a str,
    pub db: &'a str,
    pub omem: &'a str,
    pub cmd: &'a str,
    pub host: &'a str,
    pub port: &'a str,
}

/// A client line starts with `id=<digits> addr=<digit>`. The address must
/// begin with a digit, so a hostname or a bracketed IPv6 address (`[::1]`)
/// is rejected here even though the id check alone would accept it.
fn validate_client_line(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("id=") else {
        return false;
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }

    rest[digits..]
        .strip_prefix(" addr=")
        .and_then(|addr| addr.bytes().next())
        .is_some_and(|b| b.is_ascii_digit())
}

/// Parse one line of `CLIENT LIST`
///
/// ```text
/// id=11 addr=127.0.0.1:63508 fd=8 name= age=6321 idle=6320 flags=N db=0 sub=0 psub=0 multi=-1 qbuf=0 qbuf-free=0 obl=0 oll=0 omem=0 events=r cmd=setex
/// ```
pub fn parse_client_line(line: &str, now: i64) -> Option<ClientInfo<'_>> {
    if !validate_client_line(line) {
        return None;
    }

    let mut info = ClientInfo::default();
    for part in line.split(' ') {
        let mut kv = part.split('=');
        let (Some(key), Some(value), None) = (kv.next(), kv.next(), kv.next()) else {
            debug!(message = "invalid client list field", part);
            return None;
        };

        match key {
            "name" => info.name = value,
            "age" => info.created_at = now - value.parse::<i64>().ok()?,
            "idle" => info.idle_since = now - value.parse::<i64>().ok()?,
            "flags" => info.flags = value,
            "db" => info.db = value,
            "omem" => info.omem = value,
            "cmd" => info.cmd = value,
            "addr" => {
                let (host, port) = value.rsplit_once(':')?;
                info.host = host;
                info.port = port;
            }
            _ => {}
        }
    }

    Some(info)
}

pub fn extract_client_metrics(list: &str, now: DateTime<Utc>, include_port: bool) -> Vec<Metric> {
    let now = now.timestamp();

    list.lines()
        .filter_map(|line| parse_client_line(line.trim(), now))
        .map(|info| {
            let mut tags = Tags::default();
            tags.insert("name", info.name);
            tags.insert("created_at", info.created_at.to_string());
            tags.insert("idle_since", info.idle_since.to_string());
            tags.insert("flags", info.flags);
            tags.insert("db", info.db);
            tags.insert("omem", info.omem);
            tags.insert("cmd", info.cmd);
            tags.insert("host", info.host);
            if include_port {
                tags.insert("port", info.port);
            }

            Metric::gauge_with_tags(
                "connected_client_details",
                "Details about connected clients",
                1,
                tags,
            )
        })
        .collect()
}

pub async fn client_list_metrics(
    conn: &mut Connection,
    now: DateTime<Utc>,
    include_port: bool,
) -> Result<Vec<Metric>, Error> {
    let list = conn.execute::<String>(&["CLIENT", "LIST"]).await?;

    Ok(extract_client_metrics(&list, now, include_port))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn parse() {
        for (input, want) in [
            (
                "id=11 addr=127.0.0.1:63508 fd=8 name= age=6321 idle=6320 flags=N db=0 sub=0 psub=0 multi=-1 qbuf=0 qbuf-free=0 obl=0 oll=0 omem=0 events=r cmd=setex",
                Some(ClientInfo {
                    name: "",
                    created_at: NOW - 6321,
                    idle_since: NOW - 6320,
                    flags: "N",
                    db: "0",
                    omem: "0",
                    cmd: "setex",
                    host: "127.0.0.1",
                    port: "63508",
                }),
            ),
            (
                "id=14 addr=127.0.0.1:64958 fd=9 name=foo age=5 idle=0 flags=N db=1 sub=0 psub=0 multi=-1 qbuf=26 qbuf-free=32742 obl=0 oll=0 omem=0 events=r cmd=client",
                Some(ClientInfo {
                    name: "foo",
                    created_at: NOW - 5,
                    idle_since: NOW,
                    flags: "N",
                    db: "1",
                    omem: "0",
                    cmd: "client",
                    host: "127.0.0.1",
                    port: "64958",
                }),
            ),
            (
                "id=14 addr=127.0.0.1:64958 fd=9 name=foo age=ABCDE idle=0 flags=N db=1 cmd=client",
                None,
            ),
            (
                "id=14 addr=127.0.0.1:64958 fd=9 name=foo age=5 idle=NOPE flags=N db=1 cmd=client",
                None,
            ),
            ("id=14 addr=127.0.0.1 age=5 idle=0", None),
            ("id=14 addr=127.0.0.1:1 name=a=b", None),
            ("addr=127.0.0.1:64958 id=14", None),
            ("id=abc addr=127.0.0.1:64958", None),
            ("", None),
        ] {
            assert_eq!(parse_client_line(input, NOW), want, "{input}");
        }
    }

    #[test]
    fn validate() {
        for (input, want) in [
            ("id=1 addr=127.0.0.1:6666", true),
            ("id=42 addr=10.0.0.1:1 fd=8", true),
            ("id=1 addr=[::1]:6666", false),
            ("id=1 addr=localhost:6666", false),
            ("id=1 addr=", false),
            ("id= addr=127.0.0.1:6666", false),
            ("id=1  addr=127.0.0.1:6666", false),
            ("id=1", false),
        ] {
            assert_eq!(validate_client_line(input), want, "{input}");
        }
    }

    #[test]
    fn metrics() {
        let list = "id=11 addr=127.0.0.1:63508 fd=8 name= age=10 idle=5 flags=N db=0 omem=0 cmd=setex\n\
                    id=14 addr=127.0.0.1:64958 fd=9 name=foo age=ABCDE idle=0 flags=N db=1 omem=0 cmd=client\n";
        let now = DateTime::from_timestamp(NOW, 0).unwrap();

        let metrics = extract_client_metrics(list, now, false);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "connected_client_details");
        assert_eq!(
            metrics[0].tags().keys().collect::<Vec<_>>(),
            vec!["name", "created_at", "idle_since", "flags", "db", "omem", "cmd", "host"]
        );
        assert_eq!(metrics[0].tag_value("created_at"), Some("1699999990"));

        let metrics = extract_client_metrics(list, now, true);
        assert_eq!(metrics[0].tag_value("port"), Some("63508"));
    }
}
