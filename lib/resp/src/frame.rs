use std::collections::BTreeMap;

use bytes::Bytes;

use crate::Error;

/// A RESP2 frame borrowed from the read buffer.
#[cfg_attr(test, derive(PartialEq))]
#[derive(Clone, Debug)]
pub enum Frame<'a> {
    Simple(&'a str),
    Error(&'a str),
    Integer(i64),
    Bulk(&'a [u8]),
    Null,
    Array(Vec<Frame<'a>>),
}

impl Frame<'_> {
    /// Zero copy parser, `Ok(None)` means more data is needed.
    ///
    /// https://redis.io/docs/latest/develop/reference/protocol-spec/
    #[inline]
    pub fn parse(buf: &[u8]) -> Result<Option<Frame<'_>>, Error> {
        Frame::parse_with_pos(buf, &mut 0)
    }

    fn parse_with_pos<'a>(buf: &'a [u8], pos: &mut usize) -> Result<Option<Frame<'a>>, Error> {
        // the shortest frame is an empty simple string `+\r\n`
        if buf.len().saturating_sub(*pos) < 1 + 2 {
            return Ok(None);
        }

        let typ = buf[*pos];
        *pos += 1;

        match typ {
            b'+' => match read_until_crlf(buf, pos) {
                Some((start, end)) => {
                    let s = std::str::from_utf8(&buf[start..end])?;

                    Ok(Some(Frame::Simple(s)))
                }
                None => Ok(None),
            },
            b'-' => match read_until_crlf(buf, pos) {
                Some((start, end)) => {
                    let s = std::str::from_utf8(&buf[start..end])?;

                    Ok(Some(Frame::Error(s)))
                }
                None => Ok(None),
            },
            b':' => match read_until_crlf(buf, pos) {
                Some((start, end)) => {
                    let s = std::str::from_utf8(&buf[start..end])?;

                    Ok(Some(Frame::Integer(s.parse::<i64>()?)))
                }
                None => Ok(None),
            },
            b'$' => {
                let Some((start, end)) = read_until_crlf(buf, pos) else {
                    return Ok(None);
                };

                let header = &buf[start..end];
                if header.first() == Some(&b'-') {
                    if header != b"-1" {
                        return Err(Error::Server("protocol error".to_string()));
                    }

                    return Ok(Some(Frame::Null));
                }

                let len = std::str::from_utf8(header)?.parse::<usize>()?;
                let Some(total) = len.checked_add(2) else {
                    return Err(Error::Parse(format!("invalid bulk length {len}")));
                };
                if buf.len() - *pos < total {
                    return Ok(None);
                }

                let data = &buf[*pos..*pos + len];
                *pos += total;

                Ok(Some(Frame::Bulk(data)))
            }
            b'*' => {
                let Some((start, end)) = read_until_crlf(buf, pos) else {
                    return Ok(None);
                };

                let header = &buf[start..end];
                if header == b"-1" {
                    return Ok(Some(Frame::Null));
                }

                let len = std::str::from_utf8(header)?.parse::<usize>()?;
                // every element takes at least one byte, so the remaining
                // input bounds the allocation
                let mut frames = Vec::with_capacity(len.min(buf.len() - *pos));
                for _ in 0..len {
                    match Frame::parse_with_pos(buf, pos)? {
                        Some(frame) => frames.push(frame),
                        None => return Ok(None),
                    }
                }

                Ok(Some(Frame::Array(frames)))
            }
            _ => Err(Error::UnknownFrameType),
        }
    }
}

#[inline]
fn read_until_crlf(buf: &[u8], pos: &mut usize) -> Option<(usize, usize)> {
    let start = *pos;
    let len = buf[start..]
        .windows(2)
        .position(|window| window == b"\r\n")?;

    *pos += len + 2;

    Some((start, start + len))
}

/// Owned reply, for commands whose reply shape is heterogeneous, e.g.
/// `SLOWLOG GET` which mixes integers, bulk strings and nested arrays.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Integer(i64),
    Status(String),
    Data(Bytes),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }
}

pub trait FromFrame: Sized {
    fn from_frame(frame: Frame) -> Result<Self, Error>;
}

impl FromFrame for () {
    fn from_frame(_: Frame) -> Result<(), Error> {
        Ok(())
    }
}

impl FromFrame for i64 {
    fn from_frame(frame: Frame) -> Result<Self, Error> {
        match frame {
            Frame::Integer(value) => Ok(value),
            _ => Err(Error::UnexpectedFrame("integer")),
        }
    }
}

impl FromFrame for String {
    fn from_frame(frame: Frame) -> Result<Self, Error> {
        match frame {
            Frame::Simple(s) => Ok(s.to_string()),
            Frame::Bulk(b) => String::from_utf8(b.to_vec())
                .map_err(|_err| Error::Server("invalid utf8 bulk".to_string())),
            // `INFO` of some proxies answer nil instead of an empty string
            Frame::Null => Ok(String::new()),
            _ => Err(Error::UnexpectedFrame("string")),
        }
    }
}

impl FromFrame for Bytes {
    fn from_frame(frame: Frame) -> Result<Self, Error> {
        match frame {
            Frame::Simple(s) => Ok(Bytes::from(s.as_bytes().to_vec())),
            Frame::Bulk(b) => Ok(Bytes::from(b.to_vec())),
            _ => Err(Error::UnexpectedFrame("bulk")),
        }
    }
}

impl FromFrame for Value {
    fn from_frame(frame: Frame) -> Result<Self, Error> {
        let value = match frame {
            Frame::Simple(s) => Value::Status(s.to_string()),
            Frame::Error(err) => return Err(Error::Server(err.to_string())),
            Frame::Integer(i) => Value::Integer(i),
            Frame::Bulk(b) => Value::Data(Bytes::from(b.to_vec())),
            Frame::Null => Value::Nil,
            Frame::Array(frames) => Value::Array(
                frames
                    .into_iter()
                    .map(Value::from_frame)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        Ok(value)
    }
}

impl<T: FromFrame> FromFrame for Vec<T> {
    fn from_frame(frame: Frame) -> Result<Self, Error> {
        match frame {
            Frame::Array(arr) => arr
                .into_iter()
                .map(FromFrame::from_frame)
                .collect::<Result<Vec<T>, Error>>(),
            Frame::Null => Ok(vec![]),
            _ => Err(Error::UnexpectedFrame("array")),
        }
    }
}

impl FromFrame for BTreeMap<String, String> {
    fn from_frame(frame: Frame) -> Result<Self, Error> {
        let Frame::Array(arr) = frame else {
            return Err(Error::UnexpectedFrame("array"));
        };

        if arr.len() % 2 != 0 {
            return Err(Error::Parse(
                "array length is not divisible by 2".to_string(),
            ));
        }

        let mut map = BTreeMap::new();
        let mut arr = arr.into_iter();
        while let (Some(key), Some(value)) = (arr.next(), arr.next()) {
            map.insert(String::from_frame(key)?, String::from_frame(value)?);
        }

        Ok(map)
    }
}
