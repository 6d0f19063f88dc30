//! RESP2 values, incremental parser and encoder.
//!
//! `RespParser::parse` distinguishes an incomplete frame (`Ok(None)`, read
//! more bytes) from a malformed one (`Err`), so the same code drives both the
//! blocking client and the async server connection loop.

use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    #[inline]
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    #[inline]
    pub fn simple(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    #[inline]
    pub fn err(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    #[inline]
    pub fn nil() -> Self {
        RespValue::BulkString(None)
    }

    #[inline]
    pub fn bulk(s: impl AsRef<[u8]>) -> Self {
        RespValue::BulkString(Some(s.as_ref().to_vec()))
    }

    #[inline]
    pub fn queued() -> Self {
        RespValue::SimpleString("QUEUED".to_string())
    }

    /// Array of bulk strings, the shape of every client request.
    pub fn command<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        RespValue::Array(Some(parts.into_iter().map(RespValue::bulk).collect()))
    }
}

pub struct RespParser;

type Parsed = Result<Option<(RespValue, usize)>, String>;

impl RespParser {
    /// Parse one value from the front of `input`.
    ///
    /// Returns the value and the number of bytes it occupied, `None` when the
    /// frame is not complete yet.
    pub fn parse(input: &[u8]) -> Parsed {
        if input.is_empty() {
            return Ok(None);
        }

        match input[0] {
            b'+' => Self::parse_line(input, |s| RespValue::SimpleString(s.to_string())),
            b'-' => Self::parse_line(input, |s| RespValue::Error(s.to_string())),
            b':' => Self::parse_integer(input),
            b'$' => Self::parse_bulk_string(input),
            b'*' => Self::parse_array(input),
            other => Err(format!("Unknown RESP type: {}", other as char)),
        }
    }

    /// Parse and consume one value from a buffer.
    pub fn parse_buf(buffer: &mut BytesMut) -> Result<Option<RespValue>, String> {
        match Self::parse(buffer)? {
            Some((value, consumed)) => {
                let _ = buffer.split_to(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn parse_line(input: &[u8], build: impl FnOnce(&str) -> RespValue) -> Parsed {
        match Self::find_crlf(input) {
            Some(pos) => {
                let line = String::from_utf8_lossy(&input[1..pos]);
                Ok(Some((build(&line), pos + 2)))
            }
            None => Ok(None),
        }
    }

    fn parse_header(input: &[u8]) -> Result<Option<(i64, usize)>, String> {
        match Self::find_crlf(input) {
            Some(pos) => {
                let text = std::str::from_utf8(&input[1..pos]).map_err(|e| e.to_string())?;
                let n = text.parse::<i64>().map_err(|e| e.to_string())?;
                Ok(Some((n, pos + 2)))
            }
            None => Ok(None),
        }
    }

    fn parse_integer(input: &[u8]) -> Parsed {
        Ok(Self::parse_header(input)?.map(|(n, consumed)| (RespValue::Integer(n), consumed)))
    }

    fn parse_bulk_string(input: &[u8]) -> Parsed {
        let Some((len, start)) = Self::parse_header(input)? else {
            return Ok(None);
        };

        if len == -1 {
            return Ok(Some((RespValue::BulkString(None), start)));
        }
        if len < 0 {
            return Err(format!("Invalid bulk string length: {}", len));
        }

        let end = start + len as usize;
        if end + 2 > input.len() {
            return Ok(None);
        }
        if &input[end..end + 2] != b"\r\n" {
            return Err("Bulk string not terminated by CRLF".to_string());
        }

        let data = input[start..end].to_vec();
        Ok(Some((RespValue::BulkString(Some(data)), end + 2)))
    }

    fn parse_array(input: &[u8]) -> Parsed {
        let Some((len, mut offset)) = Self::parse_header(input)? else {
            return Ok(None);
        };

        if len == -1 {
            return Ok(Some((RespValue::Array(None), offset)));
        }
        if len < 0 {
            return Err(format!("Invalid array length: {}", len));
        }

        let mut elements = Vec::with_capacity(len.min(1024) as usize);
        for _ in 0..len {
            match Self::parse(&input[offset..])? {
                Some((value, consumed)) => {
                    elements.push(value);
                    offset += consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(Some(elements)), offset)))
    }

    fn find_crlf(input: &[u8]) -> Option<usize> {
        memchr::memmem::find(input, b"\r\n")
    }

    pub fn encode(value: &RespValue) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(64);
        Self::encode_into(value, &mut buf);
        buf.to_vec()
    }

    pub fn encode_into(value: &RespValue, buf: &mut BytesMut) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                buf.put_u8(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.put_u8(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(None) => buf.extend_from_slice(b"$-1\r\n"),
            RespValue::BulkString(Some(data)) => {
                buf.put_u8(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(Some(elements)) => {
                buf.put_u8(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for element in elements {
                    Self::encode_into(element, buf);
                }
            }
        }
    }
}
