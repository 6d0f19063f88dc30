//! RESP parser tests - framing, incomplete input and encode/parse agreement

use super::super::{RespParser, RespValue};
use bytes::BytesMut;

fn parse_complete(input: &[u8]) -> RespValue {
    let (value, consumed) = RespParser::parse(input)
        .expect("valid RESP")
        .expect("complete frame");
    assert_eq!(consumed, input.len(), "whole frame must be consumed");
    value
}

#[test]
fn test_simple_string() {
    assert_eq!(parse_complete(b"+OK\r\n"), RespValue::ok());
    assert_eq!(parse_complete(b"+PONG\r\n"), RespValue::simple("PONG"));
}

#[test]
fn test_error() {
    assert_eq!(
        parse_complete(b"-ERR unknown command\r\n"),
        RespValue::err("ERR unknown command")
    );
}

#[test]
fn test_integer() {
    assert_eq!(parse_complete(b":0\r\n"), RespValue::Integer(0));
    assert_eq!(parse_complete(b":-1\r\n"), RespValue::Integer(-1));
}

#[test]
fn test_bulk_string() {
    assert_eq!(parse_complete(b"$5\r\nhello\r\n"), RespValue::bulk("hello"));
    assert_eq!(parse_complete(b"$0\r\n\r\n"), RespValue::bulk(""));
    assert_eq!(parse_complete(b"$-1\r\n"), RespValue::nil());
}

#[test]
fn test_bulk_string_may_contain_crlf() {
    assert_eq!(
        parse_complete(b"$7\r\n12\r\n<X>\r\n"),
        RespValue::bulk("12\r\n<X>")
    );
}

#[test]
fn test_array() {
    assert_eq!(
        parse_complete(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n"),
        RespValue::command(["GET", "foo"])
    );
    assert_eq!(parse_complete(b"*0\r\n"), RespValue::Array(Some(vec![])));
    assert_eq!(parse_complete(b"*-1\r\n"), RespValue::Array(None));
}

#[test]
fn test_incomplete_frames_need_more_bytes() {
    for input in [
        &b""[..],
        &b"+OK"[..],
        &b"$5\r\nhel"[..],
        &b"$5\r\nhello"[..],
        &b"*2\r\n$3\r\nGET\r\n"[..],
    ] {
        assert_eq!(RespParser::parse(input).unwrap(), None, "input {:?}", input);
    }
}

#[test]
fn test_malformed_frames_are_errors() {
    assert!(RespParser::parse(b"?what\r\n").is_err());
    assert!(RespParser::parse(b":abc\r\n").is_err());
    assert!(RespParser::parse(b"$3\r\nabcXY").is_err());
    assert!(RespParser::parse(b"$-5\r\n").is_err());
}

#[test]
fn test_parse_buf_consumes_pipelined_frames() {
    let mut buf = BytesMut::from(&b"+OK\r\n:42\r\n$2\r\nhi"[..]);

    assert_eq!(RespParser::parse_buf(&mut buf).unwrap(), Some(RespValue::ok()));
    assert_eq!(
        RespParser::parse_buf(&mut buf).unwrap(),
        Some(RespValue::Integer(42))
    );
    assert_eq!(RespParser::parse_buf(&mut buf).unwrap(), None);
    assert_eq!(&buf[..], b"$2\r\nhi");

    buf.extend_from_slice(b"\r\n");
    assert_eq!(
        RespParser::parse_buf(&mut buf).unwrap(),
        Some(RespValue::bulk("hi"))
    );
    assert!(buf.is_empty());
}

#[test]
fn test_encode_then_parse_nested_reply() {
    let value = RespValue::Array(Some(vec![
        RespValue::Integer(5),
        RespValue::ok(),
        RespValue::nil(),
        RespValue::Array(Some(vec![RespValue::bulk("100<X>5")])),
        RespValue::err("WRONGTYPE nope"),
    ]));
    let encoded = RespParser::encode(&value);
    assert_eq!(parse_complete(&encoded), value);
}
