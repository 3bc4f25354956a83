//! Minimal RESP2 wire support. spec.md lists the wire codec as an external
//! collaborator; this module is the smallest amount of it needed to drive a
//! `Commander` end to end, in the teacher's `RespBuilderV2` idiom
//! (`add_array_len`, `add_bulk_string`, `number`, `error_string`).

use bytes::{Buf, BytesMut};
use std::fmt::Write as _;

/// The reply kinds a commander can produce. Integer, bulk, multi-bulk,
/// array, and status are the only kinds used client-facing (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Status(String),
    Integer(i64),
    Double(f64),
    Nil,
    Bulk(bytes::Bytes),
    Array(Vec<Reply>),
    Error(String),
}

impl Reply {
    pub fn from_bytes(b: impl Into<bytes::Bytes>) -> Self {
        Reply::Bulk(b.into())
    }

    pub fn array_of_bulks<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = Option<B>>,
        B: Into<bytes::Bytes>,
    {
        Reply::Array(
            items
                .into_iter()
                .map(|o| match o {
                    Some(b) => Reply::Bulk(b.into()),
                    None => Reply::Nil,
                })
                .collect(),
        )
    }
}

/// Encodes a `Reply` into RESP2 bytes, mirroring `RespBuilderV2`'s
/// `add_*` methods but operating on the higher-level `Reply` enum instead of
/// raw buffer pokes everywhere a commander needs a reply.
#[derive(Default)]
pub struct RespBuilder;

impl RespBuilder {
    pub fn encode(&self, reply: &Reply, out: &mut BytesMut) {
        match reply {
            Reply::Ok => out.extend_from_slice(b"+OK\r\n"),
            Reply::Status(s) => {
                out.extend_from_slice(b"+");
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Integer(n) => {
                out.extend_from_slice(b":");
                let mut tmp = String::new();
                let _ = write!(tmp, "{n}");
                out.extend_from_slice(tmp.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Double(d) => {
                let s = format_double(*d);
                self.add_bulk_string(out, s.as_bytes());
            }
            Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
            Reply::Bulk(b) => self.add_bulk_string(out, b),
            Reply::Array(items) => {
                self.add_array_len(out, items.len());
                for item in items {
                    self.encode(item, out);
                }
            }
            Reply::Error(msg) => {
                out.extend_from_slice(b"-");
                out.extend_from_slice(msg.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
    }

    pub fn add_array_len(&self, out: &mut BytesMut, len: usize) {
        out.extend_from_slice(b"*");
        let mut tmp = String::new();
        let _ = write!(tmp, "{len}");
        out.extend_from_slice(tmp.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    pub fn add_bulk_string(&self, out: &mut BytesMut, data: &[u8]) {
        out.extend_from_slice(b"$");
        let mut tmp = String::new();
        let _ = write!(tmp, "{}", data.len());
        out.extend_from_slice(tmp.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
    }

    pub fn error_string(&self, out: &mut BytesMut, msg: &str) {
        out.extend_from_slice(b"-");
        out.extend_from_slice(msg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

fn format_double(d: f64) -> String {
    if d.fract() == 0.0 && d.is_finite() {
        format!("{}", d as i64)
    } else {
        format!("{d}")
    }
}

/// A single parsed client command: the command name (lower-cased) plus its
/// raw argument bytes, command name included at index 0 (teacher's
/// `args_vec()` convention in `generic_commands.rs`).
#[derive(Debug, Clone)]
pub struct Command {
    args: Vec<bytes::Bytes>,
}

impl Command {
    pub fn new(args: Vec<bytes::Bytes>) -> Self {
        Command { args }
    }

    pub fn name(&self) -> String {
        self.args
            .first()
            .map(|b| String::from_utf8_lossy(b).to_lowercase())
            .unwrap_or_default()
    }

    pub fn arg(&self, idx: usize) -> Option<&bytes::Bytes> {
        self.args.get(idx)
    }

    pub fn args(&self) -> &[bytes::Bytes] {
        &self.args
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Parses one RESP2 multi-bulk array command out of `buf`, advancing it.
/// Returns `Ok(None)` if the buffer doesn't yet hold a full command.
pub fn parse_command(buf: &mut BytesMut) -> Result<Option<Command>, crate::error::ProxyError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut cursor = std::io::Cursor::new(&buf[..]);
    match try_parse_multibulk(&mut cursor) {
        Some(args) => {
            let consumed = cursor.position() as usize;
            buf.advance(consumed);
            Ok(Some(Command::new(args)))
        }
        None => Ok(None),
    }
}

fn read_line(cur: &mut std::io::Cursor<&[u8]>) -> Option<Vec<u8>> {
    let start = cur.position() as usize;
    let data = cur.get_ref();
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            let line = data[start..i].to_vec();
            cur.set_position((i + 2) as u64);
            return Some(line);
        }
        i += 1;
    }
    None
}

fn try_parse_multibulk(cur: &mut std::io::Cursor<&[u8]>) -> Option<Vec<bytes::Bytes>> {
    let header = read_line(cur)?;
    if header.is_empty() || header[0] != b'*' {
        return None;
    }
    let count: i64 = std::str::from_utf8(&header[1..]).ok()?.parse().ok()?;
    if count <= 0 {
        return Some(Vec::new());
    }
    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let bulk_header = read_line(cur)?;
        if bulk_header.is_empty() || bulk_header[0] != b'$' {
            return None;
        }
        let len: i64 = std::str::from_utf8(&bulk_header[1..]).ok()?.parse().ok()?;
        if len < 0 {
            args.push(bytes::Bytes::new());
            continue;
        }
        let len = len as usize;
        let start = cur.position() as usize;
        let data = cur.get_ref();
        if data.len() < start + len + 2 {
            return None;
        }
        let value = bytes::Bytes::copy_from_slice(&data[start..start + len]);
        cur.set_position((start + len + 2) as u64);
        args.push(value);
    }
    Some(args)
}
