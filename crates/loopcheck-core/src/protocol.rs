//! Wire format for talking to the on-device accessibility agent.
//!
//! Every message is one frame:
//!
//! ```text
//! u32 LE length | opcode byte | body
//! ```
//!
//! The length counts the opcode and body. Strings and byte blobs are a
//! `u32` LE length plus the raw bytes; optional fields lead with a `0`/`1`
//! presence byte. Replies use opcode `0xA0` followed by a kind byte, except
//! that the agent may also answer with a bare `0x99` error frame.
//!
//! Only the requests the loop-count check needs are modelled.
//!
//! ```
//! use loopcheck_core::protocol::{Request, HEADER_LEN};
//!
//! let frame = Request::TapLabel { label: "Video11".into(), wait_ms: Some(8000) }.encode();
//! let body = &frame[HEADER_LEN..];
//! assert_eq!(Request::decode(body).unwrap().name(), "tap_label");
//! ```

use thiserror::Error;

/// Size of the length prefix in front of every frame.
pub const HEADER_LEN: usize = 4;

/// Largest body the host will accept. Screenshots are the biggest replies.
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

mod op {
    pub const HEARTBEAT: u8 = 0x01;
    pub const TAP_AT: u8 = 0x02;
    pub const TAP_LABEL: u8 = 0x04;
    pub const DUMP_TREE: u8 = 0x10;
    pub const SCREENSHOT: u8 = 0x11;
    pub const FIND_ELEMENT: u8 = 0x13;
    pub const ERROR: u8 = 0x99;
    pub const REPLY: u8 = 0xA0;
}

mod kind {
    pub const OK: u8 = 0x00;
    pub const ERROR: u8 = 0x01;
    pub const TREE: u8 = 0x02;
    pub const PNG: u8 = 0x03;
    pub const ELEMENT: u8 = 0x05;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("unknown reply kind 0x{0:02X}")]
    UnknownReplyKind(u8),

    #[error("frame truncated: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("string field is not valid UTF-8")]
    BadUtf8,

    #[error("frame body of {0} bytes exceeds the limit")]
    TooLarge(usize),

    #[error("{0}")]
    Unsupported(&'static str),
}

/// Body length announced by a frame header.
///
/// Rejects lengths over [`MAX_BODY_LEN`] so a corrupt header cannot trigger
/// a huge allocation.
pub fn body_len(header: [u8; HEADER_LEN]) -> Result<usize, ProtocolError> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_BODY_LEN {
        return Err(ProtocolError::TooLarge(len));
    }
    Ok(len)
}

/// Builds one frame, patching the length prefix in on [`finish`](Self::finish).
struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    fn new(opcode: u8) -> Self {
        let mut buf = vec![0; HEADER_LEN];
        buf.push(opcode);
        Self { buf }
    }

    fn byte(mut self, b: u8) -> Self {
        self.buf.push(b);
        self
    }

    fn i32(mut self, v: i32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn blob(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(data);
        self
    }

    fn text(self, s: &str) -> Self {
        self.blob(s.as_bytes())
    }

    fn maybe_text(self, s: Option<&str>) -> Self {
        match s {
            Some(s) => self.byte(1).text(s),
            None => self.byte(0),
        }
    }

    fn maybe_u64(mut self, v: Option<u64>) -> Self {
        match v {
            Some(v) => {
                self.buf.push(1);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            None => self.buf.push(0),
        }
        self
    }

    fn finish(mut self) -> Vec<u8> {
        let len = (self.buf.len() - HEADER_LEN) as u32;
        self.buf[..HEADER_LEN].copy_from_slice(&len.to_le_bytes());
        self.buf
    }
}

/// Consumes fields from the front of a frame body.
struct BodyReader<'a> {
    rest: &'a [u8],
}

impl<'a> BodyReader<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self { rest: body }
    }

    fn split(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.rest.len() < n {
            return Err(ProtocolError::Truncated { needed: n, remaining: self.rest.len() });
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0; N];
        out.copy_from_slice(self.split(N)?);
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.split(1)?[0])
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.fixed().map(i32::from_le_bytes)
    }

    fn blob(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = u32::from_le_bytes(self.fixed()?) as usize;
        self.split(len)
    }

    fn text(&mut self) -> Result<String, ProtocolError> {
        let raw = self.blob()?;
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::BadUtf8)
    }

    fn maybe_text(&mut self) -> Result<Option<String>, ProtocolError> {
        match self.byte()? {
            0 => Ok(None),
            _ => self.text().map(Some),
        }
    }

    fn maybe_u64(&mut self) -> Result<Option<u64>, ProtocolError> {
        match self.byte()? {
            0 => Ok(None),
            _ => self.fixed().map(|b| Some(u64::from_le_bytes(b))),
        }
    }
}

/// Host-to-agent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Heartbeat,
    /// Tap at screen coordinates, in points.
    TapAt { x: i32, y: i32 },
    /// Tap the element with this label. With `wait_ms` the agent keeps
    /// looking for it that long before giving up.
    TapLabel { label: String, wait_ms: Option<u64> },
    DumpTree,
    Screenshot,
    /// Look up one element by accessibility identifier, optionally
    /// restricted to one element type.
    FindElement { identifier: String, element_type: Option<String> },
}

impl Request {
    /// Name used in spans and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Heartbeat => "heartbeat",
            Request::TapAt { .. } => "tap_at",
            Request::TapLabel { .. } => "tap_label",
            Request::DumpTree => "dump_tree",
            Request::Screenshot => "screenshot",
            Request::FindElement { .. } => "find_element",
        }
    }

    /// Complete frame, header included.
    pub fn encode(&self) -> Vec<u8> {
        let frame = match self {
            Request::Heartbeat => FrameWriter::new(op::HEARTBEAT),
            Request::TapAt { x, y } => FrameWriter::new(op::TAP_AT).i32(*x).i32(*y),
            Request::TapLabel { label, wait_ms } => {
                FrameWriter::new(op::TAP_LABEL).text(label).maybe_u64(*wait_ms)
            }
            Request::DumpTree => FrameWriter::new(op::DUMP_TREE),
            Request::Screenshot => FrameWriter::new(op::SCREENSHOT),
            // The agent also supports label lookups; the flag byte is always 0 here.
            Request::FindElement { identifier, element_type } => FrameWriter::new(op::FIND_ELEMENT)
                .text(identifier)
                .byte(0)
                .maybe_text(element_type.as_deref()),
        };
        frame.finish()
    }

    /// Parse a frame body (everything after the header).
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BodyReader::new(body);
        let request = match r.byte()? {
            op::HEARTBEAT => Request::Heartbeat,
            op::TAP_AT => Request::TapAt { x: r.i32()?, y: r.i32()? },
            op::TAP_LABEL => Request::TapLabel { label: r.text()?, wait_ms: r.maybe_u64()? },
            op::DUMP_TREE => Request::DumpTree,
            op::SCREENSHOT => Request::Screenshot,
            op::FIND_ELEMENT => {
                let identifier = r.text()?;
                if r.byte()? != 0 {
                    return Err(ProtocolError::Unsupported("lookup by label"));
                }
                Request::FindElement { identifier, element_type: r.maybe_text()? }
            }
            other => return Err(ProtocolError::UnknownOpcode(other)),
        };
        Ok(request)
    }
}

/// Agent-to-host reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Error(String),
    /// JSON array of root elements.
    Tree(String),
    Png(Vec<u8>),
    /// JSON for one element, or `null` when nothing matched.
    Element(String),
}

impl Reply {
    /// Complete frame, header included.
    pub fn encode(&self) -> Vec<u8> {
        let w = FrameWriter::new(op::REPLY);
        let frame = match self {
            Reply::Ok => w.byte(kind::OK),
            Reply::Error(message) => w.byte(kind::ERROR).text(message),
            Reply::Tree(json) => w.byte(kind::TREE).text(json),
            Reply::Png(data) => w.byte(kind::PNG).blob(data),
            Reply::Element(json) => w.byte(kind::ELEMENT).text(json),
        };
        frame.finish()
    }

    /// Parse a frame body (everything after the header).
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BodyReader::new(body);
        match r.byte()? {
            op::ERROR => Ok(Reply::Error(r.text()?)),
            op::REPLY => match r.byte()? {
                kind::OK => Ok(Reply::Ok),
                kind::ERROR => Ok(Reply::Error(r.text()?)),
                kind::TREE => Ok(Reply::Tree(r.text()?)),
                kind::PNG => Ok(Reply::Png(r.blob()?.to_vec())),
                kind::ELEMENT => Ok(Reply::Element(r.text()?)),
                other => Err(ProtocolError::UnknownReplyKind(other)),
            },
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(frame: &[u8]) -> &[u8] {
        let header: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        assert_eq!(body_len(header).unwrap(), frame.len() - HEADER_LEN);
        &frame[HEADER_LEN..]
    }

    #[test]
    fn tap_label_byte_layout() {
        let frame = Request::TapLabel { label: "Video11".into(), wait_ms: Some(8000) }.encode();
        // opcode, 4 + 7 label, presence flag, u64
        assert_eq!(&frame[..4], &21u32.to_le_bytes());
        assert_eq!(frame[4], 0x04);
        assert_eq!(&frame[5..9], &7u32.to_le_bytes());
        assert_eq!(&frame[9..16], b"Video11");
        assert_eq!(frame[16], 1);
        assert_eq!(&frame[17..], &8000u64.to_le_bytes());
    }

    #[test]
    fn find_element_sends_identifier_lookup() {
        let req = Request::FindElement {
            identifier: "loopCounterLabel".into(),
            element_type: Some("StaticText".into()),
        };
        let frame = req.encode();
        // by-label flag follows the identifier
        assert_eq!(frame[HEADER_LEN + 1 + 4 + 16], 0);
        assert_eq!(Request::decode(body(&frame)).unwrap(), req);
    }

    #[test]
    fn label_lookup_is_refused() {
        let mut frame = Request::FindElement { identifier: "x".into(), element_type: None }.encode();
        frame[HEADER_LEN + 1 + 4 + 1] = 1;
        assert_eq!(
            Request::decode(body(&frame)),
            Err(ProtocolError::Unsupported("lookup by label"))
        );
    }

    #[test]
    fn tap_at_keeps_sign() {
        let req = Request::TapAt { x: -3, y: 69 };
        assert_eq!(Request::decode(body(&req.encode())).unwrap(), req);
    }

    #[test]
    fn empty_requests_are_one_byte() {
        for req in [Request::Heartbeat, Request::DumpTree, Request::Screenshot] {
            assert_eq!(req.encode().len(), HEADER_LEN + 1, "{}", req.name());
        }
    }

    #[test]
    fn png_reply_keeps_binary_data() {
        let reply = Reply::Png(vec![0x89, b'P', b'N', b'G', 0x00, 0xFF]);
        assert_eq!(Reply::decode(body(&reply.encode())).unwrap(), reply);
    }

    #[test]
    fn element_reply_null_means_no_match() {
        let reply = Reply::Element("null".into());
        assert_eq!(Reply::decode(body(&reply.encode())).unwrap(), reply);
    }

    #[test]
    fn bare_error_frame_is_an_error_reply() {
        let mut raw = vec![0x99];
        raw.extend_from_slice(&17u32.to_le_bytes());
        raw.extend_from_slice(b"element not found");
        assert_eq!(Reply::decode(&raw).unwrap(), Reply::Error("element not found".into()));
    }

    #[test]
    fn request_opcode_is_not_a_reply() {
        assert_eq!(Reply::decode(&[0x10]), Err(ProtocolError::UnknownOpcode(0x10)));
    }

    #[test]
    fn dropped_opcodes_are_unknown() {
        // get-value and set-target exist on the agent but are never sent.
        assert_eq!(Request::decode(&[0x08]), Err(ProtocolError::UnknownOpcode(0x08)));
        assert_eq!(Request::decode(&[0x12]), Err(ProtocolError::UnknownOpcode(0x12)));
    }

    #[test]
    fn unknown_reply_kind() {
        assert_eq!(Reply::decode(&[0xA0, 0x7F]), Err(ProtocolError::UnknownReplyKind(0x7F)));
    }

    #[test]
    fn short_string_is_truncated() {
        let raw = [0x04, 10, 0, 0, 0, b'h', b'i'];
        assert_eq!(
            Request::decode(&raw),
            Err(ProtocolError::Truncated { needed: 10, remaining: 2 })
        );
    }

    #[test]
    fn invalid_utf8_rejected() {
        let raw = [0xA0, 0x02, 2, 0, 0, 0, 0xC3, 0x28];
        assert_eq!(Reply::decode(&raw), Err(ProtocolError::BadUtf8));
    }

    #[test]
    fn oversized_header_rejected() {
        let header = ((MAX_BODY_LEN + 1) as u32).to_le_bytes();
        assert_eq!(body_len(header), Err(ProtocolError::TooLarge(MAX_BODY_LEN + 1)));
    }

    #[test]
    fn empty_body_is_truncated() {
        assert!(matches!(Reply::decode(&[]), Err(ProtocolError::Truncated { needed: 1, .. })));
    }
}
