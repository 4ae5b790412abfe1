//! RESP reply frames.
//!
//! Only the reply side of the protocol is framed; requests arrive as plain
//! whitespace-separated lines.

use bytes::{Bytes, BytesMut};

/// Line terminator appended to every reply
pub const CRLF: &[u8] = b"\r\n";

/// RESP reply types
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Simple string: +OK\r\n
    Simple(String),
    /// Error: -ERR message\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $5\r\nhello\r\n or $-1\r\n (null)
    Bulk(Option<Bytes>),
}

impl Frame {
    /// Encode a frame to bytes, including the trailing CRLF
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encode a frame into an existing buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                buf.extend_from_slice(b"+");
                buf.extend_from_slice(s.as_bytes());
            }
            Frame::Error(s) => {
                buf.extend_from_slice(b"-");
                buf.extend_from_slice(s.as_bytes());
            }
            Frame::Integer(n) => {
                buf.extend_from_slice(b":");
                buf.extend_from_slice(n.to_string().as_bytes());
            }
            Frame::Bulk(None) => {
                buf.extend_from_slice(b"$-1");
            }
            Frame::Bulk(Some(data)) => {
                buf.extend_from_slice(b"$");
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
            }
        }
        buf.extend_from_slice(CRLF);
    }

    /// Create a simple string response
    pub fn simple<S: Into<String>>(s: S) -> Frame {
        Frame::Simple(s.into())
    }

    /// Create an error response
    pub fn error<S: Into<String>>(s: S) -> Frame {
        Frame::Error(s.into())
    }

    /// Create a null bulk string response
    pub fn null() -> Frame {
        Frame::Bulk(None)
    }

    /// Create a bulk string response
    pub fn bulk<B: Into<Bytes>>(data: B) -> Frame {
        Frame::Bulk(Some(data.into()))
    }

    /// Create an integer response
    pub fn integer(n: i64) -> Frame {
        Frame::Integer(n)
    }
}
