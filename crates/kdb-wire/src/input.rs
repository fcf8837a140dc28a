//! Primitive readers over a byte source.
//!
//! [`TraceInput`] wraps any `Read`, decodes fixed-width integers and
//! null-terminated strings, and keeps a running count of consumed bytes
//! for diagnostics. Running out of input inside a value is reported as
//! [`DecodeError::TruncatedInput`]; running out exactly at a record
//! boundary is detected separately with [`TraceInput::at_eof`].

use std::io::{ErrorKind, Read};

use kdb_core::DecodeError;

/// Integer byte order on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first (network order).
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// A byte source with offset tracking and one byte of lookahead.
///
/// Strings are read a byte at a time, so wrap files in a `BufReader`.
#[derive(Debug)]
pub struct TraceInput<R> {
    inner: R,
    order: ByteOrder,
    offset: u64,
    peeked: Option<u8>,
}

impl<R: Read> TraceInput<R> {
    /// Wrap a source.
    pub fn new(inner: R, order: ByteOrder) -> Self {
        Self {
            inner,
            order,
            offset: 0,
            peeked: None,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The configured byte order.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Unwrap the source. A peeked byte, if any, is lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Whether the source is exhausted.
    ///
    /// Reads ahead by at most one byte, which later reads still see.
    pub fn at_eof(&mut self) -> Result<bool, DecodeError> {
        if self.peeked.is_some() {
            return Ok(false);
        }
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.peeked = Some(buf[0]);
                    return Ok(false);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(DecodeError::Io {
                        offset: self.offset,
                        source: e,
                    })
                }
            }
        }
    }

    /// Fill `buf` completely, or fail with the offset where input ran out.
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        let mut filled = 0;
        if let (Some(b), Some(first)) = (self.peeked, buf.first_mut()) {
            *first = b;
            self.peeked = None;
            self.offset += 1;
            filled = 1;
        }
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(DecodeError::TruncatedInput {
                        offset: self.offset,
                    })
                }
                Ok(n) => {
                    filled += n;
                    self.offset += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(DecodeError::Io {
                        offset: self.offset,
                        source: e,
                    })
                }
            }
        }
        Ok(())
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a 16-bit integer.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf)?;
        Ok(match self.order {
            ByteOrder::Big => u16::from_be_bytes(buf),
            ByteOrder::Little => u16::from_le_bytes(buf),
        })
    }

    /// Read a 32-bit integer.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(match self.order {
            ByteOrder::Big => u32::from_be_bytes(buf),
            ByteOrder::Little => u32::from_le_bytes(buf),
        })
    }

    /// Read a 64-bit integer.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(match self.order {
            ByteOrder::Big => u64::from_be_bytes(buf),
            ByteOrder::Little => u64::from_le_bytes(buf),
        })
    }

    /// Read an unsigned integer of 1, 2, 4, or 8 bytes.
    ///
    /// Returns `None` without consuming input for any other width.
    pub fn read_uint(&mut self, width: u8) -> Result<Option<u64>, DecodeError> {
        Ok(Some(match width {
            1 => u64::from(self.read_u8()?),
            2 => u64::from(self.read_u16()?),
            4 => u64::from(self.read_u32()?),
            8 => self.read_u64()?,
            _ => return Ok(None),
        }))
    }

    /// Read a null-terminated string of at most `limit` bytes.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_cstr(&mut self, limit: usize) -> Result<String, DecodeError> {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            if bytes.len() == limit {
                return Err(DecodeError::StringTooLong {
                    limit,
                    offset: self.offset,
                });
            }
            bytes.push(b);
        }
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}
