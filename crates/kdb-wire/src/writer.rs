//! Trace stream writer.
//!
//! [`TraceWriter`] emits the same format the instrumented component
//! writes: the revision pair and schema tables on construction, then one
//! self-describing record per [`TraceWriter::write_opcode`]. Fixtures,
//! benchmarks, and trace-rewriting tools build streams with it.

use std::io::{self, Write};

use kdb_core::{FieldValue, Opcode};

use crate::input::ByteOrder;
use crate::schema::{OpcodeSpec, SchemaRegistry};
use crate::{OPCODE_REVISION, TOOL_REVISION};

/// Errors that can occur while encoding a trace.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The opcode's `(module, opcode)` is not in the writer's schema.
    #[error("opcode {name} is not registered")]
    Unregistered {
        /// The opcode's diagnostic name.
        name: &'static str,
    },
    /// A string value contains a NUL byte and cannot be terminated.
    #[error("string parameter {param} of {name} contains a NUL byte")]
    EmbeddedNul {
        /// The opcode's diagnostic name.
        name: &'static str,
        /// The offending parameter.
        param: &'static str,
    },
}

/// Writes trace data to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production
/// code can use `BufWriter<File>`.
pub struct TraceWriter<W: Write> {
    writer: W,
    order: ByteOrder,
    registry: SchemaRegistry,
    opcodes_written: u64,
}

impl<W: Write> TraceWriter<W> {
    /// Create a writer for the supported revision, writing the header.
    pub fn new(writer: W) -> Result<Self, EncodeError> {
        Self::with_format(
            writer,
            TOOL_REVISION,
            OPCODE_REVISION,
            ByteOrder::Big,
            SchemaRegistry::standard(),
        )
    }

    /// Create a writer with explicit revisions, byte order, and schema.
    pub fn with_format(
        writer: W,
        tool_rev: u32,
        opcode_rev: u32,
        order: ByteOrder,
        registry: SchemaRegistry,
    ) -> Result<Self, EncodeError> {
        let mut this = Self {
            writer,
            order,
            registry,
            opcodes_written: 0,
        };
        this.write_u32(tool_rev)?;
        this.write_u32(opcode_rev)?;
        let modules: Vec<_> = this.registry.modules().collect();
        for module in modules {
            for spec in module.opcodes {
                this.write_u16(module.id)?;
                this.write_u16(spec.opcode)?;
                this.write_cstr(spec.name)?;
                this.write_param_list(spec)?;
            }
            this.write_u16(0)?;
        }
        this.write_u16(0)?;
        Ok(this)
    }

    /// Append one opcode record.
    pub fn write_opcode(&mut self, opcode: &Opcode) -> Result<(), EncodeError> {
        let kind = &opcode.kind;
        let spec = self
            .registry
            .spec_for(kind)
            .ok_or(EncodeError::Unregistered { name: kind.name() })?;

        for (param, (_, value)) in spec.params.iter().zip(kind.fields()) {
            if let FieldValue::Str(s) = value {
                if s.as_bytes().contains(&0) {
                    return Err(EncodeError::EmbeddedNul {
                        name: spec.name,
                        param: param.name,
                    });
                }
            }
        }

        self.write_cstr(&opcode.provenance.file)?;
        self.write_u32(opcode.provenance.line)?;
        self.write_cstr(&opcode.provenance.function)?;
        self.write_u16(spec.module)?;
        self.write_u16(spec.opcode)?;
        self.write_param_list(spec)?;

        for (param, (_, value)) in spec.params.iter().zip(kind.fields()) {
            match value {
                FieldValue::Str(s) => self.write_cstr(s)?,
                other => {
                    let v = other.as_u32().unwrap_or(0);
                    self.write_uint(param.width, v)?;
                }
            }
        }

        if let Some(stack) = &opcode.stack {
            for &frame in stack.frames().iter().filter(|&&f| f != 0) {
                self.write_u32(frame)?;
            }
        }
        self.write_u32(0)?;
        self.opcodes_written += 1;
        Ok(())
    }

    /// Number of opcodes written so far.
    pub fn opcodes_written(&self) -> u64 {
        self.opcodes_written
    }

    /// Flush and return the sink.
    pub fn into_inner(mut self) -> Result<W, EncodeError> {
        self.writer.flush()?;
        Ok(self.writer)
    }

    // ── Primitive writers ───────────────────────────────────────

    fn write_param_list(&mut self, spec: &OpcodeSpec) -> Result<(), EncodeError> {
        for param in spec.params {
            self.write_u8(param.width)?;
            self.write_cstr(param.name)?;
        }
        self.write_u8(0)
    }

    fn write_uint(&mut self, width: u8, v: u32) -> Result<(), EncodeError> {
        match width {
            1 => self.write_u8(v as u8),
            2 => self.write_u16(v as u16),
            8 => self.write_u64(u64::from(v)),
            _ => self.write_u32(v),
        }
    }

    fn write_u8(&mut self, v: u8) -> Result<(), EncodeError> {
        self.writer.write_all(&[v])?;
        Ok(())
    }

    fn write_u16(&mut self, v: u16) -> Result<(), EncodeError> {
        let bytes = match self.order {
            ByteOrder::Big => v.to_be_bytes(),
            ByteOrder::Little => v.to_le_bytes(),
        };
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    fn write_u32(&mut self, v: u32) -> Result<(), EncodeError> {
        let bytes = match self.order {
            ByteOrder::Big => v.to_be_bytes(),
            ByteOrder::Little => v.to_le_bytes(),
        };
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    fn write_u64(&mut self, v: u64) -> Result<(), EncodeError> {
        let bytes = match self.order {
            ByteOrder::Big => v.to_be_bytes(),
            ByteOrder::Little => v.to_le_bytes(),
        };
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    fn write_cstr(&mut self, s: &str) -> Result<(), EncodeError> {
        self.writer.write_all(s.as_bytes())?;
        self.write_u8(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdb_core::{ChdescAddr, OpcodeKind};

    #[test]
    fn header_starts_with_revisions() {
        let writer = TraceWriter::new(Vec::new()).unwrap();
        let buf = writer.into_inner().unwrap();
        assert_eq!(&buf[0..4], &TOOL_REVISION.to_be_bytes());
        assert_eq!(&buf[4..8], &OPCODE_REVISION.to_be_bytes());
        assert_eq!(&buf[buf.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn record_layout() {
        let mut writer =
            TraceWriter::with_format(Vec::new(), 1, 2, ByteOrder::Big, SchemaRegistry::empty())
                .unwrap();
        let op = Opcode::bare(OpcodeKind::ChdescApply {
            chdesc: ChdescAddr(0x10),
        });
        assert!(matches!(
            writer.write_opcode(&op),
            Err(EncodeError::Unregistered { name: "KDB_CHDESC_APPLY" })
        ));

        let mut writer = TraceWriter::new(Vec::new()).unwrap();
        let header_len = {
            let probe = TraceWriter::new(Vec::new()).unwrap();
            probe.into_inner().unwrap().len()
        };
        writer.write_opcode(&op).unwrap();
        let buf = writer.into_inner().unwrap();
        let record = &buf[header_len..];
        let mut expected = Vec::new();
        expected.extend_from_slice(b"\0");
        expected.extend_from_slice(&0u32.to_be_bytes());
        expected.extend_from_slice(b"\0");
        expected.extend_from_slice(&200u16.to_be_bytes());
        expected.extend_from_slice(&208u16.to_be_bytes());
        expected.extend_from_slice(b"\x04chdesc\0\0");
        expected.extend_from_slice(&0x10u32.to_be_bytes());
        expected.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(record, expected.as_slice());
    }

    #[test]
    fn embedded_nul_rejected() {
        let mut writer = TraceWriter::new(Vec::new()).unwrap();
        let op = Opcode::bare(OpcodeKind::InfoChdescLabel {
            chdesc: ChdescAddr(1),
            label: "a\0b".into(),
        });
        assert!(matches!(
            writer.write_opcode(&op),
            Err(EncodeError::EmbeddedNul { param: "label", .. })
        ));
        assert_eq!(writer.opcodes_written(), 0);
    }
}
