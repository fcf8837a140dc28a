//! Trace stream decoder.
//!
//! [`TraceDecoder`] reads any `Read` source. Construction checks the
//! revision pair and verifies the header's opcode tables against the
//! [`SchemaRegistry`]; after that, [`TraceDecoder::next_opcode`] yields
//! one record at a time until clean end-of-stream.

use std::io::Read;

use smallvec::SmallVec;
use tracing::debug;

use kdb_core::{DecodeError, Opcode, Provenance};

use crate::config::DecoderConfig;
use crate::input::TraceInput;
use crate::intern::{StackInterner, StringInterner};
use crate::schema::{OpcodeSpec, ParamValue, Params, SchemaRegistry};

/// Decodes a trace stream into opcodes.
///
/// Generic over `R: Read` so tests can use `&[u8]` and production
/// code can use `BufReader<File>`.
#[derive(Debug)]
pub struct TraceDecoder<R> {
    input: TraceInput<R>,
    registry: SchemaRegistry,
    config: DecoderConfig,
    stacks: StackInterner,
    strings: StringInterner,
    tool_rev: u32,
    opcode_rev: u32,
    header_len: u64,
    opcodes_read: u64,
}

impl<R: Read> TraceDecoder<R> {
    /// Open a stream against the standard schema.
    ///
    /// `config` is assumed valid; see [`DecoderConfig::validate`].
    pub fn open(reader: R, config: DecoderConfig) -> Result<Self, DecodeError> {
        Self::with_registry(reader, config, SchemaRegistry::standard())
    }

    /// Open a stream against a custom schema.
    pub fn with_registry(
        reader: R,
        config: DecoderConfig,
        registry: SchemaRegistry,
    ) -> Result<Self, DecodeError> {
        let mut input = TraceInput::new(reader, config.byte_order);
        let tool_rev = input.read_u32()?;
        let opcode_rev = input.read_u32()?;
        config.revisions.check(tool_rev, opcode_rev)?;

        let mut decoder = Self {
            input,
            registry,
            config,
            stacks: StackInterner::new(),
            strings: StringInterner::new(),
            tool_rev,
            opcode_rev,
            header_len: 0,
            opcodes_read: 0,
        };
        decoder.verify_header()?;
        decoder.header_len = decoder.input.offset();
        debug!(
            tool_rev,
            opcode_rev,
            modules = decoder.registry.modules().count(),
            header_len = decoder.header_len,
            "trace header verified"
        );
        Ok(decoder)
    }

    fn verify_header(&mut self) -> Result<(), DecodeError> {
        let limit = self.config.max_string_len;
        let modules: Vec<_> = self.registry.modules().collect();
        for module in modules {
            for spec in module.opcodes {
                let found = self.input.read_u16()?;
                if found != module.id {
                    return Err(DecodeError::UnexpectedModule {
                        module: found,
                        offset: self.input.offset(),
                    });
                }
                let opcode = self.input.read_u16()?;
                if opcode != spec.opcode {
                    return Err(DecodeError::UnexpectedOpcode {
                        module: found,
                        opcode,
                        offset: self.input.offset(),
                    });
                }
                let name = self.input.read_cstr(limit)?;
                if name != spec.name {
                    return Err(DecodeError::UnexpectedName {
                        expected: spec.name,
                        found: name,
                        offset: self.input.offset(),
                    });
                }
                verify_params(&mut self.input, spec, limit)?;
            }
            self.expect_sentinel()?;
        }
        self.expect_sentinel()
    }

    fn expect_sentinel(&mut self) -> Result<(), DecodeError> {
        let module = self.input.read_u16()?;
        if module != 0 {
            return Err(DecodeError::UnexpectedModule {
                module,
                offset: self.input.offset(),
            });
        }
        Ok(())
    }

    /// Decode the next opcode, or `None` at clean end-of-stream.
    ///
    /// Input that ends anywhere but a record boundary is an error.
    pub fn next_opcode(&mut self) -> Result<Option<Opcode>, DecodeError> {
        if self.input.at_eof()? {
            return Ok(None);
        }
        let limit = self.config.max_string_len;

        let file = self.input.read_cstr(limit)?;
        let line = self.input.read_u32()?;
        let function = self.input.read_cstr(limit)?;

        let module_id = self.input.read_u16()?;
        let module = self
            .registry
            .module(module_id)
            .ok_or(DecodeError::UnexpectedModule {
                module: module_id,
                offset: self.input.offset(),
            })?;
        let opcode_id = self.input.read_u16()?;
        let spec = module.opcode(opcode_id).ok_or(DecodeError::UnexpectedOpcode {
            module: module_id,
            opcode: opcode_id,
            offset: self.input.offset(),
        })?;

        verify_params(&mut self.input, spec, limit)?;
        let params = self.read_values(spec)?;
        let stack = self.read_stack()?;

        let opcode = Opcode {
            kind: (spec.build)(&params),
            provenance: Provenance {
                file: self.strings.intern(&file),
                line,
                function: self.strings.intern(&function),
            },
            stack,
        };
        self.opcodes_read += 1;
        Ok(Some(opcode))
    }

    fn read_values(&mut self, spec: &OpcodeSpec) -> Result<Params, DecodeError> {
        let mut params = Params::new();
        for param in spec.params {
            if param.is_string() {
                let s = self.input.read_cstr(self.config.max_string_len)?;
                params.push(ParamValue::Str(s));
                continue;
            }
            let value = self.input.read_uint(param.width)?.ok_or_else(|| {
                DecodeError::UnexpectedParameter {
                    opcode: spec.name,
                    expected: "a parameter width of 1, 2, 4, or 8".to_string(),
                    found: param.name.to_string(),
                    found_width: param.width,
                    offset: self.input.offset(),
                }
            })?;
            params.push(ParamValue::Int(value));
        }
        Ok(params)
    }

    fn read_stack(&mut self) -> Result<Option<kdb_core::CallStack>, DecodeError> {
        let mut frames: SmallVec<[u32; 16]> = SmallVec::new();
        loop {
            let frame = self.input.read_u32()?;
            if frame == 0 {
                break;
            }
            if frames.len() + 1 >= self.config.max_stack_depth {
                return Err(DecodeError::StackTooDeep {
                    limit: self.config.max_stack_depth,
                    offset: self.input.offset(),
                });
            }
            frames.push(frame);
        }
        Ok(self.stacks.intern(&frames))
    }

    /// Bytes consumed so far, including the header.
    pub fn offset(&self) -> u64 {
        self.input.offset()
    }

    /// Length of the verified header in bytes.
    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    /// Number of opcodes decoded so far.
    pub fn opcodes_read(&self) -> u64 {
        self.opcodes_read
    }

    /// The `(tool, opcode format)` revision pair from the header.
    pub fn revisions(&self) -> (u32, u32) {
        (self.tool_rev, self.opcode_rev)
    }

    /// The schema this decoder verifies against.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The call stack interning table.
    pub fn stacks(&self) -> &StackInterner {
        &self.stacks
    }

    /// Convert into an opcode iterator.
    pub fn opcodes(self) -> OpcodeIter<R> {
        OpcodeIter {
            decoder: self,
            done: false,
        }
    }
}

/// Check a parameter self-description against `spec`.
fn verify_params<R: Read>(
    input: &mut TraceInput<R>,
    spec: &OpcodeSpec,
    limit: usize,
) -> Result<(), DecodeError> {
    for param in spec.params {
        let width = input.read_u8()?;
        if width == 0 {
            return Err(DecodeError::MissingParameter {
                opcode: spec.name,
                parameter: param.name,
                offset: input.offset(),
            });
        }
        let name = input.read_cstr(limit)?;
        if width != param.width || name != param.name {
            return Err(DecodeError::UnexpectedParameter {
                opcode: spec.name,
                expected: format!("{}/{}", param.name, param.width),
                found: name,
                found_width: width,
                offset: input.offset(),
            });
        }
    }
    let width = input.read_u8()?;
    if width != 0 {
        let name = input.read_cstr(limit)?;
        return Err(DecodeError::UnexpectedParameter {
            opcode: spec.name,
            expected: "end of parameter list".to_string(),
            found: name,
            found_width: width,
            offset: input.offset(),
        });
    }
    Ok(())
}

/// Iterator adapter over decoded opcodes.
///
/// Stops after the first error.
pub struct OpcodeIter<R> {
    decoder: TraceDecoder<R>,
    done: bool,
}

impl<R: Read> OpcodeIter<R> {
    /// The underlying decoder, for offsets and counters.
    pub fn decoder(&self) -> &TraceDecoder<R> {
        &self.decoder
    }
}

impl<R: Read> Iterator for OpcodeIter<R> {
    type Item = Result<Opcode, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.decoder.next_opcode() {
            Ok(Some(opcode)) => Some(Ok(opcode)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
