//! The replay controller.
//!
//! A [`Debugger`] owns one trace: its decoder, the append-only log of
//! decoded opcodes, and the [`SystemState`] reconstructed from a prefix
//! of that log. There is no undo. Moving backwards resets the state and
//! replays the prefix from the start, so a backward seek to `k` costs
//! `O(k)` applies.

use std::fmt;
use std::io::Read;
use std::ops::RangeInclusive;

use tracing::{debug, info, warn};

use kdb_core::{ChdescAddr, DecodeError, Opcode};
use kdb_graph::SystemState;
use kdb_wire::TraceDecoder;

use crate::config::DebuggerConfig;
use crate::error::{ReadError, ReplayError};

/// Which extreme [`Debugger::find_extreme`] looks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extreme {
    /// Largest live chdesc count.
    Max,
    /// Smallest live chdesc count.
    Min,
}

impl Extreme {
    fn improves(self, candidate: usize, best: usize) -> bool {
        match self {
            Self::Max => candidate > best,
            Self::Min => candidate < best,
        }
    }
}

/// Replay controller for one loaded trace.
#[derive(Debug)]
pub struct Debugger<R: Read> {
    name: String,
    decoder: Option<TraceDecoder<R>>,
    opcodes: Vec<Opcode>,
    state: SystemState,
    config: DebuggerConfig,
    read_error: Option<ReadError>,
}

impl<R: Read> Debugger<R> {
    /// Verify the trace header and decode ahead per
    /// [`DebuggerConfig::read_limit`].
    ///
    /// A decode failure during the read-ahead does not fail the open:
    /// the opcodes read so far are kept and the failure is available
    /// from [`Debugger::read_error`].
    pub fn open(
        name: impl Into<String>,
        source: R,
        config: DebuggerConfig,
    ) -> Result<Self, ReplayError> {
        config.validate()?;
        let decoder = TraceDecoder::open(source, config.decoder.clone())?;
        let mut this = Self {
            name: name.into(),
            decoder: Some(decoder),
            opcodes: Vec::new(),
            state: SystemState::new(),
            config,
            read_error: None,
        };

        let result = match this.config.read_limit {
            Some(limit) => this.read_opcodes_max(limit),
            None => this.read_opcodes(),
        };
        if let Err(err) = result {
            warn!(trace = %this.name, error = %err, "trace only partially loaded");
            this.read_error = Some(err);
        }
        info!(
            trace = %this.name,
            opcodes = this.opcodes.len(),
            bytes = this.input_offset().unwrap_or(0),
            stacks = this.decoder.as_ref().map_or(0, |d| d.stacks().distinct()),
            "trace loaded"
        );
        Ok(this)
    }

    // ── Decoding ───────────────────────────────────────────────

    /// Decode the rest of the trace into the log.
    pub fn read_opcodes(&mut self) -> Result<usize, ReadError> {
        self.read_opcodes_max(usize::MAX)
    }

    /// Decode up to `max` more opcodes into the log.
    ///
    /// Returns how many were decoded. After a clean end of input or a
    /// decode failure the decoder is released and later reads return 0.
    pub fn read_opcodes_max(&mut self, max: usize) -> Result<usize, ReadError> {
        let mut decoded = 0;
        while decoded < max {
            match self.next_decoded() {
                Ok(Some(op)) => {
                    self.opcodes.push(op);
                    decoded += 1;
                }
                Ok(None) => break,
                Err(source) => {
                    return Err(ReadError {
                        source,
                        decoded,
                        total: self.opcodes.len(),
                    })
                }
            }
        }
        Ok(decoded)
    }

    fn next_decoded(&mut self) -> Result<Option<Opcode>, DecodeError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };
        match decoder.next_opcode() {
            Ok(Some(op)) => Ok(Some(op)),
            Ok(None) => {
                debug!(trace = %self.name, offset = decoder.offset(), "end of trace");
                self.decoder = None;
                Ok(None)
            }
            Err(err) => {
                self.decoder = None;
                Err(err)
            }
        }
    }

    /// Decode and apply in lockstep until the end of input.
    ///
    /// Any decoded but unapplied opcodes are applied first. Returns the
    /// number of opcodes decoded by this call.
    pub fn stream(&mut self) -> Result<usize, ReplayError> {
        self.stream_max(usize::MAX)
    }

    /// Decode and apply at most `max` more opcodes.
    pub fn stream_max(&mut self, max: usize) -> Result<usize, ReplayError> {
        self.replay_all()?;
        let mut decoded = 0;
        while decoded < max {
            match self.next_decoded() {
                Ok(Some(op)) => {
                    self.opcodes.push(op);
                    decoded += 1;
                    self.advance(1)?;
                }
                Ok(None) => break,
                Err(source) => {
                    return Err(ReadError {
                        source,
                        decoded,
                        total: self.opcodes.len(),
                    }
                    .into())
                }
            }
        }
        Ok(decoded)
    }

    // ── Replay ─────────────────────────────────────────────────

    /// Apply up to `count` opcodes exactly, with no skipping.
    fn advance(&mut self, count: usize) -> Result<bool, ReplayError> {
        let mut changed = false;
        let mut remaining = count;
        while remaining > 0 {
            let index = self.state.applied();
            let Some(op) = self.opcodes.get(index) else {
                break;
            };
            self.state
                .apply(&op.kind)
                .map_err(|source| ReplayError::State {
                    index,
                    name: op.kind.name(),
                    source,
                })?;
            changed |= op.has_effect();
            remaining -= 1;
        }
        Ok(changed)
    }

    /// Apply up to `count` further opcodes.
    ///
    /// A single step (`count == 1`) keeps going while the most recently
    /// applied opcode is skippable, so it lands after the next
    /// non-annotation opcode. Returns whether any applied opcode had an
    /// observable effect.
    pub fn replay(&mut self, count: usize) -> Result<bool, ReplayError> {
        let mut changed = self.advance(count)?;
        if count == 1 {
            while self.last_applied().is_some_and(Opcode::is_skippable)
                && self.state.applied() < self.opcodes.len()
            {
                changed |= self.advance(1)?;
            }
        }
        Ok(changed)
    }

    /// Apply every remaining opcode in the log.
    pub fn replay_all(&mut self) -> Result<bool, ReplayError> {
        let remaining = self.opcodes.len() - self.state.applied();
        let changed = self.advance(remaining)?;
        if self.config.warn_on_dangling && self.decoder.is_none() {
            let dangling = self.state.dangling();
            if !dangling.is_empty() {
                warn!(
                    trace = %self.name,
                    count = dangling.len(),
                    "replay finished with dangling chdescs"
                );
            }
        }
        Ok(changed)
    }

    /// Discard the state and return to position 0.
    pub fn reset_state(&mut self) {
        debug!(trace = %self.name, from = self.state.applied(), "reset");
        self.state = SystemState::new();
    }

    /// Move to position `target`, replaying from scratch when it lies
    /// behind the current position.
    pub fn seek(&mut self, target: usize) -> Result<bool, ReplayError> {
        if target > self.opcodes.len() {
            return Err(ReplayError::OutOfRange {
                requested: target,
                available: self.opcodes.len(),
            });
        }
        debug!(trace = %self.name, from = self.state.applied(), to = target, "seek");
        if target < self.state.applied() {
            self.reset_state();
        }
        self.advance(target - self.state.applied())
    }

    /// Step by `delta` opcodes; negative values step backwards.
    ///
    /// Forward steps follow [`Debugger::replay`], so a single forward step
    /// also skips annotations. Backward steps land exactly `delta` opcodes
    /// earlier, as [`Debugger::seek`] does, and fail with
    /// [`ReplayError::BeforeStart`] rather than passing position zero.
    pub fn step(&mut self, delta: i64) -> Result<bool, ReplayError> {
        if delta >= 0 {
            let count = usize::try_from(delta).unwrap_or(usize::MAX);
            return self.replay(count);
        }
        let position = self.state.applied();
        let back = usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX);
        let Some(target) = position.checked_sub(back) else {
            return Err(ReplayError::BeforeStart { back, position });
        };
        self.seek(target)
    }

    /// First position in `range` at which the registered chdesc count
    /// reaches its maximum or minimum over the range.
    ///
    /// The end of the range is clamped to the log length. The current
    /// position is restored afterwards.
    pub fn find_extreme(
        &mut self,
        extreme: Extreme,
        range: RangeInclusive<usize>,
    ) -> Result<usize, ReplayError> {
        let (start, stop) = range.into_inner();
        let stop = stop.min(self.opcodes.len());
        if start > stop {
            return Err(ReplayError::OutOfRange {
                requested: start,
                available: self.opcodes.len(),
            });
        }
        let restore = self.state.applied();

        self.reset_state();
        self.advance(start)?;
        let mut best = self.state.chdesc_count();
        let mut best_at = start;
        for position in start + 1..=stop {
            self.advance(1)?;
            let count = self.state.chdesc_count();
            if extreme.improves(count, best) {
                best = count;
                best_at = position;
            }
        }

        self.reset_state();
        self.advance(restore)?;
        debug!(trace = %self.name, ?extreme, best, position = best_at, "find");
        Ok(best_at)
    }

    // ── Accessors ──────────────────────────────────────────────

    /// Trace name given at open.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reconstructed state at the current position.
    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Opcodes applied so far; the current position.
    pub fn applied(&self) -> usize {
        self.state.applied()
    }

    /// The opcode at log position `index`.
    pub fn opcode(&self, index: usize) -> Option<&Opcode> {
        self.opcodes.get(index)
    }

    /// The decoded log.
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    /// Number of decoded opcodes.
    pub fn opcode_count(&self) -> usize {
        self.opcodes.len()
    }

    fn last_applied(&self) -> Option<&Opcode> {
        self.state
            .applied()
            .checked_sub(1)
            .and_then(|i| self.opcodes.get(i))
    }

    /// Placeholders still unresolved at the current position.
    pub fn dangling(&self) -> Vec<ChdescAddr> {
        self.state.dangling()
    }

    /// Byte offset of the decoder, while input remains.
    pub fn input_offset(&self) -> Option<u64> {
        self.decoder.as_ref().map(TraceDecoder::offset)
    }

    /// Whether the input has been fully consumed (or abandoned).
    pub fn is_exhausted(&self) -> bool {
        self.decoder.is_none()
    }

    /// The read-ahead failure from [`Debugger::open`], if any.
    pub fn read_error(&self) -> Option<&ReadError> {
        self.read_error.as_ref()
    }

    /// Active configuration.
    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }
}

impl<R: Read> fmt::Display for Debugger<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Debugging {}, read {} opcodes, applied {}",
            self.name,
            self.opcodes.len(),
            self.state.applied()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdb_core::{ChdescFlags, OpcodeKind, OwnerAddr};
    use kdb_test_utils::TraceBuilder;
    use std::io::Cursor;

    fn open(bytes: Vec<u8>) -> Debugger<Cursor<Vec<u8>>> {
        Debugger::open("test", Cursor::new(bytes), DebuggerConfig::default()).unwrap()
    }

    fn example() -> Vec<u8> {
        TraceBuilder::new()
            .mark(1)
            .create_noop(0x10, 0x99)
            .set_flags(0x10, ChdescFlags::MARKED)
            .destroy(0x10)
            .build()
    }

    #[test]
    fn replay_all_destroys() {
        let mut dbg = open(example());
        assert_eq!(dbg.opcode_count(), 4);
        assert!(dbg.is_exhausted());
        assert!(dbg.replay_all().unwrap());
        assert!(dbg.state().lookup(ChdescAddr(0x10)).is_none());
        assert!(dbg.opcode(3).unwrap().has_effect());
        let mark = dbg.opcode(0).unwrap();
        assert!(!mark.has_effect());
        assert!(mark.is_skippable());
        assert_eq!(dbg.to_string(), "Debugging test, read 4 opcodes, applied 4");
    }

    #[test]
    fn single_step_skips_annotations() {
        let mut dbg = open(example());
        assert!(dbg.replay(1).unwrap());
        // The mark is skippable, so the create is applied as well.
        assert_eq!(dbg.applied(), 2);
        assert!(dbg.replay(1).unwrap());
        assert_eq!(dbg.applied(), 3);
    }

    #[test]
    fn replay_reports_no_change() {
        let bytes = TraceBuilder::new().mark(1).mark(2).build();
        let mut dbg = open(bytes);
        assert!(!dbg.replay(1).unwrap());
        assert_eq!(dbg.applied(), 2);
    }

    #[test]
    fn seek_backwards_resets() {
        let mut dbg = open(example());
        dbg.replay_all().unwrap();
        dbg.seek(2).unwrap();
        assert_eq!(dbg.applied(), 2);
        assert!(dbg.state().lookup(ChdescAddr(0x10)).is_some());
        assert!(matches!(
            dbg.seek(5),
            Err(ReplayError::OutOfRange {
                requested: 5,
                available: 4
            })
        ));
    }

    #[test]
    fn negative_step() {
        let mut dbg = open(example());
        dbg.replay_all().unwrap();
        dbg.step(-2).unwrap();
        assert_eq!(dbg.applied(), 2);
        assert!(matches!(
            dbg.step(-10),
            Err(ReplayError::BeforeStart {
                back: 10,
                position: 2
            })
        ));
        assert_eq!(dbg.applied(), 2);
        dbg.step(-2).unwrap();
        assert_eq!(dbg.applied(), 0);
    }

    #[test]
    fn find_restores_position() {
        let bytes = TraceBuilder::new()
            .create_noop(1, 0)
            .create_noop(2, 0)
            .destroy(1)
            .create_noop(3, 0)
            .create_noop(4, 0)
            .destroy(2)
            .destroy(3)
            .build();
        let mut dbg = open(bytes);
        dbg.seek(3).unwrap();
        assert_eq!(dbg.find_extreme(Extreme::Max, 0..=usize::MAX).unwrap(), 5);
        assert_eq!(dbg.find_extreme(Extreme::Min, 2..=7).unwrap(), 3);
        assert_eq!(dbg.find_extreme(Extreme::Min, 1..=7).unwrap(), 1);
        assert_eq!(dbg.find_extreme(Extreme::Min, 0..=7).unwrap(), 0);
        assert_eq!(dbg.applied(), 3);
        assert!(dbg.find_extreme(Extreme::Max, 9..=10).is_err());
    }

    #[test]
    fn read_limit_decodes_lazily() {
        let config = DebuggerConfig {
            read_limit: Some(2),
            ..DebuggerConfig::default()
        };
        let mut dbg = Debugger::open("lazy", Cursor::new(example()), config).unwrap();
        assert_eq!(dbg.opcode_count(), 2);
        assert!(!dbg.is_exhausted());
        assert_eq!(dbg.read_opcodes_max(1).unwrap(), 1);
        assert_eq!(dbg.read_opcodes().unwrap(), 1);
        assert!(dbg.is_exhausted());
        assert_eq!(dbg.read_opcodes().unwrap(), 0);
    }

    #[test]
    fn stream_applies_in_lockstep() {
        let config = DebuggerConfig {
            read_limit: Some(1),
            ..DebuggerConfig::default()
        };
        let mut dbg = Debugger::open("stream", Cursor::new(example()), config).unwrap();
        assert_eq!(dbg.stream().unwrap(), 3);
        assert_eq!(dbg.applied(), 4);
    }

    #[test]
    fn truncated_trace_keeps_progress() {
        let mut bytes = example();
        bytes.truncate(bytes.len() - 3);
        let dbg = open(bytes);
        assert_eq!(dbg.opcode_count(), 3);
        let err = dbg.read_error().unwrap();
        assert_eq!(err.total, 3);
        assert!(matches!(err.source, DecodeError::TruncatedInput { .. }));
        assert!(err.offset().is_some());
    }

    #[test]
    fn state_error_stops_replay() {
        let bytes = TraceBuilder::new()
            .create_noop(1, 0)
            .add_before(1, 2)
            .push(OpcodeKind::ChdescSetOwner {
                chdesc: ChdescAddr(2),
                owner: OwnerAddr(5),
            })
            .create_noop(3, 0)
            .build();
        let mut dbg = open(bytes);
        let err = dbg.replay_all().unwrap_err();
        assert!(matches!(
            err,
            ReplayError::State {
                index: 2,
                name: "KDB_CHDESC_SET_OWNER",
                ..
            }
        ));
        assert_eq!(dbg.applied(), 2);
    }
}
