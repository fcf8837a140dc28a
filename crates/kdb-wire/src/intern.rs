//! Interning caches for call stacks and provenance strings.
//!
//! Large traces repeat a small set of call stacks and source locations
//! many thousands of times. Interning shares one allocation per distinct
//! value across all opcodes of a trace. Both tables are caches: a miss
//! that stores a duplicate costs memory, never correctness.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use kdb_core::CallStack;

/// Seed of the structural stack hash.
const STACK_HASH_SEED: u32 = 0x5AFE_DA7A;

/// Structural hash of a frame sequence.
pub fn stack_hash(frames: &[u32]) -> u32 {
    frames
        .iter()
        .fold(STACK_HASH_SEED, |hash, &frame| hash.wrapping_mul(37) ^ frame)
}

/// Deduplicates call stacks by content.
///
/// Keyed by [`stack_hash`]; colliding stacks are told apart by comparing
/// the full frame sequence.
#[derive(Debug, Default)]
pub struct StackInterner {
    buckets: HashMap<u32, SmallVec<[Arc<[u32]>; 1]>>,
    hits: u64,
    distinct: usize,
}

impl StackInterner {
    /// An empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared stack for `frames`. An empty sequence is no stack.
    pub fn intern(&mut self, frames: &[u32]) -> Option<CallStack> {
        if frames.is_empty() {
            return None;
        }
        let bucket = self.buckets.entry(stack_hash(frames)).or_default();
        if let Some(found) = bucket.iter().find(|s| s[..] == *frames) {
            self.hits += 1;
            return Some(CallStack::new(Arc::clone(found)));
        }
        let stack: Arc<[u32]> = Arc::from(frames);
        bucket.push(Arc::clone(&stack));
        self.distinct += 1;
        Some(CallStack::new(stack))
    }

    /// Number of distinct stacks stored.
    pub fn distinct(&self) -> usize {
        self.distinct
    }

    /// Number of lookups answered from the table.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Drop every stored stack.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.hits = 0;
        self.distinct = 0;
    }
}

/// Deduplicates provenance strings (file and function names).
#[derive(Debug, Default)]
pub struct StringInterner {
    strings: IndexSet<Arc<str>>,
}

impl StringInterner {
    /// An empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared copy of `s`.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(found) = self.strings.get(s) {
            return Arc::clone(found);
        }
        let shared: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&shared));
        shared
    }

    /// Number of distinct strings stored.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Drop every stored string.
    pub fn clear(&mut self) {
        self.strings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identical_stacks_share_storage() {
        let mut interner = StackInterner::new();
        let a = interner.intern(&[0xc010_0000, 0xc010_0040]).unwrap();
        let b = interner.intern(&[0xc010_0000, 0xc010_0040]).unwrap();
        assert!(CallStack::ptr_eq(&a, &b));
        assert_eq!(interner.distinct(), 1);
        assert_eq!(interner.hits(), 1);
    }

    #[test]
    fn empty_stack_is_none() {
        let mut interner = StackInterner::new();
        assert!(interner.intern(&[]).is_none());
        assert_eq!(interner.distinct(), 0);
    }

    #[test]
    fn collisions_fall_back_to_content() {
        // Pick the second frame of `y` so both sequences hash alike.
        let step = |first: u32| STACK_HASH_SEED.wrapping_mul(37) ^ first;
        let x = [1u32, 2];
        let y = [3u32, 2 ^ step(1).wrapping_mul(37) ^ step(3).wrapping_mul(37)];
        assert_eq!(stack_hash(&x), stack_hash(&y));

        let mut interner = StackInterner::new();
        let a = interner.intern(&x).unwrap();
        let b = interner.intern(&y).unwrap();
        assert!(!CallStack::ptr_eq(&a, &b));
        assert_eq!(a.frames(), &x);
        assert_eq!(b.frames(), &y);
        assert_eq!(interner.distinct(), 2);

        let again = interner.intern(&y).unwrap();
        assert!(CallStack::ptr_eq(&b, &again));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut interner = StackInterner::new();
        let a = interner.intern(&[1, 2]).unwrap();
        interner.clear();
        let b = interner.intern(&[1, 2]).unwrap();
        assert!(!CallStack::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }

    #[test]
    fn strings_are_shared() {
        let mut interner = StringInterner::new();
        let a = interner.intern("chdesc.c");
        let b = interner.intern("chdesc.c");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }

    proptest! {
        #[test]
        fn interning_preserves_content(stacks in prop::collection::vec(
            prop::collection::vec(1u32..64, 1..6), 1..40)) {
            let mut interner = StackInterner::new();
            for frames in &stacks {
                let stack = interner.intern(frames).unwrap();
                prop_assert_eq!(stack.frames(), &frames[..]);
            }
            let unique: std::collections::HashSet<_> = stacks.iter().collect();
            prop_assert_eq!(interner.distinct(), unique.len());
        }
    }
}
