//! # Operation Log
//!
//! Ordered log of queued structural changes with a freeze marker.
//!
//! ```text
//!   [op0][op1][op2] | [op3][op4]
//!   └── frozen ───┘   └─ queued after freeze, kept for next cycle
//! ```

/// A queued change to a flat deferred map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MapOp<K, V> {
    /// Insert or replace `key`.
    Add(K, V),
    /// Remove `key`.
    Remove(K),
}

impl<K, V> MapOp<K, V> {
    /// The key this operation addresses.
    pub fn key(&self) -> &K {
        match self {
            Self::Add(key, _) | Self::Remove(key) => key,
        }
    }
}

/// Append-only log with a two-phase drain.
#[derive(Debug)]
pub struct OpLog<Op> {
    ops: Vec<Op>,
    frozen: usize,
}

impl<Op> Default for OpLog<Op> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Op> OpLog<Op> {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ops: Vec::new(),
            frozen: 0,
        }
    }

    /// Appends an operation.
    #[inline]
    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Marks every operation currently in the log as part of the next drain.
    #[inline]
    pub fn freeze(&mut self) {
        self.frozen = self.ops.len();
    }

    /// Removes and yields exactly the frozen operations, in log order.
    ///
    /// Operations appended after `freeze` stay in the log.
    pub fn drain_frozen(&mut self) -> std::vec::Drain<'_, Op> {
        let count = std::mem::take(&mut self.frozen);
        self.ops.drain(..count)
    }

    /// Iterates every queued operation, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Op> {
        self.ops.iter()
    }

    /// Number of queued operations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations the next drain will apply.
    #[inline]
    #[must_use]
    pub fn frozen_len(&self) -> usize {
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_only_frozen() {
        let mut log = OpLog::new();
        log.push(1);
        log.push(2);
        log.freeze();
        log.push(3);

        let drained: Vec<_> = log.drain_frozen().collect();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(log.frozen_len(), 0);
    }

    #[test]
    fn test_drain_without_freeze_is_empty() {
        let mut log = OpLog::new();
        log.push("a");
        assert_eq!(log.drain_frozen().count(), 0);
        assert_eq!(log.len(), 1);
    }
}
