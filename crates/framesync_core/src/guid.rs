//! # Guid Interning
//!
//! Logical resource names ("cube_vb") and bind names ("VB0") are interned
//! once into dense integer identifiers. After that every hash and equality
//! check on the hot path is a single integer compare.
//!
//! The table is process-wide and append-only: a name, once interned, keeps
//! its `Guid` for the lifetime of the process.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use lasso::{Key, Spur, ThreadedRodeo};
use once_cell::sync::Lazy;

/// Process-wide intern table.
static TABLE: Lazy<ThreadedRodeo<Spur>> = Lazy::new(ThreadedRodeo::new);

/// Interned identifier for a logical resource or bind name.
///
/// Equal strings always map to the same `Guid`; distinct strings always map
/// to distinct `Guid`s.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Guid(Spur);

impl Guid {
    /// Interns `name` and returns its identifier.
    #[inline]
    #[must_use]
    pub fn new(name: &str) -> Self {
        GuidTable::intern(name)
    }

    /// Dense integer index of this identifier.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0.into_usize()
    }

    /// The interned name.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        GuidTable::name_of(self)
    }
}

impl PartialEq for Guid {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index() == other.index()
    }
}

impl Eq for Guid {}

impl Hash for Guid {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index().hash(state);
    }
}

impl PartialOrd for Guid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Guid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index().cmp(&other.index())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({}: {:?})", self.index(), self.as_str())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Guid {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Access to the process-wide intern table.
pub struct GuidTable;

impl GuidTable {
    /// Interns `name`, returning the existing `Guid` if it was seen before.
    #[inline]
    pub fn intern(name: &str) -> Guid {
        Guid(TABLE.get_or_intern(name))
    }

    /// Looks up `name` without interning it.
    #[inline]
    pub fn lookup(name: &str) -> Option<Guid> {
        TABLE.get(name).map(Guid)
    }

    /// Resolves a `Guid` back to its name.
    #[inline]
    pub fn name_of(guid: Guid) -> &'static str {
        TABLE.resolve(&guid.0)
    }

    /// Number of names interned so far.
    pub fn len() -> usize {
        TABLE.len()
    }

    /// Returns true if nothing has been interned yet.
    pub fn is_empty() -> bool {
        TABLE.is_empty()
    }
}
