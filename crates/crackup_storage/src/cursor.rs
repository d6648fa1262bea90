//! Re-seeking cursor shared by the reference backends.
//!
//! A cursor remembers only the last key it emitted. Each step seeks the
//! first key strictly past it, so no lock is held between steps and the
//! whole keyspace is never buffered.

use crate::error::StorageResult;
use crate::store::{Direction, IterOptions, Record};
use std::ops::Bound;

/// Point lookup of the nearest record inside a key range.
pub(crate) trait Seek: Sync {
    /// Returns the lowest (forward) or highest (reverse) record whose key
    /// lies within `lower..upper`.
    fn seek(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        direction: Direction,
    ) -> StorageResult<Option<Record>>;
}

/// Iterator over a [`Seek`] source.
pub(crate) struct SeekCursor<'a, S: Seek + ?Sized> {
    source: &'a S,
    lower: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
    direction: Direction,
    remaining: Option<usize>,
    finished: bool,
}

impl<'a, S: Seek + ?Sized> SeekCursor<'a, S> {
    pub(crate) fn new(source: &'a S, options: IterOptions) -> Self {
        Self {
            source,
            lower: options.lower,
            upper: options.upper,
            direction: options.direction,
            remaining: options.limit,
            finished: false,
        }
    }
}

impl<S: Seek + ?Sized> Iterator for SeekCursor<'_, S> {
    type Item = StorageResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.remaining == Some(0) || is_empty(&self.lower, &self.upper) {
            self.finished = true;
            return None;
        }

        let found = self.source.seek(
            self.lower.as_ref().map(Vec::as_slice),
            self.upper.as_ref().map(Vec::as_slice),
            self.direction,
        );

        match found {
            Ok(Some(record)) => {
                // Narrow the window past the emitted key
                match self.direction {
                    Direction::Forward => self.lower = Bound::Excluded(record.key.clone()),
                    Direction::Reverse => self.upper = Bound::Excluded(record.key.clone()),
                }
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                Some(Ok(record))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Returns `true` if no key can satisfy both bounds.
///
/// `BTreeMap::range` panics on such ranges, so they are filtered here.
pub(crate) fn is_empty(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l) | Bound::Excluded(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u)) => l >= u,
        _ => false,
    }
}
