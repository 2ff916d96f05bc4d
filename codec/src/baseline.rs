//! Tick-keyed snapshot history.

use std::num::NonZeroUsize;

use tick::NetworkTick;

/// Errors that can occur when inserting into the baseline store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineError {
    /// Ticks must be strictly newer than the last inserted tick.
    OutOfOrder {
        last_tick: NetworkTick,
        new_tick: NetworkTick,
    },
    /// The store is full and the tick is older than everything in it.
    TooOld {
        oldest: NetworkTick,
        new_tick: NetworkTick,
    },
}

impl From<BaselineError> for crate::CodecError {
    fn from(err: BaselineError) -> Self {
        match err {
            BaselineError::OutOfOrder {
                last_tick,
                new_tick,
            } => Self::StaleTick {
                last: last_tick.raw(),
                tick: new_tick.raw(),
            },
            BaselineError::TooOld { oldest, new_tick } => Self::StaleTick {
                last: oldest.raw(),
                tick: new_tick.raw(),
            },
        }
    }
}

/// A fixed-capacity ring buffer of snapshots keyed by tick.
///
/// Used for the server's sent and acknowledged histories and the client's
/// per-ghost snapshot history. Ordering uses wrap-aware tick comparison.
#[derive(Debug, Clone)]
pub struct BaselineStore<T> {
    entries: Vec<Option<Entry<T>>>,
    head: usize,
    len: usize,
    last_tick: Option<NetworkTick>,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    tick: NetworkTick,
    value: T,
}

impl<T> BaselineStore<T> {
    /// Creates a new baseline store with the given capacity.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let cap = capacity.get();
        let mut entries = Vec::with_capacity(cap);
        entries.resize_with(cap, || None);
        Self {
            entries,
            head: 0,
            len: 0,
            last_tick: None,
        }
    }

    /// Returns the capacity of the store.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of entries stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tick of the newest entry.
    #[must_use]
    pub fn last_tick(&self) -> Option<NetworkTick> {
        self.last_tick.filter(|_| self.len > 0)
    }

    /// Inserts a snapshot at the given tick.
    ///
    /// Ticks must be strictly newer than the last inserted tick. When the
    /// store is full, this overwrites the oldest entry.
    pub fn insert(&mut self, tick: NetworkTick, value: T) -> Result<(), BaselineError> {
        if let Some(last) = self.last_tick {
            if !tick.is_newer_than(last) {
                return Err(BaselineError::OutOfOrder {
                    last_tick: last,
                    new_tick: tick,
                });
            }
        }

        let cap = self.entries.len();
        if self.len < cap {
            let idx = (self.head + self.len) % cap;
            self.entries[idx] = Some(Entry { tick, value });
            self.len += 1;
        } else {
            self.entries[self.head] = Some(Entry { tick, value });
            self.head = (self.head + 1) % cap;
        }

        self.last_tick = Some(tick);
        Ok(())
    }

    /// Inserts a snapshot at its sorted position, accepting ticks older than
    /// the newest entry.
    ///
    /// Returns `Ok(false)` if the tick is already stored; the stored value is
    /// kept. When the store is full the oldest entry is evicted, so a tick
    /// older than every stored entry is rejected.
    pub fn insert_in_order(&mut self, tick: NetworkTick, value: T) -> Result<bool, BaselineError> {
        match self.last_tick() {
            Some(last) if !tick.is_newer_than(last) => {}
            _ => {
                self.insert(tick, value)?;
                return Ok(true);
            }
        }
        if self.get(tick).is_some() {
            return Ok(false);
        }

        let cap = self.entries.len();
        self.entries.rotate_left(self.head);
        self.head = 0;
        let at = self.entries[..self.len]
            .iter()
            .flatten()
            .take_while(|entry| tick.is_newer_than(entry.tick))
            .count();
        if self.len < cap {
            self.entries[at..=self.len].rotate_right(1);
            self.entries[at] = Some(Entry { tick, value });
            self.len += 1;
        } else if at == 0 {
            let oldest = self.entries[0].as_ref().map_or(tick, |entry| entry.tick);
            return Err(BaselineError::TooOld {
                oldest,
                new_tick: tick,
            });
        } else {
            self.entries[..at].rotate_left(1);
            self.entries[at - 1] = Some(Entry { tick, value });
        }
        Ok(true)
    }

    /// Returns the snapshot for an exact tick, if present.
    #[must_use]
    pub fn get(&self, tick: NetworkTick) -> Option<&T> {
        self.iter().find(|(t, _)| *t == tick).map(|(_, v)| v)
    }

    /// Returns the newest entry, if any.
    #[must_use]
    pub fn newest(&self) -> Option<(NetworkTick, &T)> {
        self.iter().next_back()
    }

    /// Returns the latest snapshot at or before the given tick.
    ///
    /// This performs an O(capacity) scan and is intended for small windows.
    #[must_use]
    pub fn latest_at_or_before(&self, tick: NetworkTick) -> Option<(NetworkTick, &T)> {
        self.iter().rev().find(|(t, _)| !t.is_newer_than(tick))
    }

    /// Returns the oldest snapshot strictly after the given tick.
    #[must_use]
    pub fn earliest_after(&self, tick: NetworkTick) -> Option<(NetworkTick, &T)> {
        self.iter().find(|(t, _)| t.is_newer_than(tick))
    }

    /// Removes every entry; insertion order restarts.
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
        self.head = 0;
        self.len = 0;
        self.last_tick = None;
    }

    /// Returns an iterator from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (NetworkTick, &T)> {
        let cap = self.entries.len();
        (0..self.len).filter_map(move |i| {
            let idx = (self.head + i) % cap;
            self.entries[idx]
                .as_ref()
                .map(|entry| (entry.tick, &entry.value))
        })
    }
}
