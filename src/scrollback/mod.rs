//! Scrollback cache and update pipeline (spec §4.D): sits between a PTY's
//! emulator and its subscribers, caching packed/decoded rows so repeated
//! reads of the same scrollback offset don't cross back into the emulator.
//!
//! No teacher file caches rows this way (the teacher re-reads `vt100::Parser`
//! on every draw); built fresh, but the LRU-with-invalidation-rules shape
//! mirrors how `session::manager::ManagedSession` already treats
//! `scrollback_len`/`at_retention_limit` as the signal for resetting state.

use std::collections::HashMap;

use crate::cell::{Cell, PackedRow};
use crate::emulator::DirtyUpdate;

const CACHE_CAPACITY: usize = 1000;

/// Fixed-capacity LRU keyed by absolute scrollback offset.
struct Lru<V> {
    capacity: usize,
    order: Vec<usize>,
    entries: HashMap<usize, V>,
}

impl<V> Lru<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&mut self, key: usize) -> Option<&V> {
        if self.entries.contains_key(&key) {
            self.touch(key);
        }
        self.entries.get(&key)
    }

    fn insert(&mut self, key: usize, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.first().copied() {
                self.order.remove(0);
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, value);
        self.touch(key);
    }

    fn touch(&mut self, key: usize) {
        self.order.retain(|&k| k != key);
        self.order.push(key);
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Per-PTY cache pair plus the live-viewport packed rows, with the exact
/// invalidation rules named in spec §4.D.
pub struct ScrollbackCache {
    packed: Lru<PackedRow>,
    decoded: Lru<Vec<Cell>>,
    live_packed: Vec<PackedRow>,
    last_scrollback_len: Option<usize>,
    last_alternate_screen: bool,
    /// Bumps whenever cached content is invalidated or live rows are
    /// replaced, so selection/search overlays can no-op (spec §4.D.d).
    version: u64,
}

impl ScrollbackCache {
    pub fn new() -> Self {
        Self {
            packed: Lru::new(CACHE_CAPACITY),
            decoded: Lru::new(CACHE_CAPACITY),
            live_packed: Vec::new(),
            last_scrollback_len: None,
            last_alternate_screen: false,
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn packed_len(&self) -> usize {
        self.packed.len()
    }

    pub fn decoded_len(&self) -> usize {
        self.decoded.len()
    }

    /// Applies a [`DirtyUpdate`] per the pipeline dispatch in spec §4.D:
    /// updates the live cache, evaluates invalidation, bumps the version.
    pub fn apply_update(&mut self, update: &DirtyUpdate) {
        let scrollback_len = update.scrollback_len();
        let alternate_screen = update.modes().alternate_screen;
        let at_retention_limit = update.at_retention_limit();

        let invalidate = match self.last_scrollback_len {
            None => false,
            Some(prev) if scrollback_len > prev => false,
            Some(prev) if scrollback_len == prev => at_retention_limit,
            Some(_) => true, // shrank
        } || alternate_screen != self.last_alternate_screen;

        if invalidate {
            self.packed.clear();
            self.decoded.clear();
        }

        self.last_scrollback_len = Some(scrollback_len);
        self.last_alternate_screen = alternate_screen;

        match update {
            DirtyUpdate::Full { rows, .. } => {
                self.live_packed = rows.clone();
            }
            DirtyUpdate::Incremental { rows, .. } => {
                for (idx, row) in rows {
                    if *idx < self.live_packed.len() {
                        self.live_packed[*idx] = row.clone();
                    } else {
                        self.live_packed.resize_with(*idx + 1, || PackedRow::blank(0));
                        self.live_packed[*idx] = row.clone();
                    }
                }
            }
        }

        self.version += 1;
    }

    pub fn live_row(&self, viewport_row: usize) -> Option<&PackedRow> {
        self.live_packed.get(viewport_row)
    }

    pub fn cache_packed_scrollback_row(&mut self, absolute_offset: usize, row: PackedRow) {
        self.packed.insert(absolute_offset, row);
    }

    pub fn cached_packed_scrollback_row(&mut self, absolute_offset: usize) -> Option<&PackedRow> {
        self.packed.get(absolute_offset)
    }

    pub fn cache_decoded_scrollback_row(&mut self, absolute_offset: usize, row: Vec<Cell>) {
        self.decoded.insert(absolute_offset, row);
    }

    pub fn cached_decoded_scrollback_row(&mut self, absolute_offset: usize) -> Option<&Vec<Cell>> {
        self.decoded.get(absolute_offset)
    }
}

impl Default for ScrollbackCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{Cursor, ModeFlags};

    fn full_update(scrollback_len: usize, alternate_screen: bool, at_retention_limit: bool) -> DirtyUpdate {
        DirtyUpdate::Full {
            rows: vec![PackedRow::blank(4)],
            cursor: Cursor {
                row: 0,
                col: 0,
                visible: true,
            },
            modes: ModeFlags {
                alternate_screen,
                ..Default::default()
            },
            scrollback_len,
            at_retention_limit,
        }
    }

    #[test]
    fn growth_does_not_evict_cached_rows() {
        let mut cache = ScrollbackCache::new();
        cache.apply_update(&full_update(0, false, false));
        cache.cache_packed_scrollback_row(0, PackedRow::blank(4));
        cache.apply_update(&full_update(1, false, false));
        assert_eq!(cache.packed_len(), 1);
    }

    #[test]
    fn retention_limit_plateau_clears_caches() {
        let mut cache = ScrollbackCache::new();
        cache.apply_update(&full_update(1000, false, false));
        cache.cache_packed_scrollback_row(0, PackedRow::blank(4));
        cache.apply_update(&full_update(1000, false, true));
        assert_eq!(cache.packed_len(), 0);
    }

    #[test]
    fn shrinking_scrollback_clears_caches() {
        let mut cache = ScrollbackCache::new();
        cache.apply_update(&full_update(50, false, false));
        cache.cache_packed_scrollback_row(0, PackedRow::blank(4));
        cache.apply_update(&full_update(10, false, false));
        assert_eq!(cache.packed_len(), 0);
    }

    #[test]
    fn alternate_screen_transition_always_clears() {
        let mut cache = ScrollbackCache::new();
        cache.apply_update(&full_update(10, false, false));
        cache.cache_packed_scrollback_row(0, PackedRow::blank(4));
        cache.apply_update(&full_update(10, true, false));
        assert_eq!(cache.packed_len(), 0);
    }

    #[test]
    fn lru_evicts_oldest_entry_past_capacity() {
        let mut lru: Lru<u8> = Lru::new(2);
        lru.insert(1, 1);
        lru.insert(2, 2);
        lru.insert(3, 3);
        assert_eq!(lru.len(), 2);
        assert!(lru.get(1).is_none());
        assert!(lru.get(3).is_some());
    }
}
