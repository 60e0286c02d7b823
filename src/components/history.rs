use image::RgbaImage;
use std::sync::Arc;

use crate::io::{self, CodecError};

// ============================================================================
// SNAPSHOT - Losslessly encoded copy of the annotation layer
// ============================================================================

/// An immutable, PNG-encoded copy of the annotation layer's pixels.
///
/// Cloning is cheap (the payload is shared), and decoding reproduces the
/// captured pixels exactly.
#[derive(Clone, Debug)]
pub struct Snapshot {
    description: String,
    width: u32,
    height: u32,
    encoded: Arc<[u8]>,
}

impl Snapshot {
    pub fn capture(description: &str, pixels: &RgbaImage) -> Result<Self, CodecError> {
        let encoded = io::encode_png(pixels)?;
        Ok(Self {
            description: description.to_string(),
            width: pixels.width(),
            height: pixels.height(),
            encoded: encoded.into(),
        })
    }

    pub fn decode(&self) -> Result<RgbaImage, CodecError> {
        let img = io::decode_png(&self.encoded)?;
        if img.dimensions() != (self.width, self.height) {
            return Err(CodecError::Dimensions {
                width: img.width(),
                height: img.height(),
            });
        }
        Ok(img)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn memory_size(&self) -> usize {
        self.encoded.len() + self.description.len()
    }
}

// ============================================================================
// HISTORY MANAGER - Linear snapshot stack with a single "current" pointer
// ============================================================================

/// Linear undo/redo over full-frame snapshots.
///
/// `snapshots[current]` is always the authoritative state. Entries after
/// `current` form the redo branch and are dropped on the next commit.
pub struct HistoryManager {
    snapshots: Vec<Snapshot>,
    current: Option<usize>,
    /// 0 = unbounded.
    max_history_size: usize,
    total_memory: usize,
    /// Commits since creation or the last `clear`.
    commit_count: u64,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(0)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            current: None,
            max_history_size,
            total_memory: 0,
            commit_count: 0,
        }
    }

    /// Append `snapshot`, truncating any redo branch, and make it current.
    pub fn commit(&mut self, snapshot: Snapshot) {
        let keep = self.current.map_or(0, |c| c + 1);
        for dropped in self.snapshots.drain(keep..) {
            self.total_memory = self.total_memory.saturating_sub(dropped.memory_size());
        }

        self.total_memory += snapshot.memory_size();
        self.snapshots.push(snapshot);
        self.current = Some(self.snapshots.len() - 1);
        self.commit_count += 1;

        self.prune();
    }

    /// Step back one snapshot. Returns the snapshot to restore, or `None` at
    /// the earliest entry.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        match self.current {
            Some(c) if c > 0 => {
                self.current = Some(c - 1);
                self.snapshots.get(c - 1)
            }
            _ => None,
        }
    }

    /// Step forward one snapshot. Returns the snapshot to restore, or `None`
    /// at the latest entry.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        match self.current {
            Some(c) if c + 1 < self.snapshots.len() => {
                self.current = Some(c + 1);
                self.snapshots.get(c + 1)
            }
            _ => None,
        }
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.and_then(|c| self.snapshots.get(c))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn can_undo(&self) -> bool {
        self.current.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.current.is_some_and(|c| c + 1 < self.snapshots.len())
    }

    pub fn undo_count(&self) -> usize {
        self.current.unwrap_or(0)
    }

    pub fn redo_count(&self) -> usize {
        self.current
            .map_or(0, |c| self.snapshots.len().saturating_sub(c + 1))
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Descriptions up to and including the current entry, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        let end = self.current.map_or(0, |c| c + 1);
        self.snapshots[..end]
            .iter()
            .rev()
            .map(|s| s.description.clone())
            .collect()
    }

    /// Encoded bytes held across all snapshots (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.current = None;
        self.total_memory = 0;
        self.commit_count = 0;
    }

    /// Drop the oldest snapshots beyond the cap, shifting the pointer.
    fn prune(&mut self) {
        if self.max_history_size == 0 {
            return;
        }
        let cap = self.max_history_size.max(1);
        while self.snapshots.len() > cap {
            let removed = self.snapshots.remove(0);
            self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            self.current = self.current.map(|c| c.saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame(tag: u8) -> RgbaImage {
        let mut img = RgbaImage::new(4, 4);
        img.put_pixel(1, 1, Rgba([tag, 0, 0, 255]));
        img
    }

    fn snap(tag: u8) -> Snapshot {
        Snapshot::capture(&format!("step {tag}"), &frame(tag)).unwrap()
    }

    fn tag_of(s: &Snapshot) -> u8 {
        s.decode().unwrap().get_pixel(1, 1)[0]
    }

    #[test]
    fn snapshot_decodes_pixel_identical() {
        let img = frame(77);
        let s = Snapshot::capture("x", &img).unwrap();
        assert_eq!(s.decode().unwrap(), img);
        assert_eq!(s.dimensions(), (4, 4));
        assert_eq!(s.description(), "x");
    }

    #[test]
    fn n_undos_return_to_initial() {
        let mut h = HistoryManager::default();
        h.commit(snap(0));
        for t in 1..=5 {
            h.commit(snap(t));
        }
        let mut last = None;
        for _ in 0..5 {
            last = h.undo().map(tag_of);
        }
        assert_eq!(last, Some(0));
        assert!(h.undo().is_none());
        assert_eq!(h.current().map(tag_of), Some(0));
    }

    #[test]
    fn redo_after_undo_restores_the_undone_snapshot() {
        let mut h = HistoryManager::default();
        h.commit(snap(1));
        h.commit(snap(2));
        assert_eq!(h.undo().map(tag_of), Some(1));
        assert_eq!(h.redo().map(tag_of), Some(2));
        assert!(h.redo().is_none());
    }

    #[test]
    fn commit_after_undo_discards_redo_branch() {
        let mut h = HistoryManager::default();
        h.commit(snap(0));
        h.commit(snap(1)); // A
        h.commit(snap(2)); // B
        h.undo();
        h.commit(snap(3)); // C
        assert!(!h.can_redo());
        assert!(h.redo().is_none());
        assert_eq!(h.current().map(tag_of), Some(3));
        assert_eq!(h.len(), 3);
        assert_eq!(h.undo_history(), vec!["step 3", "step 1", "step 0"]);
    }

    #[test]
    fn empty_history_is_inert() {
        let mut h = HistoryManager::default();
        assert!(h.undo().is_none());
        assert!(h.redo().is_none());
        assert!(h.current().is_none());
        assert_eq!(h.undo_count(), 0);
        assert_eq!(h.redo_count(), 0);
        assert!(h.undo_history().is_empty());
    }

    #[test]
    fn counts_track_pointer() {
        let mut h = HistoryManager::default();
        for t in 0..4 {
            h.commit(snap(t));
        }
        h.undo();
        assert_eq!(h.undo_count(), 2);
        assert_eq!(h.redo_count(), 1);
        assert!(h.can_undo() && h.can_redo());
    }

    #[test]
    fn cap_prunes_oldest_and_shifts_pointer() {
        let mut h = HistoryManager::new(3);
        for t in 0..5 {
            h.commit(snap(t));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.current_index(), Some(2));
        h.undo();
        h.undo();
        assert!(h.undo().is_none());
        assert_eq!(h.current().map(tag_of), Some(2));
    }

    #[test]
    fn memory_accounting_follows_truncation() {
        let mut h = HistoryManager::default();
        h.commit(snap(0));
        h.commit(snap(1));
        let two = h.memory_usage();
        h.undo();
        h.commit(snap(2));
        assert!(h.memory_usage() <= two + 16);
        h.clear();
        assert_eq!(h.memory_usage(), 0);
        assert!(h.is_empty());
    }
}
