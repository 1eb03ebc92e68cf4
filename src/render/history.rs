use std::collections::VecDeque;

use image::RgbaImage;

pub const DEFAULT_MAX_SNAPSHOTS: usize = 10;

/// Immutable copy of the base layer, dimensions included.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pixels: RgbaImage,
}

impl Snapshot {
    pub fn capture(pixels: &RgbaImage) -> Self {
        Self {
            pixels: pixels.clone(),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Undo,
    Redo,
}

impl HistoryAction {
    pub const fn applied_message(self) -> &'static str {
        match self {
            Self::Undo => "undo applied",
            Self::Redo => "redo applied",
        }
    }

    pub const fn empty_message(self) -> &'static str {
        match self {
            Self::Undo => "undo stack empty",
            Self::Redo => "redo stack empty",
        }
    }
}

/// Bounded undo/redo over base-layer snapshots.
///
/// `current` mirrors the committed base layer. Undo moves it onto the redo stack and
/// pops the undo stack into its place; pushing a new snapshot clears redo.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    current: Option<Snapshot>,
    limit: usize,
}

impl SnapshotHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            current: None,
            limit: limit.max(1),
        }
    }

    /// Drops all history and starts over from `snapshot`.
    pub fn reset(&mut self, snapshot: Snapshot) {
        self.undo.clear();
        self.redo.clear();
        self.current = Some(snapshot);
    }

    /// Records a new committed state. Returns the evicted oldest entry, if any.
    pub fn push(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        self.redo.clear();
        let Some(previous) = self.current.replace(snapshot) else {
            return None;
        };
        self.undo.push_back(previous);
        if self.undo.len() > self.limit {
            return self.undo.pop_front();
        }
        None
    }

    /// Steps back; the returned snapshot is the state to restore.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        let previous = self.undo.pop_back()?;
        if let Some(current) = self.current.replace(previous) {
            self.redo.push(current);
        }
        self.current.as_ref()
    }

    pub fn redo(&mut self) -> Option<&Snapshot> {
        let next = self.redo.pop()?;
        if let Some(current) = self.current.replace(next) {
            self.undo.push_back(current);
        }
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SNAPSHOTS)
    }
}
