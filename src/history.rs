use crate::session::GeneratedArtifact;

pub const HISTORY_LIMIT: usize = 50;

/// Linear undo/redo over accepted artifacts, bounded to [`HISTORY_LIMIT`] entries.
#[derive(Debug, Clone, Default)]
pub struct HistoryStack {
    entries: Vec<GeneratedArtifact>,
    cursor: Option<usize>,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything after the cursor, appends, and evicts the oldest entry on overflow.
    pub fn push(&mut self, artifact: GeneratedArtifact) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push(artifact);
        if self.entries.len() > HISTORY_LIMIT {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len().checked_sub(1);
    }

    pub fn undo(&mut self) -> Option<&GeneratedArtifact> {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                self.entries.get(c - 1)
            }
            _ => None,
        }
    }

    pub fn redo(&mut self) -> Option<&GeneratedArtifact> {
        match self.cursor {
            Some(c) if c + 1 < self.entries.len() => {
                self.cursor = Some(c + 1);
                self.entries.get(c + 1)
            }
            _ => None,
        }
    }

    pub fn current(&self) -> Option<&GeneratedArtifact> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    /// Replaces the stack wholesale. Only the newest [`HISTORY_LIMIT`] entries are kept.
    pub fn load(&mut self, mut entries: Vec<GeneratedArtifact>) {
        if entries.len() > HISTORY_LIMIT {
            entries.drain(..entries.len() - HISTORY_LIMIT);
        }
        self.cursor = entries.len().checked_sub(1);
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    pub fn entries(&self) -> &[GeneratedArtifact] {
        &self.entries
    }

    /// `None` when the stack is empty.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
