use tunerelay_core::SourceId;

/// Currently-playing sources, most recently started first. The front
/// entry is the sole source whose updates reach the downstream
/// consumer.
#[derive(Debug, Default)]
pub struct ActiveSourceList {
    ids: Vec<SourceId>,
}

impl ActiveSourceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn front(&self) -> Option<SourceId> {
        self.ids.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.ids.contains(&id)
    }

    /// Insert at the front; an id that is already present moves to the
    /// front instead of appearing twice.
    pub fn promote(&mut self, id: SourceId) {
        self.ids.retain(|&existing| existing != id);
        self.ids.insert(0, id);
    }

    /// Remove wherever it occurs. Returns whether the id was present.
    pub fn remove(&mut self, id: SourceId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|&existing| existing != id);
        self.ids.len() != before
    }
}
