//! Watermark into the platform's update stream.

/// Smallest update sequence number not yet acknowledged to the platform.
///
/// Passing `next_offset` to the next fetch acknowledges every update below it,
/// so the platform stops re-delivering them. The offset never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    next_offset: i64,
}

impl Cursor {
    /// A cursor starting at offset 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The offset to request from on the next fetch.
    pub fn next_offset(&self) -> i64 {
        self.next_offset
    }

    /// Record an observed update. Applies to every update, including ones
    /// that carry no join request.
    pub fn observe(&mut self, update_id: i64) {
        self.next_offset = self.next_offset.max(update_id.saturating_add(1));
    }
}
