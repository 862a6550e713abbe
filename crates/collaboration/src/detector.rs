/// Change detection against the last-synced snapshot
use document::{Fingerprint, ProjectDocument};

/// Decides whether the local document diverged from the last-synced state
///
/// Never produces a false negative; may over-trigger on cosmetic changes,
/// which the debounce absorbs. Only consulted while the session is shared.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_synced: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the document differs from the last-synced fingerprint
    ///
    /// With no baseline recorded yet, everything counts as dirty.
    pub fn is_dirty(&self, document: &ProjectDocument) -> bool {
        match self.last_synced {
            Some(baseline) => document.fingerprint() != baseline,
            None => true,
        }
    }

    /// Re-baseline after a successful write or an applied remote snapshot
    pub fn mark_synced(&mut self, document: &ProjectDocument) {
        self.last_synced = Some(document.fingerprint());
    }

    /// Forget the baseline (leaving shared mode)
    pub fn reset(&mut self) {
        self.last_synced = None;
    }
}
