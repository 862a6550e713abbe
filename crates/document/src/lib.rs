/// Shared project document model
/// The single unit of state kept consistent across collaborative sessions:
/// script breakdown, mood boards, and generation history.
use serde::{Deserialize, Serialize};

mod fingerprint;
pub use fingerprint::*;

/// Unique beat identifier within a script tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeatId(pub uuid::Uuid);

impl BeatId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for BeatId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique mood board identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardId(pub uuid::Uuid);

impl BoardId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self::new()
    }
}

/// A single story beat in the script breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub id: BeatId,
    pub heading: String,
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Beat {
    pub fn new(heading: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: BeatId::new(),
            heading: heading.into(),
            description: description.into(),
            notes: None,
        }
    }
}

/// Ordered script breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptTree {
    pub beats: Vec<Beat>,
}

impl ScriptTree {
    pub fn add_beat(&mut self, beat: Beat) -> BeatId {
        let id = beat.id;
        self.beats.push(beat);
        id
    }

    pub fn remove_beat(&mut self, id: BeatId) {
        self.beats.retain(|b| b.id != id);
    }

    pub fn beat_mut(&mut self, id: BeatId) -> Option<&mut Beat> {
        self.beats.iter_mut().find(|b| b.id == id)
    }
}

/// Reference image pinned to a mood board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodImage {
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// A named collection of reference imagery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodBoard {
    pub id: BoardId,
    pub name: String,
    pub images: Vec<MoodImage>,
}

impl MoodBoard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BoardId::new(),
            name: name.into(),
            images: Vec::new(),
        }
    }

    pub fn pin_image(&mut self, url: impl Into<String>, caption: Option<String>) {
        self.images.push(MoodImage {
            url: url.into(),
            caption,
        });
    }
}

/// One completed image-generation call and its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: uuid::Uuid,
    pub prompt: String,
    pub model: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl GenerationRecord {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            prompt: prompt.into(),
            model: model.into(),
            image_url: None,
            created_at: chrono::Utc::now(),
        }
    }
}

/// The whole in-memory project document
///
/// Transmitted and stored as one opaque composite blob; there is no
/// sub-document update path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub script_tree: ScriptTree,
    pub mood_boards: Vec<MoodBoard>,
    pub generation_history: Vec<GenerationRecord>,
}

impl ProjectDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_board(&mut self, board: MoodBoard) -> BoardId {
        let id = board.id;
        self.mood_boards.push(board);
        id
    }

    pub fn board_mut(&mut self, id: BoardId) -> Option<&mut MoodBoard> {
        self.mood_boards.iter_mut().find(|b| b.id == id)
    }

    pub fn record_generation(&mut self, record: GenerationRecord) {
        self.generation_history.push(record);
    }

    /// Structural fingerprint of the current content
    ///
    /// Cheap enough to run on every local mutation; equal fingerprints imply
    /// equal content, unequal fingerprints trigger a sync.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_tree_edits() {
        let mut doc = ProjectDocument::new();
        let beat = Beat::new("Opening", "Hero wakes up");
        let id = doc.script_tree.add_beat(beat);

        assert_eq!(doc.script_tree.beats.len(), 1);

        doc.script_tree.beat_mut(id).unwrap().notes = Some("dawn light".to_string());
        assert!(doc.script_tree.beats[0].notes.is_some());

        doc.script_tree.remove_beat(id);
        assert!(doc.script_tree.beats.is_empty());
    }

    #[test]
    fn test_mood_board_edits() {
        let mut doc = ProjectDocument::new();
        let id = doc.add_board(MoodBoard::new("Palette"));

        doc.board_mut(id)
            .unwrap()
            .pin_image("https://example.com/a.png", Some("warm tones".to_string()));

        assert_eq!(doc.mood_boards[0].images.len(), 1);
    }

    #[test]
    fn test_generation_history_appends() {
        let mut doc = ProjectDocument::new();
        doc.record_generation(GenerationRecord::new("a red door", "sd-xl"));
        doc.record_generation(GenerationRecord::new("a blue door", "sd-xl"));

        assert_eq!(doc.generation_history.len(), 2);
    }
}
