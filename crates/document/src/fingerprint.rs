/// Content fingerprinting for dirty detection
use serde::Serialize;

/// Structural digest of a serializable value
///
/// Computed over the canonical JSON form, so array identity churn that does
/// not change content produces the same fingerprint, while any real content
/// change always produces a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of<T: Serialize>(value: &T) -> Self {
        // Serialization of a plain data tree cannot fail; fall back to an
        // empty digest input rather than poisoning the sync path.
        let json = serde_json::to_vec(value).unwrap_or_default();
        Self(*blake3::hash(&json).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Beat, ProjectDocument};

    #[test]
    fn test_fingerprint_stable_for_equal_content() {
        let a = ProjectDocument::new();
        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_on_content_change() {
        let mut doc = ProjectDocument::new();
        let before = doc.fingerprint();

        doc.script_tree.add_beat(Beat::new("Act I", "Setup"));
        let after = doc.fingerprint();

        assert_ne!(before, after);
    }

    #[test]
    fn test_fingerprint_hex_shape() {
        let hex = ProjectDocument::new().fingerprint().to_hex();
        assert_eq!(hex.len(), 64);
    }
}
