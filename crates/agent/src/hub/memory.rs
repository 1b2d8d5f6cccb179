//! Remembered USB2 → USB3 companion pairings
//!
//! Lives for the whole process. Entries are upserted and never removed, so a
//! USB3 half that drops out for a cycle is paired again when it returns.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanionMemory {
    pairs: BTreeMap<String, String>,
}

impl CompanionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembered USB3 port path for a USB2 port path
    pub fn get(&self, path2: &str) -> Option<&str> {
        self.pairs.get(path2).map(String::as_str)
    }

    /// Record a pairing, replacing any earlier one for `path2`
    ///
    /// Returns true when the stored value changed.
    pub fn upsert(&mut self, path2: &str, path3: &str) -> bool {
        if self.get(path2) == Some(path3) {
            return false;
        }
        self.pairs.insert(path2.to_string(), path3.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_overwrites() {
        let mut memory = CompanionMemory::new();
        assert!(memory.upsert("0014-0-1", "0014-0-15"));
        assert!(!memory.upsert("0014-0-1", "0014-0-15"));
        assert!(memory.upsert("0014-0-1", "0014-0-16"));

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.get("0014-0-1"), Some("0014-0-16"));
        assert_eq!(memory.get("0014-0-2"), None);
    }
}
