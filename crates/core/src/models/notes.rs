use serde::{Deserialize, Serialize};

/// Ordered mapping `title → free-form text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notes {
    entries: Vec<(String, String)>,
}

impl Default for Notes {
    fn default() -> Self {
        Self {
            entries: vec![("notes".to_string(), String::new())],
        }
    }
}

impl Notes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn titles(&self) -> Vec<&str> {
        self.entries.iter().map(|(t, _)| t.as_str()).collect()
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == title)
            .map(|(_, text)| text.as_str())
    }

    /// Insert or overwrite. New titles are appended at the end.
    pub fn set(&mut self, title: &str, text: impl Into<String>) {
        let text = text.into();
        match self.entries.iter_mut().find(|(t, _)| t == title) {
            Some(entry) => entry.1 = text,
            None => self.entries.push((title.to_string(), text)),
        }
    }

    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if self.entries.iter().any(|(t, _)| t == new) {
            return false;
        }
        match self.entries.iter_mut().find(|(t, _)| t == old) {
            Some(entry) => {
                entry.0 = new.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, title: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| t != title);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
