use serde::{Deserialize, Serialize};

use super::choice::Choice;
use super::context::ContextWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Premise,
    Scene,
    Choice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub text: String,
}

impl TranscriptEntry {
    /// The line as it is replayed to the text model.
    pub fn render(&self) -> String {
        match self.kind {
            EntryKind::Premise => format!("The user's character is {}.", self.text),
            EntryKind::Scene => format!("AI Scene: {}", self.text),
            EntryKind::Choice => format!("User chose: {}", self.text),
        }
    }
}

/// Ordered story history for one session. Entries are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_premise(&mut self, idea: &str) {
        self.push(EntryKind::Premise, idea.to_string());
    }

    pub fn record_scene(&mut self, text: &str) {
        self.push(EntryKind::Scene, text.to_string());
    }

    pub fn record_choice(&mut self, choice: Choice) {
        self.push(EntryKind::Choice, choice.as_str().to_string());
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        self.entries.as_slice()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Every rendered entry joined with a single space.
    pub fn joined(&self) -> String {
        self.window(&ContextWindow::unbounded())
    }

    /// The slice of history that fits `window`, rendered for the prompt.
    pub fn window(&self, window: &ContextWindow) -> String {
        window.render(&self.entries)
    }

    fn push(&mut self, kind: EntryKind, text: String) {
        self.entries.push(TranscriptEntry { kind, text });
    }
}
