use super::transcript::{EntryKind, TranscriptEntry};

pub const DEFAULT_CONTEXT_MAX_ENTRIES: usize = 24;
pub const DEFAULT_CONTEXT_MAX_CHARS: usize = 12_000;

/// Bounds on the history replayed to the text model each turn.
///
/// The premise entry is always kept. Remaining entries are taken newest
/// first until either budget runs out, then rendered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    pub max_entries: usize,
    pub max_chars: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CONTEXT_MAX_ENTRIES,
            max_chars: DEFAULT_CONTEXT_MAX_CHARS,
        }
    }
}

impl ContextWindow {
    pub fn new(max_entries: usize, max_chars: usize) -> Self {
        Self {
            max_entries,
            max_chars,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }

    pub fn render(&self, entries: &[TranscriptEntry]) -> String {
        let (premise, rest) = match entries.split_first() {
            Some((first, rest)) if first.kind == EntryKind::Premise => {
                (Some(first.render()), rest)
            }
            _ => (None, entries),
        };

        let mut used_chars = premise.as_ref().map(|line| line.chars().count()).unwrap_or(0);
        let mut used_entries = usize::from(premise.is_some());
        let mut kept: Vec<String> = Vec::new();
        for entry in rest.iter().rev() {
            if used_entries >= self.max_entries {
                break;
            }
            let line = entry.render();
            let separator = usize::from(used_entries > 0);
            let cost = line.chars().count().saturating_add(separator);
            if used_chars.saturating_add(cost) > self.max_chars {
                break;
            }
            used_chars += cost;
            used_entries += 1;
            kept.push(line);
        }
        kept.reverse();

        premise
            .into_iter()
            .chain(kept)
            .collect::<Vec<String>>()
            .join(" ")
    }
}
