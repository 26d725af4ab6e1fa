//! JSON frames exchanged with the browser client over `/ws/game`.

use serde::{Deserialize, Serialize};

use crate::story::{parse_choice, Choice};

pub const DEFAULT_PREMISE: &str = "a brave adventurer in a mysterious land";

pub const INVALID_CHOICE_NOTICE: &str = "Invalid choice. Please enter A or B.";

#[derive(Debug, Clone, Default, Deserialize)]
struct StartFrame {
    #[serde(default)]
    idea: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChoiceFrame {
    #[serde(default)]
    choice: Option<String>,
}

/// Premise from the opening `{"idea": ...}` frame.
///
/// A missing, blank, or non-JSON frame falls back to [`DEFAULT_PREMISE`].
pub fn parse_start_frame(raw: &str) -> String {
    serde_json::from_str::<StartFrame>(raw)
        .ok()
        .and_then(|frame| frame.idea)
        .map(|idea| idea.trim().to_string())
        .filter(|idea| !idea.is_empty())
        .unwrap_or_else(|| DEFAULT_PREMISE.to_string())
}

/// Choice from a `{"choice": "A"|"B"}` frame; anything else is `None`.
pub fn parse_choice_frame(raw: &str) -> Option<Choice> {
    serde_json::from_str::<ChoiceFrame>(raw)
        .ok()
        .and_then(|frame| frame.choice)
        .and_then(|choice| parse_choice(&choice))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Story { text: String },
    Image { data: String },
    Notice { text: String },
}

impl ServerFrame {
    pub fn story(text: impl Into<String>) -> Self {
        Self::Story { text: text.into() }
    }

    pub fn image(data: impl Into<String>) -> Self {
        Self::Image { data: data.into() }
    }

    pub fn invalid_choice() -> Self {
        Self::Notice {
            text: INVALID_CHOICE_NOTICE.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
