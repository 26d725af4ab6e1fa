mod choice;
mod context;
mod transcript;

pub use choice::{parse_choice, parse_console_input, Choice, ConsoleCommand};
pub use context::ContextWindow;
pub use transcript::{EntryKind, Transcript, TranscriptEntry};
