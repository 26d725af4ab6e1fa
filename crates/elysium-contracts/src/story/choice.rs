use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
}

impl Choice {
    pub fn as_str(self) -> &'static str {
        match self {
            Choice::A => "A",
            Choice::B => "B",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `a`/`b` in any case, surrounding whitespace ignored.
pub fn parse_choice(raw: &str) -> Option<Choice> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "A" => Some(Choice::A),
        "B" => Some(Choice::B),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    Choose(Choice),
    Invalid(String),
}

pub fn parse_console_input(raw: &str) -> ConsoleCommand {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("quit") {
        return ConsoleCommand::Quit;
    }
    match parse_choice(trimmed) {
        Some(choice) => ConsoleCommand::Choose(choice),
        None => ConsoleCommand::Invalid(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_parse_case_insensitively() {
        assert_eq!(parse_choice("a"), Some(Choice::A));
        assert_eq!(parse_choice(" B \n"), Some(Choice::B));
        assert_eq!(parse_choice("c"), None);
        assert_eq!(parse_choice("AB"), None);
        assert_eq!(parse_choice(""), None);
    }

    #[test]
    fn console_input_recognizes_quit_and_invalid() {
        assert_eq!(parse_console_input("QUIT"), ConsoleCommand::Quit);
        assert_eq!(parse_console_input("quit\n"), ConsoleCommand::Quit);
        assert_eq!(
            parse_console_input("b"),
            ConsoleCommand::Choose(Choice::B)
        );
        assert_eq!(
            parse_console_input(" maybe "),
            ConsoleCommand::Invalid("maybe".to_string())
        );
    }
}
