use std::{error, fmt};

use crate::linemap::Position;

/// An edit that cannot be applied to the source it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    LineOutOfBounds { line: u32, line_count: u32 },
    InvertedRange { start: Position, end: Position },
}

impl error::Error for EditError {}
impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::LineOutOfBounds { line, line_count } => write!(
                f,
                "Edit targets line {line} but the source has {line_count} lines"
            ),
            EditError::InvertedRange { start, end } => {
                write!(f, "Edit starts at {start} which is after its end {end}")
            }
        }
    }
}

/// A grammar description that cannot be turned into a grammar.
#[derive(Debug, Clone)]
pub enum GrammarError {
    UnknownToken(String),
    UndefinedNonTerminal(String),
    InvalidPattern { name: String, error: regex::Error },
}

impl error::Error for GrammarError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            GrammarError::InvalidPattern { error, .. } => Some(error),
            _ => None,
        }
    }
}
impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::UnknownToken(name) => write!(f, "Unknown token '{name}'"),
            GrammarError::UndefinedNonTerminal(name) => {
                write!(f, "Non-terminal '{name}' has no rule")
            }
            GrammarError::InvalidPattern { name, error } => {
                write!(f, "Invalid pattern for '{name}'\n{error}")
            }
        }
    }
}
