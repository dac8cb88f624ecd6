use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::statement::{FilePosition, Location};

pub type Result<A, E = Error> = std::result::Result<A, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error at {location} (lines {}-{last_line}): {error}", .location.line)]
    Syntax {
        location: Location,
        last_line: u32,
        error: SyntaxError,
    },
    #[error("non-constant format string at {0}: {1}")]
    NonLiteralFormat(Location, String),
    #[error("missing format argument #{1} at {0}")]
    MissingFormatArgument(Location, usize),
    #[error("invalid format string at {0}: {1}")]
    Format(Location, FormatError),
    #[error("log statement at {0} used before '{1}' was included")]
    MissingSupportHeader(Location, String),
    #[error("log statement at {0} precedes any line marker, was the file preprocessed?")]
    MissingLineMarker(Location),
    #[error("conflicting descriptors for {symbol}: {first:?} in {} and {second:?} in {}", .first_store.display(), .second_store.display())]
    ConflictingDescriptor {
        symbol: String,
        first: String,
        first_store: PathBuf,
        second: String,
        second_store: PathBuf,
    },
    #[error("invalid mapping store {}: {}", .0.display(), .1)]
    InvalidStore(PathBuf, serde_json::Error),
    #[error("corrupt mapping store {}: {}", .0.display(), .1)]
    CorruptStore(PathBuf, String),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("{0}")]
    Argument(#[from] ArgumentError),
    #[error("cannot find '(' after the log function")]
    MissingParen,
    #[error("expected ';' after the log statement, found {0:?}")]
    MissingSemicolon(Option<(char, FilePosition)>),
}

impl SyntaxError {
    /// Physical position where scanning gave up, `None` when it ran off the end of the file.
    pub fn position(&self) -> Option<FilePosition> {
        match self {
            SyntaxError::Argument(ArgumentError::Unbalanced(pos, _)) => Some(*pos),
            SyntaxError::MissingSemicolon(found) => found.map(|(_, pos)| pos),
            SyntaxError::Argument(ArgumentError::Unterminated(_)) | SyntaxError::MissingParen => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("cannot find end of argument starting at {0}")]
    Unterminated(FilePosition),
    #[error("unbalanced '{1}' at {0}")]
    Unbalanced(FilePosition, char),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("\"{0}\" print specifier not supported")]
    Unsupported(String),
    #[error("unrecognized format specifier: \"{0}\"")]
    Unrecognized(String),
    #[error("invalid length modifier in \"{0}\"")]
    InvalidLength(String),
}
