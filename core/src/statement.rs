use derive_more::Display;
use ustr::Ustr;

use crate::error::{ArgumentError, SyntaxError};

/// A position in the in-memory line buffer of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("{line}:{offset}")]
pub struct FilePosition {
    pub line: usize,
    pub offset: usize,
}

impl FilePosition {
    #[inline]
    pub fn new(line: usize, offset: usize) -> Self {
        Self { line, offset }
    }

    #[inline]
    fn next(self) -> Self {
        Self::new(self.line, self.offset + 1)
    }
}

/// A logical position, as described by the preprocessor line markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("{file}:{line}")]
pub struct Location {
    pub file: Ustr,
    pub line: u32,
}

impl Location {
    pub fn new(file: Ustr, line: u32) -> Self {
        Self { file, line }
    }
}

/// The raw source of a single call argument along with its boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub source: String,
    pub start: FilePosition,
    pub end: FilePosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStatement {
    pub start: FilePosition,
    pub open_paren: FilePosition,
    pub close_paren: FilePosition,
    pub semicolon: FilePosition,
    pub arguments: Vec<Argument>,
}

impl LogStatement {
    /// Parses the invocation of `function` that begins at `start`.
    pub fn parse<S: AsRef<str>>(lines: &[S], start: FilePosition, function: &str) -> Result<Self, SyntaxError> {
        let after_name = FilePosition::new(start.line, start.offset + function.len());
        let open_paren = match peek_meaningful_char(lines, after_name) {
            Some(('(', pos)) => pos,
            _ => return Err(SyntaxError::MissingParen),
        };

        let mut arguments = vec![];
        let mut pos = open_paren;
        loop {
            let arg = parse_argument(lines, pos.next())?;
            pos = arg.end;
            arguments.push(arg);
            if byte_at(lines, pos) == Some(b')') {
                break;
            }
        }

        let semicolon = match peek_meaningful_char(lines, pos.next()) {
            Some((';', pos)) => pos,
            other => return Err(SyntaxError::MissingSemicolon(other)),
        };

        Ok(Self {
            start,
            open_paren,
            close_paren: pos,
            semicolon,
            arguments,
        })
    }
}

/// Extracts the argument starting at `start` (right after an opening parenthesis or a comma).
///
/// The argument ends at the first `,` or `)` found outside of literals while every bracket depth
/// is zero, so commas of nested calls, initializer lists and subscripts don't split it.
pub fn parse_argument<S: AsRef<str>>(lines: &[S], start: FilePosition) -> Result<Argument, ArgumentError> {
    let mut paren_depth = 0usize;
    let mut curly_depth = 0usize;
    let mut bracket_depth = 0usize;
    let mut in_quotes = false;
    let mut in_char = false;
    let mut source = String::new();

    let mut offset = start.offset;
    for (line_num, line) in lines.iter().enumerate().skip(start.line) {
        let line = line.as_ref();
        let mut prev_was_escape = false;

        for (i, c) in line.bytes().enumerate().skip(offset) {
            if c == b'\\' || prev_was_escape {
                prev_was_escape = !prev_was_escape;
                continue;
            }
            match c {
                b'"' if !in_char => in_quotes = !in_quotes,
                b'\'' if !in_quotes && (in_char || opens_char_literal(line.as_bytes(), i)) => in_char = !in_char,
                _ => {}
            }
            if in_quotes || in_char {
                continue;
            }

            let pos = FilePosition::new(line_num, i);
            match c {
                b'{' => curly_depth += 1,
                b'}' => curly_depth = close(curly_depth, pos, '}')?,
                b'(' => paren_depth += 1,
                b')' if paren_depth > 0 => paren_depth -= 1,
                b'[' => bracket_depth += 1,
                b']' => bracket_depth = close(bracket_depth, pos, ']')?,
                b',' | b')' if curly_depth == 0 && paren_depth == 0 && bracket_depth == 0 => {
                    source.push_str(&line[offset..i]);
                    return Ok(Argument { source, start, end: pos });
                }
                _ => {}
            }
        }

        source.push_str(line.get(offset..).unwrap_or_default());
        offset = 0;
    }

    Err(ArgumentError::Unterminated(start))
}

/// Whether the `'` at `i` opens a character literal rather than separating digits (`1'000`).
///
/// Prefixed literals such as `u8'a'` or `L'a'` still open one, only a preceding number does not.
pub(crate) fn opens_char_literal(line: &[u8], i: usize) -> bool {
    let token = line[..i]
        .iter()
        .rev()
        .take_while(|&&c| c.is_ascii_alphanumeric() || matches!(c, b'_' | b'.' | b'\''))
        .count();
    !line[i - token..i].first().is_some_and(u8::is_ascii_digit)
}

#[inline]
fn close(depth: usize, pos: FilePosition, c: char) -> Result<usize, ArgumentError> {
    depth.checked_sub(1).ok_or(ArgumentError::Unbalanced(pos, c))
}

/// Returns the next character that is not whitespace, starting at `pos` and moving across lines.
pub fn peek_meaningful_char<S: AsRef<str>>(lines: &[S], pos: FilePosition) -> Option<(char, FilePosition)> {
    let mut offset = pos.offset;
    for (line_num, line) in lines.iter().enumerate().skip(pos.line) {
        let rest = line.as_ref().get(offset..).unwrap_or_default();
        if let Some((i, c)) = rest.char_indices().find(|(_, c)| !c.is_whitespace()) {
            return Some((c, FilePosition::new(line_num, offset + i)));
        }
        offset = 0;
    }
    None
}

#[inline]
fn byte_at<S: AsRef<str>>(lines: &[S], pos: FilePosition) -> Option<u8> {
    lines.get(pos.line)?.as_ref().as_bytes().get(pos.offset).copied()
}
