use std::path::Path;

use ustr::{Ustr, ustr};

use crate::cstring::extract_c_string;
use crate::error::{Error, Result};
use crate::registry::{CallSite, LogId, Registry};
use crate::statement::{FilePosition, Location, LogStatement, opens_char_literal, peek_meaningful_char};

/// Result of rewriting a single preprocessed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub source: String,
    pub unit: Option<Ustr>,
    pub calls: usize,
}

/// Logical coordinates maintained from the preprocessor line markers.
#[derive(Debug)]
struct LineState {
    file: Ustr,
    /// Logical line number of the next physical line.
    next_line: u32,
    unit: Option<Ustr>,
    has_support_header: bool,
}

impl LineState {
    fn new(origin: Ustr) -> Self {
        Self {
            file: origin,
            next_line: 1,
            unit: None,
            has_support_header: false,
        }
    }

    /// Consumes a physical line, returning its logical line number.
    fn advance(&mut self) -> u32 {
        let line = self.next_line;
        self.next_line += 1;
        line
    }
}

pub struct Scanner<'r, 'a> {
    registry: &'r mut Registry<'a>,
}

impl<'r, 'a> Scanner<'r, 'a> {
    pub fn new(registry: &'r mut Registry<'a>) -> Self {
        Self { registry }
    }

    /// Replaces every log statement of a preprocessed file with an invocation of its record function.
    ///
    /// `origin` names the file until the first line marker is seen.
    pub fn rewrite(&mut self, source: &str, origin: Ustr) -> Result<Rewritten> {
        let config = self.registry.config();
        let function = config.log_function.as_str();

        let mut lines: Vec<String> = source.split_inclusive('\n').map(str::to_owned).collect();
        let mut state = LineState::new(origin);
        let mut used_ids: Vec<LogId> = vec![];

        let mut li = 0;
        while li < lines.len() {
            if let Ok((line, file)) = marker::line_marker(&lines[li]) {
                self.enter_marker(&mut state, line, ustr(file));
                li += 1;
                continue;
            }

            let logical = state.advance();
            if config.ignored_files.contains(&state.file) {
                li += 1;
                continue;
            }

            if let Some(offset) = find_call(&lines, li, function) {
                let location = Location::new(state.file, logical);
                let id = self.process_call(&mut lines, FilePosition::new(li, offset), location, &state)?;
                used_ids.push(id);
            }
            li += 1;
        }

        if let Some(unit) = state.unit.filter(|unit| *unit != state.file) {
            log::warn!("Expected {origin} to end in the compilation unit {unit}, found {} instead", state.file);
        }

        let mut source = lines.concat();
        if !used_ids.is_empty() {
            source.push_str(&format!("\n\n# 1 \"{}\" 3\n", config.generated_file));
            source.push_str(&self.registry.record_definitions(&used_ids));
        }

        Ok(Rewritten {
            source,
            unit: state.unit,
            calls: used_ids.len(),
        })
    }

    fn enter_marker(&mut self, state: &mut LineState, line: u32, file: Ustr) {
        state.file = file;
        state.next_line = line;

        if state.unit.is_none() {
            log::debug!("Compilation unit {file}");
            state.unit = Some(file);
            self.registry.clear_unit(file);
        }
        let support_header = self.registry.config().support_header.as_deref();
        if support_header.is_some_and(|header| Path::new(file.as_str()).ends_with(header)) {
            state.has_support_header = true;
        }
    }

    fn process_call(
        &mut self,
        lines: &mut Vec<String>,
        start: FilePosition,
        location: Location,
        state: &LineState,
    ) -> Result<LogId> {
        let config = self.registry.config();
        let function = config.log_function.as_str();

        let stmt = LogStatement::parse(lines, start, function).map_err(|error| {
            let last = error.position().map_or(lines.len() - 1, |pos| pos.line);
            Error::Syntax {
                location,
                last_line: logical_line(location.line, start.line, last),
                error,
            }
        })?;

        let unit = state.unit.ok_or(Error::MissingLineMarker(location))?;
        if let Some(header) = config.support_header.as_ref().filter(|_| !state.has_support_header) {
            return Err(Error::MissingSupportHeader(location, header.clone()));
        }

        let index = config.format_arg_index;
        let format_arg = stmt
            .arguments
            .get(index)
            .ok_or(Error::MissingFormatArgument(location, index))?;
        let format = extract_c_string(&format_arg.source)
            .ok_or_else(|| Error::NonLiteralFormat(location, format_arg.source.trim().to_owned()))?;

        let site = CallSite {
            format: &format,
            unit,
            location,
        };
        let reg = self
            .registry
            .register(&site)
            .map_err(|err| Error::Format(location, err))?;

        let given = stmt.arguments.len() - index - 1;
        if given != reg.arity {
            log::warn!("{location}: \"{format}\" expects {} argument(s), {given} given", reg.arity);
        }
        log::debug!("{location}: replaced call with {}", reg.invocation);

        for arg in &stmt.arguments[..index] {
            blank_out(lines, arg.start, arg.end);
        }

        let semi_line = logical_line(location.line, start.line, stmt.semicolon.line);
        close_scope_after(lines, stmt.semicolon, semi_line, location.file);

        let call = &lines[start.line];
        let rest_at = start.offset + function.len();
        let rest = format!("{}{}", " ".repeat(call[..rest_at].chars().count()), &call[rest_at..]);
        let prefix = format!("{}\n", &call[..start.offset]);
        lines[start.line] = prefix;

        let injected = [
            format!("# 1 \"{}\"\n", config.injected_file),
            format!("{{ {};\n", reg.declaration),
            format!("{}\n", reg.invocation),
            format!("# {} \"{}\"\n", location.line, location.file),
            rest,
        ];
        lines.splice(start.line + 1..start.line + 1, injected);

        Ok(reg.id)
    }
}

/// Finds a call of `function` on the physical line `li`, outside of literals and not part of a longer identifier.
fn find_call(lines: &[String], li: usize, function: &str) -> Option<usize> {
    let line = &lines[li];
    let bytes = line.as_bytes();
    let first = *function.as_bytes().first()?;

    let mut in_quotes = false;
    let mut in_char = false;
    let mut prev_was_escape = false;
    let mut last = b'\0';

    for (i, &c) in bytes.iter().enumerate() {
        if c == b'\\' || prev_was_escape {
            prev_was_escape = !prev_was_escape;
            last = c;
            continue;
        }
        match c {
            b'"' if !in_char => in_quotes = !in_quotes,
            b'\'' if !in_quotes && (in_char || opens_char_literal(bytes, i)) => in_char = !in_char,
            _ if c == first
                && !in_quotes
                && !in_char
                && line[i..].starts_with(function)
                && !(last.is_ascii_alphanumeric() || last == b'_') =>
            {
                let after = FilePosition::new(li, i + function.len());
                if let Some(('(', _)) = peek_meaningful_char(lines, after) {
                    return Some(i);
                }
            }
            _ => {}
        }
        last = c;
    }
    None
}

/// Closes the scope opened by the injected code right after the semicolon of a statement.
///
/// Code following the semicolon is moved to a line of its own, aligned with its original column.
fn close_scope_after(lines: &mut Vec<String>, semicolon: FilePosition, logical: u32, file: Ustr) {
    let line = &lines[semicolon.line];
    let (head, tail) = line.split_at(semicolon.offset + 1);

    if tail.chars().any(|c| c.is_ascii_graphic() && c != ';') {
        let moved = format!("{}{tail}", " ".repeat(head.chars().count()));
        let marker = format!("# {logical} \"{file}\"\n");
        lines[semicolon.line] = format!("{head}}}\n");
        lines.splice(semicolon.line + 1..semicolon.line + 1, [marker, moved]);
    } else {
        lines[semicolon.line] = format!("{head}}}{tail}");
    }
}

/// Replaces the source between two positions (inclusive) with spaces, keeping line breaks.
fn blank_out(lines: &mut [String], start: FilePosition, end: FilePosition) {
    for (li, line) in lines.iter_mut().enumerate().take(end.line + 1).skip(start.line) {
        let from = if li == start.line { start.offset } else { 0 };
        let to = if li == end.line { end.offset + 1 } else { line.len() };
        let blanked: String = line[from..to]
            .chars()
            .map(|c| if c == '\n' || c == '\r' { c.to_string() } else { " ".repeat(c.len_utf8()) })
            .collect();
        line.replace_range(from..to, &blanked);
    }
}

fn logical_line(base: u32, base_physical: usize, physical: usize) -> u32 {
    let delta = u32::try_from(physical.saturating_sub(base_physical)).unwrap_or(u32::MAX);
    base.saturating_add(delta)
}

peg::parser! {
    grammar marker() for str {
        rule number() -> u32
            = n:$(['0'..='9']+) {? n.parse().or(Err("u32")) }
        rule spaces() = [' ' | '\t']+
        // GNU line marker (`# 12 "file.cc" 1 3`) or a `#line` directive
        pub rule line_marker() -> (u32, &'input str)
            = "#" [' ' | '\t']* ("line" spaces())? line:number() spaces()
              "\"" file:$(("\\" [_] / [^ '"' | '\\'])*) "\"" [_]*
            { (line, file) }
    }
}
