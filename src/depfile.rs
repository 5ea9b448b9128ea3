//! Parsing of Makefile syntax as found in `.d` files emitted by C compilers.

use std::path::Path;

use anyhow::{anyhow, bail};

use crate::scanner::{ParseResult, Scanner};

/// Skip spaces and backslashed newlines.
fn skip_spaces(scanner: &mut Scanner) -> ParseResult<()> {
    loop {
        match scanner.read() {
            ' ' => {}
            '\\' => match scanner.read() {
                '\n' => {}
                _ => return scanner.parse_error("invalid backslash escape"),
            },
            _ => {
                scanner.back();
                break;
            }
        }
    }
    Ok(())
}

/// Read one path from the input scanner.
/// A backslash is part of the path unless a newline follows it, so
/// Windows-style separators survive.
fn read_path<'a>(scanner: &mut Scanner<'a>) -> ParseResult<Option<&'a str>> {
    skip_spaces(scanner)?;
    let start = scanner.ofs;
    loop {
        match scanner.read() {
            '\0' | ' ' | '\n' => {
                scanner.back();
                break;
            }
            '\\' => {
                if scanner.peek() == '\n' {
                    scanner.back();
                    break;
                }
            }
            _ => {}
        }
    }
    let end = scanner.ofs;
    if end == start {
        return Ok(None);
    }
    Ok(Some(scanner.slice(start, end)))
}

/// Parse a single-rule `.d` file: everything up to and including the first
/// colon is the rule head, the first `.cpp` token after it is the rule's own
/// input, and the remaining tokens are the discovered headers.
pub fn parse<'a>(scanner: &mut Scanner<'a>) -> ParseResult<Vec<&'a str>> {
    loop {
        match scanner.read() {
            ':' => break,
            '\0' => return scanner.parse_error("expected ':'"),
            _ => {}
        }
    }

    let mut deps = Vec::new();
    let mut own_input_seen = false;
    loop {
        while matches!(scanner.peek(), ' ' | '\n') {
            scanner.next();
        }
        match read_path(scanner)? {
            None => break,
            Some(path) => {
                if !own_input_seen && path.ends_with(".cpp") {
                    own_input_seen = true;
                    continue;
                }
                deps.push(path);
            }
        }
    }
    Ok(deps)
}

/// Reads a `.d` file, returning the header paths it records.
pub fn read(path: &Path) -> anyhow::Result<Vec<String>> {
    let mut bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(err) => bail!("read {}: {}", path.display(), err),
    };
    bytes.push(0);
    let mut scanner = Scanner::new(&bytes);
    let deps =
        parse(&mut scanner).map_err(|err| anyhow!(scanner.format_parse_error(path, err)))?;
    Ok(deps.iter().map(|dep| dep.to_string()).collect())
}
