//! Parsing of the Makefile subset found in `.d` files emitted by C
//! compilers: a target, a colon, and a list of dependency paths with
//! backslash-newline continuations.  `$$` is a literal dollar sign; there is
//! no other expansion.

use crate::scanner::{ParseResult, Scanner};
use std::borrow::Cow;

/// The first rule in a depfile.  Per the format, any further rules are
/// ignored.
#[derive(Debug, PartialEq)]
pub struct Deps<'a> {
    pub target: Cow<'a, str>,
    pub deps: Vec<Cow<'a, str>>,
}

/// Skip spaces and backslashed newlines.
fn skip_spaces(scanner: &mut Scanner) -> ParseResult<()> {
    loop {
        match scanner.read() {
            ' ' => {}
            '\\' => match scanner.read() {
                '\n' => {}
                '\r' => {
                    scanner.expect('\n')?;
                }
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
/// Note: treats colon as a valid character in a path because of
/// Windows-style paths, which means an `output: ...` target path will
/// include the trailing colon.
fn read_path<'a>(scanner: &mut Scanner<'a>) -> ParseResult<Option<Cow<'a, str>>> {
    skip_spaces(scanner)?;
    let start = scanner.ofs;
    loop {
        match scanner.read() {
            '\0' | ' ' | '\n' | '\r' => {
                scanner.back();
                break;
            }
            '\\' => {
                if scanner.peek() == '\n' || scanner.peek() == '\r' {
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
    let path = scanner.slice(start, end);
    if path.contains("$$") {
        return Ok(Some(Cow::Owned(path.replace("$$", "$"))));
    }
    Ok(Some(Cow::Borrowed(path)))
}

fn strip_colon(path: Cow<str>) -> (Cow<str>, bool) {
    match path {
        Cow::Borrowed(s) => match s.strip_suffix(':') {
            Some(stripped) => (Cow::Borrowed(stripped), true),
            None => (Cow::Borrowed(s), false),
        },
        Cow::Owned(mut s) => {
            if s.ends_with(':') {
                s.pop();
                (Cow::Owned(s), true)
            } else {
                (Cow::Owned(s), false)
            }
        }
    }
}

/// Parse a `.d` file into the first rule's target and dependency list.
pub fn parse<'a>(scanner: &mut Scanner<'a>) -> ParseResult<Deps<'a>> {
    while matches!(scanner.peek(), ' ' | '\n' | '\r') {
        scanner.next();
    }
    let target = match read_path(scanner)? {
        None => return scanner.parse_error("expected depfile target"),
        Some(path) => path,
    };
    scanner.skip_spaces();
    let (target, had_colon) = strip_colon(target);
    if !had_colon {
        scanner.expect(':')?;
    }

    let mut deps = Vec::new();
    while let Some(path) = read_path(scanner)? {
        deps.push(path);
    }
    // Anything after the first rule (more targets, blank lines) is ignored.
    Ok(Deps { target, deps })
}
