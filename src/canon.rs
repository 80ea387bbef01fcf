//! Lexical path canonicalization.
//!
//! Only simplifies paths textually ("foo/./bar" => "foo/bar") without
//! touching the disk.  Redundant components show up all the time after
//! variable expansion, and the graph interns by canonical name, so this runs
//! on every path that enters the graph.

use anyhow::bail;

#[cfg(windows)]
fn is_sep(c: u8) -> bool {
    c == b'/' || c == b'\\'
}
#[cfg(not(windows))]
fn is_sep(c: u8) -> bool {
    c == b'/'
}

/// Canonicalize a path: collapse duplicate separators, "." and ".."
/// components.  Output always uses '/' as the separator.
/// Errors on an empty input and on an absolute path that attempts to step
/// above the filesystem root.
pub fn canon_path(path: impl Into<String>) -> anyhow::Result<String> {
    let path = path.into();
    if path.is_empty() {
        bail!("empty path");
    }
    let src = path.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(src.len());

    // Offsets in `out` where each kept component begins, for ".." to pop to.
    let mut components: Vec<usize> = Vec::new();

    let absolute = is_sep(src[0]);
    if absolute {
        out.push(b'/');
    }

    let mut pos = if absolute { 1 } else { 0 };
    // True when the last kept component was followed by a separator, which
    // is preserved in the output ("foo/." => "foo/").
    let mut trailing_sep = false;
    while pos < src.len() {
        if is_sep(src[pos]) {
            pos += 1;
            continue;
        }
        let start = pos;
        while pos < src.len() && !is_sep(src[pos]) {
            pos += 1;
        }
        match &src[start..pos] {
            b"." => {}
            b".." => {
                if let Some(ofs) = components.pop() {
                    out.truncate(ofs);
                } else if absolute {
                    bail!("path {:?} escapes the filesystem root", path);
                } else {
                    out.extend_from_slice(b"../");
                }
                trailing_sep = pos < src.len();
            }
            component => {
                components.push(out.len());
                out.extend_from_slice(component);
                out.push(b'/');
                trailing_sep = pos < src.len();
            }
        }
    }

    if out.is_empty() || (absolute && out.len() == 1) {
        return Ok(if absolute { "/" } else { "." }.to_string());
    }
    if !trailing_sep && out.last() == Some(&b'/') {
        out.pop();
    }
    // The input was a str and we only dropped or copied whole components.
    Ok(unsafe { String::from_utf8_unchecked(out) })
}
