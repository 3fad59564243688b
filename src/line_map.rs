//! `#line` directives for generated translation units.
//!
//! Compiler diagnostics for the original part of a generated file should
//! point at the source the user wrote; everything from the generated-section
//! marker onward belongs to the generated file itself.

use std::fs;
use std::path::{Path, PathBuf};

/// Absolute, forward-slashed, quote-escaped form of `path` for a `#line`.
///
/// Existing paths are canonicalized; a path that does not exist yet is
/// joined onto the working directory as-is.
pub fn escape_path_for_line(path: &Path) -> String {
    let absolute: PathBuf = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(_) if path.is_absolute() => path.to_path_buf(),
        Err(_) => match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        },
    };
    absolute
        .to_string_lossy()
        .replace('\\', "/")
        .replace('"', "\\\"")
}

/// Prefixes `content` with `#line 1 "<src>"` and switches to
/// `#line 1 "<out>"` right before the first occurrence of `marker`.
pub fn inject_line_map(content: &str, src: &Path, out: &Path, marker: &str) -> String {
    let prefix = format!("#line 1 \"{}\"\n", escape_path_for_line(src));

    let found = if marker.is_empty() {
        None
    } else {
        content.find(marker)
    };
    let Some(index) = found else {
        return prefix + content;
    };

    let (head, tail) = content.split_at(index);
    let mut switch = format!("#line 1 \"{}\"\n", escape_path_for_line(out));
    if !head.is_empty() && !head.ends_with('\n') {
        switch.insert(0, '\n');
    }
    format!("{prefix}{head}{switch}{tail}")
}
