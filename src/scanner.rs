//! Marker Scanner
//!
//! Finds `decorator(@expr, ...)` invocations in raw C++ text without a
//! preprocessor. Comments, string and character literals (raw strings
//! included) are skipped so a keyword or parenthesis inside them never
//! counts. The scan works on bytes: every delimiter it cares about is ASCII,
//! and UTF-8 continuation bytes never collide with ASCII.

use crate::config::PassConfig;
use crate::errors::{to_source_span, ErrorReporting, PassError, PhaseContext, SourceContext};
use serde::Serialize;

/// One matched marker argument.
///
/// A marker with several arguments yields several hits sharing the same
/// `start`/`end`; the range always covers the whole invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerHit {
    pub start: usize,
    pub end: usize,
    /// Argument text with the sigil stripped.
    pub expression: String,
    pub provenance: String,
}

/// Scanner for one marker syntax (keyword + sigil).
#[derive(Debug, Clone)]
pub struct MarkerScanner<'a> {
    keyword: &'a str,
    sigil: char,
    provenance: &'a str,
}

impl<'a> MarkerScanner<'a> {
    pub fn new(config: &'a PassConfig) -> Self {
        Self {
            keyword: &config.keyword,
            sigil: config.sigil,
            provenance: &config.provenance,
        }
    }

    /// Scans `source.content` and returns hits ordered by start offset.
    pub fn scan(&self, source: &SourceContext) -> Result<Vec<MarkerHit>, PassError> {
        let text = source.content.as_str();
        let bytes = text.as_bytes();
        let n = bytes.len();
        let mut out = Vec::new();
        let mut i = 0;

        while i < n {
            if let Some(next) = skip_trivia(bytes, i) {
                i = next;
                continue;
            }

            if !is_ident_start(bytes[i]) {
                i += 1;
                continue;
            }

            let ident_start = i;
            while i < n && is_ident_byte(bytes[i]) {
                i += 1;
            }
            let ident = &text[ident_start..i];

            if i < n && bytes[i] == b'"' && is_raw_string_prefix(ident) {
                i = skip_raw_string(bytes, i);
                continue;
            }
            if ident != self.keyword {
                continue;
            }
            if ident_start > 0 {
                let prev = bytes[ident_start - 1];
                if is_ident_byte(prev) || prev == b':' {
                    continue;
                }
            }

            let mut open = i;
            while open < n && bytes[open].is_ascii_whitespace() {
                open += 1;
            }
            if open >= n || bytes[open] != b'(' {
                continue;
            }

            let close = match find_matching_paren(bytes, open) {
                Some(close) => close,
                None => {
                    let ctx = PhaseContext::new(source.clone(), "scan");
                    return Err(ctx
                        .malformed_marker(
                            &format!("unmatched '(' in {} marker near byte {}", self.keyword, ident_start),
                            &text[ident_start..],
                            to_source_span(ident_start, open + 1),
                        )
                        .with_help("close the marker's argument list with ')'"));
                }
            };

            let marker_end = close + 1;
            for raw_arg in split_marker_args(&text[open + 1..close]) {
                let expression = self
                    .normalize_argument(raw_arg)
                    .map_err(|reason| {
                        let ctx = PhaseContext::new(source.clone(), "scan");
                        ctx.malformed_marker(
                            &format!("{} (near byte {} in {} marker)", reason, ident_start, self.keyword),
                            raw_arg,
                            to_source_span(ident_start, marker_end),
                        )
                    })?;
                let Some(expression) = expression else {
                    continue;
                };
                out.push(MarkerHit {
                    start: ident_start,
                    end: marker_end,
                    expression,
                    provenance: self.provenance.to_string(),
                });
            }
            i = marker_end;
        }

        out.sort_by_key(|hit| hit.start);
        tracing::debug!(markers = out.len(), source = %source.name, "scanned decorator markers");
        Ok(out)
    }

    /// `Ok(None)` for an empty argument, the stripped expression otherwise.
    fn normalize_argument(&self, raw: &str) -> Result<Option<String>, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let Some(rest) = trimmed.strip_prefix(self.sigil) else {
            return Err(format!(
                "{}(...) arguments must start with '{}', got: {:?}",
                self.keyword, self.sigil, trimmed
            ));
        };
        let expression = rest.trim();
        if expression.is_empty() {
            return Err(format!(
                "{}(...) argument '{}' must be followed by an expression",
                self.keyword, self.sigil
            ));
        }
        Ok(Some(expression.to_string()))
    }
}

/// Splits an argument list on top-level commas.
///
/// Commas inside `()`, `[]`, `{}`, comments and literals do not split.
/// Arguments are trimmed; a trailing empty argument is dropped.
pub fn split_marker_args(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let n = bytes.len();
    let mut args = Vec::new();
    let (mut paren, mut bracket, mut brace) = (0usize, 0usize, 0usize);
    let mut start = 0;
    let mut i = 0;

    while i < n {
        if let Some(next) = skip_trivia(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'(' => paren += 1,
            b')' => paren = paren.saturating_sub(1),
            b'[' => bracket += 1,
            b']' => bracket = bracket.saturating_sub(1),
            b'{' => brace += 1,
            b'}' => brace = brace.saturating_sub(1),
            b',' if paren == 0 && bracket == 0 && brace == 0 => {
                args.push(raw[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    let tail = raw[start..].trim();
    if !tail.is_empty() {
        args.push(tail);
    }
    args
}

// ============================================================================
// LEXICAL HELPERS
// ============================================================================

/// If `i` starts a comment or literal, returns the offset just past it.
fn skip_trivia(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        b'/' if bytes.get(i + 1) == Some(&b'/') => Some(skip_line_comment(bytes, i)),
        b'/' if bytes.get(i + 1) == Some(&b'*') => Some(skip_block_comment(bytes, i)),
        b'"' | b'\'' => Some(skip_quoted(bytes, i)),
        _ => None,
    }
}

/// Stops at the newline, which is left for the caller.
fn skip_line_comment(bytes: &[u8], mut i: usize) -> usize {
    i += 2;
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

/// An unterminated block comment runs to end of input.
fn skip_block_comment(bytes: &[u8], mut i: usize) -> usize {
    i += 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

/// An unterminated literal runs to end of input.
fn skip_quoted(bytes: &[u8], mut i: usize) -> usize {
    let quote = bytes[i];
    i += 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// `R"delim( ... )delim"`; `i` points at the opening quote.
fn skip_raw_string(bytes: &[u8], i: usize) -> usize {
    let mut j = i + 1;
    while j < bytes.len() && bytes[j] != b'(' && j - i <= 17 {
        if matches!(bytes[j], b' ' | b'\\' | b')' | b'"' | b'\n') {
            return skip_quoted(bytes, i);
        }
        j += 1;
    }
    if j >= bytes.len() || bytes[j] != b'(' {
        return skip_quoted(bytes, i);
    }

    let delim = &bytes[i + 1..j];
    let mut k = j + 1;
    while k < bytes.len() {
        if bytes[k] == b')'
            && bytes[k + 1..].starts_with(delim)
            && bytes.get(k + 1 + delim.len()) == Some(&b'"')
        {
            return k + delim.len() + 2;
        }
        k += 1;
    }
    bytes.len()
}

/// Returns the offset of the `)` closing the `(` at `open`.
fn find_matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut k = open + 1;
    while k < bytes.len() {
        if let Some(next) = skip_trivia(bytes, k) {
            k = next;
            continue;
        }
        match bytes[k] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(k);
                }
            }
            _ => {}
        }
        k += 1;
    }
    None
}

fn is_raw_string_prefix(ident: &str) -> bool {
    matches!(ident, "R" | "LR" | "uR" | "UR" | "u8R")
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn scan(text: &str) -> Result<Vec<MarkerHit>, PassError> {
        let config = PassConfig::default();
        MarkerScanner::new(&config).scan(&SourceContext::from_file("test.cpp", text))
    }

    #[test]
    fn finds_single_marker() {
        let text = "decorator(@inject)\nvoid f() {}\n";
        let hits = scan(text).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start, 0);
        assert_eq!(hits[0].end, "decorator(@inject)".len());
        assert_eq!(hits[0].expression, "inject");
        assert_eq!(hits[0].provenance, "macro");
    }

    #[test]
    fn multiple_arguments_share_range() {
        let hits = scan("decorator(@a, @app.get(\"/x\", 1), @ns::b)\nvoid f();").unwrap();
        let exprs: Vec<_> = hits.iter().map(|h| h.expression.as_str()).collect();
        assert_eq!(exprs, vec!["a", "app.get(\"/x\", 1)", "ns::b"]);
        assert!(hits.iter().all(|h| h.start == 0 && h.end == hits[0].end));
    }

    #[test]
    fn ignores_comments_and_literals() {
        let text = r#"
// decorator(@in_line_comment)
/* decorator(@in_block) */
const char* s = "decorator(@in_string)";
char c = '(';
auto r = R"x(decorator(@in_raw) )" )x";
decorator(@real)
void f() {}
"#;
        let hits = scan(text).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].expression, "real");
    }

    #[test]
    fn keyword_must_stand_alone() {
        let hits = scan("my_decorator(@x) ns::decorator(@y) decorators(@z) void f();").unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn keyword_without_parenthesis_is_not_a_marker() {
        let hits = scan("int decorator = 3;\nint f();").unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn whitespace_between_keyword_and_paren() {
        let hits = scan("decorator \n ( @x )\nvoid f();").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].expression, "x");
    }

    #[test]
    fn literal_paren_does_not_close_marker() {
        let hits = scan("decorator(@route(\")\"))\nvoid f();").unwrap();
        assert_eq!(hits[0].expression, "route(\")\")");
    }

    #[test]
    fn unmatched_paren_is_fatal() {
        let err = scan("decorator(@x\nvoid f() {}").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MalformedMarker { .. }));
        assert!(err.to_string().contains("near byte 0"));
    }

    #[test]
    fn missing_sigil_is_fatal() {
        let err = scan("decorator(inject)\nvoid f();").unwrap_err();
        match err.kind {
            ErrorKind::MalformedMarker { argument, reason } => {
                assert_eq!(argument, "inject");
                assert!(reason.contains("must start with '@'"));
            }
            other => panic!("unexpected error kind: {:?}", other),
        }
    }

    #[test]
    fn bare_sigil_is_fatal() {
        let err = scan("decorator(@ )\nvoid f();").unwrap_err();
        assert!(err.to_string().contains("must be followed by an expression"));
    }

    #[test]
    fn empty_arguments_are_dropped() {
        let hits = scan("decorator(@a, )\nvoid f();").unwrap();
        assert_eq!(hits.len(), 1);
        let none = scan("decorator()\nvoid f();").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn split_respects_nesting() {
        assert_eq!(
            split_marker_args("@a(1, 2), @b[3, 4], @c{5, 6}, @d /* , */"),
            vec!["@a(1, 2)", "@b[3, 4]", "@c{5, 6}", "@d /* , */"]
        );
        assert_eq!(split_marker_args("@x(\",\")"), vec!["@x(\",\")"]);
    }

    #[test]
    fn non_ascii_text_keeps_byte_offsets() {
        let text = "// überprüfung\ndecorator(@x)\nvoid f();";
        let hits = scan(text).unwrap();
        let start = text.find("decorator").unwrap();
        assert_eq!(hits[0].start, start);
        assert_eq!(&text[hits[0].start..hits[0].end], "decorator(@x)");
    }

    #[test]
    fn unterminated_block_comment_runs_to_end() {
        assert!(scan("int x;\n/* decorator(@x)").unwrap().is_empty());
        assert!(scan("/* decorator(@x)\nvoid f() {}\n*").unwrap().is_empty());
    }

    #[test]
    fn unterminated_literal_runs_to_end() {
        assert!(scan("\"decorator(@x)").unwrap().is_empty());
        assert!(scan("'decorator(@x)\nvoid f();").unwrap().is_empty());
        assert!(scan("\"decorator(@x)\\").unwrap().is_empty());
        assert!(scan("auto s = R\"d(decorator(@x)").unwrap().is_empty());
    }

    #[test]
    fn marker_before_unterminated_comment_still_found() {
        let hits = scan("decorator(@x)\nvoid f();\n/* trailing").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].expression, "x");
    }
}
