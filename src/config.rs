//! Run configuration for the decorator pass.

/// Reserved marker keyword.
pub const MARKER_KEYWORD: &str = "decorator";
/// Character every marker argument must start with.
pub const MARKER_SIGIL: char = '@';
/// Provenance tag recorded on hits found by the text scanner.
pub const MACRO_PROVENANCE: &str = "macro";
/// Comment line separating original text from generated bindings.
pub const GENERATED_SECTION_MARKER: &str = "// Generated decorator bindings.";

/// Everything that can vary between runs of the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassConfig {
    pub keyword: String,
    pub sigil: char,
    pub provenance: String,
    pub section_marker: String,
    /// Hook modules, in invocation order.
    pub modules: Vec<String>,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            keyword: MARKER_KEYWORD.to_string(),
            sigil: MARKER_SIGIL,
            provenance: MACRO_PROVENANCE.to_string(),
            section_marker: GENERATED_SECTION_MARKER.to_string(),
            modules: Vec::new(),
        }
    }
}

impl PassConfig {
    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = modules.into_iter().map(Into::into).collect();
        self
    }
}

/// Splits a comma-separated module list. Order is kept, duplicates dropped.
pub fn parse_module_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !out.iter().any(|seen| seen == name) {
            out.push(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_list_keeps_first_occurrence() {
        assert_eq!(
            parse_module_list(" inject, invoker,,inject , "),
            vec!["inject".to_string(), "invoker".to_string()]
        );
    }

    #[test]
    fn empty_module_list() {
        assert!(parse_module_list("").is_empty());
        assert!(parse_module_list(" , ").is_empty());
    }
}
