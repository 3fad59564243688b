//! Regex function-boundary scan. Names and ranges only.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{DeclarationSource, Fidelity, FunctionRecord, NodeKind};
use crate::errors::PassError;

static FUNCTION_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<name>[A-Za-z_]\w*(?:::[A-Za-z_]\w*)*)\s*\([^;{}]*\)\s*(?:const\s*)?(?:noexcept\s*)?(?:->\s*[^{};]+)?\s*\{",
    )
    .expect("static regex")
});

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch"];

/// Best-effort scanner for tooling that only needs where functions start.
///
/// Only definitions (a head followed by `{`) are found, and the fully
/// qualified name is whatever qualification the head spells out.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundaryScanner;

impl BoundaryScanner {
    pub fn new() -> Self {
        Self
    }
}

impl DeclarationSource for BoundaryScanner {
    fn name(&self) -> &'static str {
        "boundary-scan"
    }

    fn fidelity(&self) -> Fidelity {
        Fidelity::BoundariesOnly
    }

    fn extract(&mut self, masked: &str) -> Result<Vec<FunctionRecord>, PassError> {
        let records: Vec<FunctionRecord> = FUNCTION_HEAD
            .captures_iter(masked)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let fullname = caps.name("name")?.as_str().trim_start_matches("::");
                let name = fullname.rsplit("::").next().unwrap_or(fullname);
                if CONTROL_KEYWORDS.contains(&name) {
                    return None;
                }
                Some(FunctionRecord {
                    name: name.to_string(),
                    fullname: fullname.to_string(),
                    start: whole.start(),
                    end: whole.end(),
                    kind: NodeKind::Scanned,
                    namespace: Vec::new(),
                    signature: None,
                })
            })
            .collect();
        tracing::debug!(records = records.len(), "boundary scan found function heads");
        Ok(records)
    }
}
