//! Diagnostic bag and source-span machinery shared by every pass in
//! `bt-dsl-sema`, the driver, and the language-service workspace.

pub mod span_map;
pub use span_map::SourceMap;

use serde::Serialize;

/// A half-open byte range into one source file. AST nodes carry one of
/// these; diagnostics anchor to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ByteRange {
    pub start: u32,
    pub end: u32,
}

impl ByteRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub const fn empty_at(pos: u32) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn join(&self, other: ByteRange) -> ByteRange {
        ByteRange::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// The taxonomy from spec.md §7. Each category owns a stable code prefix;
/// `error_codes` below assigns concrete short codes used in diagnostic
/// output and the `code` field of `diagnostics_json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Parse,
    Import,
    Resolution,
    ConstEval,
    Type,
    Safety,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecondaryLabel {
    pub range: ByteRange,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub code: &'static str,
    pub message: String,
    pub range: ByteRange,
    pub source: &'static str,
    pub secondary: Vec<SecondaryLabel>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        category: Category,
        code: &'static str,
        message: impl Into<String>,
        range: ByteRange,
    ) -> Self {
        Self {
            severity,
            category,
            code,
            message: message.into(),
            range,
            source: "bt-dsl",
            secondary: Vec::new(),
            help: None,
        }
    }

    pub fn error(
        category: Category,
        code: &'static str,
        message: impl Into<String>,
        range: ByteRange,
    ) -> Self {
        Self::new(Severity::Error, category, code, message, range)
    }

    pub fn warning(
        category: Category,
        code: &'static str,
        message: impl Into<String>,
        range: ByteRange,
    ) -> Self {
        Self::new(Severity::Warning, category, code, message, range)
    }

    pub fn with_secondary(mut self, range: ByteRange, message: impl Into<String>) -> Self {
        self.secondary.push(SecondaryLabel {
            range,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// JSON shape required by `diagnostics_json` in spec.md §6.
    pub fn to_json(&self, map: &SourceMap) -> serde_json::Value {
        let (start_line, start_column) = map.line_col(self.range.start);
        let (end_line, end_column) = map.line_col(self.range.end);
        serde_json::json!({
            "severity": match self.severity { Severity::Error => "error", Severity::Warning => "warning" },
            "message": self.message,
            "range": {
                "startByte": self.range.start,
                "endByte": self.range.end,
                "startLine": start_line,
                "startColumn": start_column,
                "endLine": end_line,
                "endColumn": end_column,
            },
            "source": self.source,
            "code": self.code,
        })
    }
}

/// Append-only diagnostic collection. Every pass continues past local
/// errors and keeps emitting into the same bag (spec.md §7).
#[derive(Debug, Default, Clone)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        for d in other.diagnostics {
            self.emit(d);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn to_json(&self, map: &SourceMap) -> serde_json::Value {
        serde_json::json!({
            "items": self.diagnostics.iter().map(|d| d.to_json(map)).collect::<Vec<_>>(),
        })
    }
}

/// Stable short codes, one family per `Category`.
pub mod error_codes {
    // Parse (P001-P099) — produced upstream; listed here so downstream
    // consumers can match on them without importing the parser crate.
    pub const PARSE_MALFORMED: &str = "P001";

    // Import (I001-I099)
    pub const IMPORT_ABSOLUTE_PATH: &str = "I001";
    pub const IMPORT_MISSING_EXTENSION: &str = "I002";
    pub const IMPORT_UNRESOLVED: &str = "I003";

    // Resolution (R001-R099)
    pub const RESOLUTION_UNKNOWN_NAME: &str = "R001";
    pub const RESOLUTION_AMBIGUOUS: &str = "R002";
    pub const RESOLUTION_PRIVATE: &str = "R003";
    pub const RESOLUTION_FORWARD_REF: &str = "R004";
    pub const RESOLUTION_REDEFINITION: &str = "R005";
    pub const RESOLUTION_SHADOWING: &str = "R006";

    // ConstEval (C001-C099)
    pub const CONST_DIV_BY_ZERO: &str = "C001";
    pub const CONST_OVERFLOW: &str = "C002";
    pub const CONST_CYCLE: &str = "C003";
    pub const CONST_CAST_OUT_OF_RANGE: &str = "C004";
    pub const CONST_VEC_NOT_ALLOWED: &str = "C005";
    pub const CONST_NON_FINITE: &str = "C006";
    pub const CONST_INDEX_OUT_OF_BOUNDS: &str = "C007";
    pub const CONST_NOT_CONST: &str = "C008";
    pub const CONST_UNSUPPORTED_CAST: &str = "C009";

    // Type (T001-T099)
    pub const TYPE_MISMATCH: &str = "T001";
    pub const TYPE_DIRECTION_MISMATCH: &str = "T002";
    pub const TYPE_MISSING_REQUIRED_PORT: &str = "T003";
    pub const TYPE_POSITIONAL_ARG: &str = "T004";
    pub const TYPE_UNKNOWN_PORT: &str = "T005";
    pub const TYPE_NOT_WRITABLE: &str = "T006";
    pub const TYPE_NULL_WITHOUT_CONTEXT: &str = "T007";
    pub const TYPE_ARRAY_SIZE_MISMATCH: &str = "T008";
    pub const TYPE_UNUSED_WRITABLE_PARAM: &str = "T009";

    // Safety (S001-S099)
    pub const SAFETY_UNINITIALIZED: &str = "S001";
    pub const SAFETY_NULL_WITHOUT_CHECK: &str = "S002";
    pub const SAFETY_RECURSIVE_TREE: &str = "S003";

    // Internal (X001-X099) — must never appear in a released build.
    pub const INTERNAL_INVARIANT: &str = "X001";
}

/// Fuzzy "did you mean?" suggestions, used by the resolver and by LSP
/// completion/hover.
pub mod fuzzy {
    use strsim::jaro_winkler;

    pub fn find_similar_names(target: &str, candidates: &[String], max: usize) -> Vec<String> {
        let mut scored: Vec<(&String, f64)> = candidates
            .iter()
            .map(|c| (c, jaro_winkler(target, c)))
            .filter(|(_, score)| *score > 0.7)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(max).map(|(c, _)| c.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_counts_severity() {
        let mut bag = DiagnosticBag::new();
        bag.emit(Diagnostic::error(
            Category::Type,
            error_codes::TYPE_MISMATCH,
            "mismatched types",
            ByteRange::new(0, 3),
        ));
        bag.emit(Diagnostic::warning(
            Category::Resolution,
            error_codes::RESOLUTION_SHADOWING,
            "shadowed",
            ByteRange::new(4, 5),
        ));
        assert_eq!(bag.error_count(), 1);
        assert_eq!(bag.warning_count(), 1);
        assert!(bag.has_errors());
    }

    #[test]
    fn json_shape_has_byte_and_line_columns() {
        let mut bag = DiagnosticBag::new();
        bag.emit(Diagnostic::error(
            Category::Type,
            error_codes::TYPE_MISMATCH,
            "mismatched types",
            ByteRange::new(5, 8),
        ));
        let map = SourceMap::new("tree Main() {\nfoo();\n}");
        let json = bag.to_json(&map);
        let item = &json["items"][0];
        assert_eq!(item["range"]["startByte"], 5);
        assert_eq!(item["code"], "T001");
    }

    #[test]
    fn fuzzy_suggestions_rank_closest_first() {
        let candidates = vec!["speed".to_string(), "spee".to_string(), "other".to_string()];
        let got = fuzzy::find_similar_names("spee", &candidates, 2);
        assert_eq!(got[0], "spee");
    }
}
