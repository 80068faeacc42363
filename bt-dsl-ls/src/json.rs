//! Small JSON-shape helpers shared by every `*_json` method in this crate
//! so that a byte range always serializes the same way spec.md §6
//! documents for `diagnostics_json` (`startByte`/`endByte` plus derived
//! line/column) — every other method's `range` field reuses the same
//! shape rather than inventing its own.

use bt_dsl_diagnostics::{ByteRange, SourceMap};

pub fn range_json(range: ByteRange, map: &SourceMap) -> serde_json::Value {
    let (start_line, start_column) = map.line_col(range.start);
    let (end_line, end_column) = map.line_col(range.end);
    serde_json::json!({
        "startByte": range.start,
        "endByte": range.end,
        "startLine": start_line,
        "startColumn": start_column,
        "endLine": end_line,
        "endColumn": end_column,
    })
}

pub fn location_json(uri: &str, range: ByteRange, map: &SourceMap) -> serde_json::Value {
    serde_json::json!({
        "uri": uri,
        "range": range_json(range, map),
    })
}

/// Byte-offsets-only range, for call sites (completion's `replaceRange`)
/// that have no `SourceMap` in scope to derive line/column from.
pub fn byte_range_json(range: ByteRange) -> serde_json::Value {
    serde_json::json!({
        "startByte": range.start,
        "endByte": range.end,
    })
}
