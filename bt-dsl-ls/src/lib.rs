//! Language-service workspace (spec.md §6): a handle-based API consumed by
//! an editor host, native or WASM. Every method takes a document URI
//! (plus, where relevant, a byte offset and a list of imported URIs) and
//! returns a JSON string — no LSP protocol framing lives in this crate,
//! that belongs to whatever tower-lsp/JSON-RPC shim the host wires up
//! around it.
//!
//! Grounded on `vex-lsp`'s per-feature-module layout (`backend/language_features/*.rs`,
//! one file per request kind backed by a shared document cache) — the
//! document cache here drops `dashmap`/`tower_lsp::Url` for a plain
//! `HashMap<String, Document>` since the workspace is explicitly
//! single-threaded and cooperative (spec.md §5), and positions are raw
//! byte offsets rather than LSP `Position`s, so there is no line/column
//! bookkeeping on the hot path.

mod completion;
mod document_symbols;
mod highlights;
mod hover;
mod imports;
mod json;
mod locate;
mod semantic_tokens;

use std::collections::HashMap;

use log::trace;

use bt_dsl_ast::{AstArena, Program, TypeContext};
use bt_dsl_diagnostics::{DiagnosticBag, SourceMap};
use bt_dsl_parser::parse_source;
use bt_dsl_sema::{Analysis, ImportedModule, ScopeMap};

/// One open document: its text, its parse result, and the source map used
/// to translate byte offsets into the line/column pairs spec.md §6's JSON
/// shapes carry alongside every byte range.
struct Document {
    text: String,
    source_map: SourceMap,
    program: &'static Program<'static>,
    parse_diagnostics: DiagnosticBag,
}

/// The result of running semantic analysis over one document for a single
/// request. Never cached across requests (spec.md §5: each request "runs
/// to completion" independently); re-run on every `*_json` call that needs
/// more than parse diagnostics.
struct RequestAnalysis {
    analysis: Analysis<'static>,
    diagnostics: DiagnosticBag,
}

/// Owned, process-wide state: the document table plus the one arena and
/// type context every document's AST and analysis allocate into.
///
/// The arena and type context are leaked for the process's lifetime
/// (`Box::leak`, the same pattern `bt-dsl-driver` uses for per-module
/// analyses) rather than freed on `remove_document` — freeing them safely
/// would require unwinding every `&'static` reference a still-open
/// document might hold into it, which the handle-based API gives hosts no
/// way to signal. `remove_document` still drops the document from the
/// lookup table, so a removed handle answers every query as "unknown
/// document"; only the backing allocation outlives it.
pub struct Workspace {
    arena: &'static AstArena<'static>,
    type_ctx: &'static TypeContext<'static>,
    documents: HashMap<String, Document>,
}

impl Workspace {
    pub fn new() -> Self {
        let arena: &'static AstArena<'static> = &*Box::leak(Box::new(AstArena::new()));
        let type_arena: &'static typed_arena::Arena<bt_dsl_ast::SemanticType<'static>> =
            &*Box::leak(Box::new(typed_arena::Arena::new()));
        let type_ctx: &'static TypeContext<'static> =
            &*Box::leak(Box::new(TypeContext::new(type_arena)));
        Self {
            arena,
            type_ctx,
            documents: HashMap::new(),
        }
    }

    pub fn set_document(&mut self, uri: &str, text: String) {
        trace!("set_document: enter uri={uri}");
        let (program, parse_diagnostics) = parse_source(&text, self.arena);
        let source_map = SourceMap::new(&text);
        self.documents.insert(
            uri.to_string(),
            Document {
                text,
                source_map,
                program,
                parse_diagnostics,
            },
        );
        trace!("set_document: exit uri={uri}");
    }

    pub fn remove_document(&mut self, uri: &str) {
        trace!("remove_document: enter uri={uri}");
        self.documents.remove(uri);
        trace!("remove_document: exit uri={uri}");
    }

    pub fn has_document(&self, uri: &str) -> bool {
        trace!("has_document: enter uri={uri}");
        let present = self.documents.contains_key(uri);
        trace!("has_document: exit uri={uri} present={present}");
        present
    }

    /// Analyzes `uri` fresh, threading in the public root-scope symbols of
    /// each URI in `imports` that is itself a known document (looked up
    /// one level deep, with no imports of its own — spec.md §4.3 only
    /// needs a direct import's *public* declarations, and a host request
    /// supplies the transitive closure itself via `resolve_imports_json`
    /// when it wants one).
    fn analyze(&self, uri: &str, imports: &[String]) -> Option<RequestAnalysis> {
        let doc = self.documents.get(uri)?;
        let mut diags = doc.parse_diagnostics.clone();
        if doc.parse_diagnostics.has_errors() {
            return Some(RequestAnalysis {
                analysis: Analysis {
                    table: bt_dsl_ast::SymbolTable::new(),
                    scopes: ScopeMap::default(),
                    block_var_types: HashMap::new(),
                },
                diagnostics: diags,
            });
        }

        let mut imported = Vec::new();
        for import_uri in imports {
            let Some(import_doc) = self.documents.get(import_uri.as_str()) else {
                continue;
            };
            if import_doc.parse_diagnostics.has_errors() {
                continue;
            }
            let mut throwaway = DiagnosticBag::new();
            let a = bt_dsl_sema::analyze(import_doc.program, self.arena, self.type_ctx, &[], &mut throwaway);
            imported.push(ImportedModule {
                file_id: import_uri.clone(),
                table: Box::leak(Box::new(a.table)),
            });
        }

        let analysis = bt_dsl_sema::analyze(doc.program, self.arena, self.type_ctx, &imported, &mut diags);
        bt_dsl_sema::check_safety(
            doc.program,
            uri,
            None,
            &[],
            &HashMap::new(),
            &analysis.block_var_types,
            &mut diags,
        );
        Some(RequestAnalysis { analysis, diagnostics: diags })
    }

    pub fn diagnostics_json(&self, uri: &str, imports: &[String]) -> String {
        trace!("diagnostics_json: enter uri={uri}");
        let Some(doc) = self.documents.get(uri) else {
            trace!("diagnostics_json: exit uri={uri} (no document)");
            return serde_json::json!({ "items": [] }).to_string();
        };
        if doc.parse_diagnostics.has_errors() {
            trace!("diagnostics_json: exit uri={uri} (parse errors only)");
            return doc.parse_diagnostics.to_json(&doc.source_map).to_string();
        }
        let Some(result) = self.analyze(uri, imports) else {
            trace!("diagnostics_json: exit uri={uri} (no document)");
            return serde_json::json!({ "items": [] }).to_string();
        };
        trace!("diagnostics_json: exit uri={uri}");
        result.diagnostics.to_json(&doc.source_map).to_string()
    }

    pub fn completion_json(
        &self,
        uri: &str,
        byte_offset: u32,
        imports: &[String],
        trigger: Option<&str>,
    ) -> String {
        trace!("completion_json: enter uri={uri} byte_offset={byte_offset}");
        let Some(doc) = self.documents.get(uri) else {
            trace!("completion_json: exit uri={uri} (no document)");
            return serde_json::json!({ "isIncomplete": false, "items": [] }).to_string();
        };
        let Some(result) = self.analyze(uri, imports) else {
            trace!("completion_json: exit uri={uri} (no document)");
            return serde_json::json!({ "isIncomplete": false, "items": [] }).to_string();
        };
        trace!("completion_json: exit uri={uri}");
        completion::completion_json(doc.program, &result.analysis, byte_offset, trigger)
    }

    pub fn hover_json(&self, uri: &str, byte_offset: u32, imports: &[String]) -> String {
        trace!("hover_json: enter uri={uri} byte_offset={byte_offset}");
        let Some(doc) = self.documents.get(uri) else {
            trace!("hover_json: exit uri={uri} (no document)");
            return serde_json::json!({ "contents": "" }).to_string();
        };
        if self.analyze(uri, imports).is_none() {
            trace!("hover_json: exit uri={uri} (no document)");
            return serde_json::json!({ "contents": "" }).to_string();
        }
        trace!("hover_json: exit uri={uri}");
        hover::hover_json(doc.program, &doc.source_map, byte_offset)
            .unwrap_or_else(|| serde_json::json!({ "contents": "" }).to_string())
    }

    pub fn definition_json(&self, uri: &str, byte_offset: u32, imports: &[String]) -> String {
        trace!("definition_json: enter uri={uri} byte_offset={byte_offset}");
        let Some(doc) = self.documents.get(uri) else {
            trace!("definition_json: exit uri={uri} (no document)");
            return serde_json::json!({ "locations": [] }).to_string();
        };
        if self.analyze(uri, imports).is_none() {
            trace!("definition_json: exit uri={uri} (no document)");
            return serde_json::json!({ "locations": [] }).to_string();
        }
        trace!("definition_json: exit uri={uri}");
        imports::definition_json(uri, doc.program, &doc.source_map, byte_offset)
    }

    pub fn document_symbols_json(&self, uri: &str) -> String {
        trace!("document_symbols_json: enter uri={uri}");
        let Some(doc) = self.documents.get(uri) else {
            trace!("document_symbols_json: exit uri={uri} (no document)");
            return serde_json::json!({ "symbols": [] }).to_string();
        };
        trace!("document_symbols_json: exit uri={uri}");
        document_symbols::document_symbols_json(doc.program, &doc.source_map)
    }

    pub fn document_highlights_json(&self, uri: &str, byte_offset: u32, imports: &[String]) -> String {
        trace!("document_highlights_json: enter uri={uri} byte_offset={byte_offset}");
        let Some(doc) = self.documents.get(uri) else {
            trace!("document_highlights_json: exit uri={uri} (no document)");
            return serde_json::json!({ "items": [] }).to_string();
        };
        if self.analyze(uri, imports).is_none() {
            trace!("document_highlights_json: exit uri={uri} (no document)");
            return serde_json::json!({ "items": [] }).to_string();
        }
        trace!("document_highlights_json: exit uri={uri}");
        highlights::document_highlights_json(doc.program, &doc.source_map, byte_offset)
    }

    pub fn semantic_tokens_json(&self, uri: &str, imports: &[String]) -> String {
        trace!("semantic_tokens_json: enter uri={uri}");
        let Some(doc) = self.documents.get(uri) else {
            trace!("semantic_tokens_json: exit uri={uri} (no document)");
            return serde_json::json!({ "tokens": [] }).to_string();
        };
        if self.analyze(uri, imports).is_none() {
            trace!("semantic_tokens_json: exit uri={uri} (no document)");
            return serde_json::json!({ "tokens": [] }).to_string();
        }
        trace!("semantic_tokens_json: exit uri={uri}");
        semantic_tokens::semantic_tokens_json(doc.program, &doc.source_map)
    }

    pub fn resolve_imports_json(&self, uri: &str, stdlib_uri: Option<&str>) -> String {
        trace!("resolve_imports_json: enter uri={uri}");
        let Some(doc) = self.documents.get(uri) else {
            trace!("resolve_imports_json: exit uri={uri} (no document)");
            return serde_json::json!({ "uris": [] }).to_string();
        };
        trace!("resolve_imports_json: exit uri={uri}");
        imports::resolve_imports_json(uri, doc.program, stdlib_uri)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_document_then_diagnostics_json_round_trips() {
        let mut ws = Workspace::new();
        ws.set_document("file:///a.bt", "extern control Sequence();\ntree Main() { Sequence {} }\n".to_string());
        let json = ws.diagnostics_json("file:///a.bt", &[]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["items"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn repeated_set_document_is_idempotent() {
        let mut ws = Workspace::new();
        let src = "var x: int32?;\ntree Main() { var y: int32 = x; }\n".to_string();
        ws.set_document("file:///a.bt", src.clone());
        let first = ws.diagnostics_json("file:///a.bt", &[]);
        ws.set_document("file:///a.bt", src);
        let second = ws.diagnostics_json("file:///a.bt", &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn remove_document_clears_has_document() {
        let mut ws = Workspace::new();
        ws.set_document("file:///a.bt", "tree Main() {}\n".to_string());
        assert!(ws.has_document("file:///a.bt"));
        ws.remove_document("file:///a.bt");
        assert!(!ws.has_document("file:///a.bt"));
    }

    #[test]
    fn document_symbols_lists_declared_tree() {
        let mut ws = Workspace::new();
        ws.set_document("file:///a.bt", "tree Main() {}\n".to_string());
        let json = ws.document_symbols_json("file:///a.bt");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["symbols"][0]["name"], "Main");
    }
}
