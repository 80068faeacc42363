//! `document_symbols_json` (spec.md §6): a flat outline of every named
//! top-level declaration. Grounded on `vex-lsp/src/backend/language_features/
//! document_symbols.rs`'s "one entry per top-level item, selectionRange ==
//! range" shape — BT-DSL's AST has no separate name-only span (locate.rs's
//! module doc notes the same thing), so `selectionRange` reuses the whole
//! declaration's range rather than a narrower one.

use bt_dsl_ast::{Decl, Program};
use bt_dsl_diagnostics::SourceMap;

use crate::json::range_json;

fn kind_of(decl: &Decl<'_>) -> &'static str {
    match decl {
        Decl::Import(_) => "import",
        Decl::ExternType(_) => "externType",
        Decl::TypeAlias(_) => "alias",
        Decl::ExternNode(_) => "externNode",
        Decl::GlobalVar(_) => "variable",
        Decl::GlobalConst(_) => "const",
        Decl::Tree(_) => "tree",
    }
}

pub fn document_symbols_json(program: &Program<'_>, map: &SourceMap) -> String {
    let symbols: Vec<serde_json::Value> = program
        .items
        .iter()
        .filter_map(|decl| {
            let name = decl.name()?;
            Some(serde_json::json!({
                "name": name,
                "kind": kind_of(decl),
                "range": range_json(decl.range(), map),
                "selectionRange": range_json(decl.range(), map),
            }))
        })
        .collect();
    serde_json::json!({ "symbols": symbols }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_parser::parse_source;

    #[test]
    fn lists_tree_and_extern_node() {
        let arena = AstArena::new();
        let (program, _diags) = parse_source(
            "extern action Log(in msg: string);\ntree Main() { Log(msg: \"hi\"); }\n",
            &arena,
        );
        let map = SourceMap::new("");
        let json = document_symbols_json(program, &map);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let names: Vec<&str> = value["symbols"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Log", "Main"]);
    }
}
