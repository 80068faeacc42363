//! `completion_json` (spec.md §6), context-sensitive the way the original
//! `lsp/completion_context.cpp` is (spec.md's distillation only gives the
//! method signature; SPEC_FULL.md's ambient-5 supplement pulls this
//! context sensitivity back in): port names inside a node call's argument
//! list, node/tree/type/value names everywhere else, keyed off whichever
//! scope `locate::scope_at` says the cursor sits in.

use bt_dsl_ast::{Direction, Namespace, Program, Symbol};
use bt_dsl_sema::Analysis;

use crate::json::byte_range_json;
use crate::locate::{self, Hit};

fn direction_str(d: Direction) -> &'static str {
    match d {
        Direction::In => "in",
        Direction::Ref => "ref",
        Direction::Mut => "mut",
        Direction::Out => "out",
    }
}

fn symbol_kind(sym: &Symbol<'_>) -> &'static str {
    match sym {
        Symbol::GlobalVariable(_) | Symbol::LocalVariable(_) | Symbol::BlockVariable(_) => {
            "variable"
        }
        Symbol::GlobalConst(_) | Symbol::LocalConst(_) => "const",
        Symbol::Parameter(_) => "parameter",
        Symbol::BuiltinType { .. } | Symbol::ExternType(_) | Symbol::Alias(_) => "type",
        Symbol::ExternNode(_) => "node",
        Symbol::Tree(_) => "tree",
    }
}

fn symbol_detail(sym: &Symbol<'_>) -> Option<String> {
    match sym {
        Symbol::GlobalVariable(d) => d.resolved_type.get().map(|t| t.surface_spelling()),
        Symbol::GlobalConst(d) => d.resolved_type.get().map(|t| t.surface_spelling()),
        Symbol::LocalVariable(d) => d.resolved_type.get().map(|t| t.surface_spelling()),
        Symbol::LocalConst(d) => d.resolved_type.get().map(|t| t.surface_spelling()),
        Symbol::Parameter(p) => p.resolved_type.get().map(|t| t.surface_spelling()),
        Symbol::ExternNode(d) => Some(format!("{} port(s)", d.ports.len())),
        Symbol::Tree(d) => Some(format!("{} param(s)", d.params.len())),
        _ => None,
    }
}

const PRECONDITION_KEYWORDS: &[&str] = &["guard", "success_if", "failure_if", "skip_if", "run_while"];

pub fn completion_json<'a>(
    program: &'a Program<'a>,
    analysis: &Analysis<'a>,
    offset: u32,
    trigger: Option<&str>,
) -> String {
    if trigger == Some("@") {
        let items: Vec<serde_json::Value> = PRECONDITION_KEYWORDS
            .iter()
            .map(|kw| serde_json::json!({ "label": kw, "kind": "precondition", "insertText": kw }))
            .collect();
        return serde_json::json!({ "isIncomplete": false, "items": items }).to_string();
    }

    let hit = locate::find_at(program, offset);

    if let Some(Hit::NodeCall(call)) = &hit {
        let used: std::collections::HashSet<&str> =
            call.args.iter().map(|a| a.port_name.as_str()).collect();
        let ports: Vec<(&str, Direction, Option<String>)> = match call.resolved_node.get() {
            Some(Symbol::ExternNode(n)) => n
                .ports
                .iter()
                .map(|p| {
                    (
                        p.name.as_str(),
                        p.direction,
                        p.resolved_type.get().map(|t| t.surface_spelling()),
                    )
                })
                .collect(),
            Some(Symbol::Tree(t)) => t
                .params
                .iter()
                .map(|p| {
                    (
                        p.name.as_str(),
                        p.direction,
                        p.resolved_type.get().map(|t| t.surface_spelling()),
                    )
                })
                .collect(),
            _ => Vec::new(),
        };
        let items: Vec<serde_json::Value> = ports
            .into_iter()
            .filter(|(name, ..)| !used.contains(name))
            .map(|(name, dir, ty)| {
                let detail = ty.map(|t| format!("{} {}", direction_str(dir), t));
                serde_json::json!({
                    "label": name,
                    "kind": "port",
                    "detail": detail,
                    "insertText": format!("{}: ", name),
                })
            })
            .collect();
        return serde_json::json!({ "isIncomplete": false, "items": items }).to_string();
    }

    let replace_range = match &hit {
        Some(Hit::VarRef(v)) => Some(v.range),
        Some(Hit::TypeRef(t)) => Some(t.range),
        _ => None,
    };
    let wants_types_only = matches!(hit, Some(Hit::TypeRef(_)));

    let scope = locate::scope_at(program, &analysis.scopes, &analysis.table, offset);
    let visible = locate::visible_symbols(&analysis.table, scope);

    let items: Vec<serde_json::Value> = visible
        .into_iter()
        .filter(|sym| {
            if wants_types_only {
                sym.namespace() == Namespace::Type
            } else {
                true
            }
        })
        .map(|sym| {
            let mut item = serde_json::json!({
                "label": sym.name(),
                "kind": symbol_kind(sym),
                "detail": symbol_detail(sym),
                "insertText": sym.name(),
            });
            if let Some(range) = replace_range {
                item["replaceRange"] = byte_range_json(range);
            }
            item
        })
        .collect();

    serde_json::json!({ "isIncomplete": false, "items": items }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::{AstArena, TypeContext};
    use bt_dsl_parser::parse_source;

    #[test]
    fn suggests_unused_ports_inside_node_call() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let type_ctx = TypeContext::new(&type_arena);
        let src = "extern action Log(in msg: string, in level: int32);\n\
                   tree Main() { Log(msg: \"hi\"); }\n";
        let (program, mut diags) = parse_source(src, &arena);
        let analysis = bt_dsl_sema::analyze(program, &arena, &type_ctx, &[], &mut diags);
        let offset = src.find("Log(msg").unwrap() as u32 + 1;
        let json = completion_json(program, &analysis, offset, None);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let labels: Vec<&str> = value["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels, vec!["level"]);
    }

    #[test]
    fn suggests_precondition_keywords_on_at_trigger() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let type_ctx = TypeContext::new(&type_arena);
        let src = "tree Main() {}\n";
        let (program, mut diags) = parse_source(src, &arena);
        let analysis = bt_dsl_sema::analyze(program, &arena, &type_ctx, &[], &mut diags);
        let json = completion_json(program, &analysis, 0, Some("@"));
        assert!(json.contains("guard"));
    }
}
