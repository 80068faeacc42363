//! `hover_json` (spec.md §6): markdown hover text for whatever
//! `locate::find_at` lands on. Grounded on `vex-lsp/src/backend/
//! language_features/hover.rs`'s "render a fenced code block with the
//! declaration's signature, then its doc comment" shape.

use bt_dsl_ast::{Decl, NodeCategory, Program, Symbol};
use bt_dsl_diagnostics::SourceMap;

use crate::json::range_json;
use crate::locate::{self, Hit};

fn direction_str(d: bt_dsl_ast::Direction) -> &'static str {
    match d {
        bt_dsl_ast::Direction::In => "in",
        bt_dsl_ast::Direction::Ref => "ref",
        bt_dsl_ast::Direction::Mut => "mut",
        bt_dsl_ast::Direction::Out => "out",
    }
}

fn category_str(c: NodeCategory) -> &'static str {
    match c {
        NodeCategory::Action => "action",
        NodeCategory::Condition => "condition",
        NodeCategory::Control => "control",
        NodeCategory::Decorator => "decorator",
        NodeCategory::Subtree => "subtree",
    }
}

fn docs_block(docs: &[String]) -> String {
    if docs.is_empty() {
        String::new()
    } else {
        format!("\n\n{}", docs.join("\n"))
    }
}

fn hover_for_symbol(sym: &Symbol<'_>) -> String {
    match sym {
        Symbol::GlobalVariable(d) => {
            let ty = d
                .resolved_type
                .get()
                .map(|t| t.surface_spelling())
                .unwrap_or_else(|| "?".to_string());
            format!("```bt-dsl\nvar {}: {}\n```{}", d.name, ty, docs_block(&d.docs))
        }
        Symbol::GlobalConst(d) => {
            let ty = d
                .resolved_type
                .get()
                .map(|t| t.surface_spelling())
                .unwrap_or_else(|| "?".to_string());
            format!(
                "```bt-dsl\nconst {}: {}\n```{}",
                d.name,
                ty,
                docs_block(&d.docs)
            )
        }
        Symbol::Parameter(p) => {
            let ty = p
                .resolved_type
                .get()
                .map(|t| t.surface_spelling())
                .unwrap_or_else(|| "?".to_string());
            format!(
                "```bt-dsl\n{} {}: {}\n```",
                direction_str(p.direction),
                p.name,
                ty
            )
        }
        Symbol::LocalVariable(d) => {
            let ty = d
                .resolved_type
                .get()
                .map(|t| t.surface_spelling())
                .unwrap_or_else(|| "?".to_string());
            format!("```bt-dsl\nvar {}: {}\n```", d.name, ty)
        }
        Symbol::BlockVariable(d) => {
            format!("```bt-dsl\nout var {}\n```", d.name)
        }
        Symbol::LocalConst(d) => {
            let ty = d
                .resolved_type
                .get()
                .map(|t| t.surface_spelling())
                .unwrap_or_else(|| "?".to_string());
            format!("```bt-dsl\nconst {}: {}\n```", d.name, ty)
        }
        Symbol::BuiltinType { name, .. } => format!("```bt-dsl\n{}\n```\n\nbuiltin type", name),
        Symbol::ExternType(d) => format!(
            "```bt-dsl\nextern type {}\n```{}",
            d.name,
            docs_block(&d.docs)
        ),
        Symbol::Alias(d) => format!("```bt-dsl\ntype {} = ...\n```{}", d.name, docs_block(&d.docs)),
        Symbol::ExternNode(d) => {
            let ports: Vec<String> = d
                .ports
                .iter()
                .map(|p| {
                    let ty = p
                        .resolved_type
                        .get()
                        .map(|t| t.surface_spelling())
                        .unwrap_or_else(|| "?".to_string());
                    format!("{} {}: {}", direction_str(p.direction), p.name, ty)
                })
                .collect();
            format!(
                "```bt-dsl\nextern {} {}({})\n```{}",
                category_str(d.category),
                d.name,
                ports.join(", "),
                docs_block(&d.docs)
            )
        }
        Symbol::Tree(d) => {
            let params: Vec<String> = d
                .params
                .iter()
                .map(|p| {
                    let ty = p
                        .resolved_type
                        .get()
                        .map(|t| t.surface_spelling())
                        .unwrap_or_else(|| "?".to_string());
                    format!("{} {}: {}", direction_str(p.direction), p.name, ty)
                })
                .collect();
            format!(
                "```bt-dsl\ntree {}({})\n```{}",
                d.name,
                params.join(", "),
                docs_block(&d.docs)
            )
        }
    }
}

pub fn hover_json<'a>(program: &'a Program<'a>, map: &SourceMap, offset: u32) -> Option<String> {
    let hit = locate::find_at(program, offset)?;
    let (contents, range) = match &hit {
        Hit::VarRef(v) => {
            let text = match v.resolved_symbol.get() {
                Some(sym) => hover_for_symbol(sym),
                None => format!("```bt-dsl\n{}\n```\n\nunresolved", v.name),
            };
            (text, v.range)
        }
        Hit::NodeCall(c) => {
            let text = match c.resolved_node.get() {
                Some(sym) => hover_for_symbol(sym),
                None => format!("```bt-dsl\n{}\n```\n\nunresolved", c.name),
            };
            (text, c.range)
        }
        Hit::TypeRef(t) => {
            let text = match t.resolved_symbol.get() {
                Some(sym) => hover_for_symbol(sym),
                None => t
                    .resolved_type
                    .get()
                    .map(|ty| format!("```bt-dsl\n{}\n```", ty.surface_spelling()))
                    .unwrap_or_else(|| format!("```bt-dsl\n{}\n```", t.name)),
            };
            (text, t.range)
        }
        Hit::Param(p) => (hover_for_symbol(&Symbol::Parameter(p)), p.range),
        Hit::Decl(d) => {
            let text = match d {
                Decl::Tree(t) => hover_for_symbol(&Symbol::Tree(t)),
                Decl::ExternNode(n) => hover_for_symbol(&Symbol::ExternNode(n)),
                Decl::ExternType(t) => hover_for_symbol(&Symbol::ExternType(t)),
                Decl::GlobalVar(v) => hover_for_symbol(&Symbol::GlobalVariable(v)),
                Decl::GlobalConst(c) => hover_for_symbol(&Symbol::GlobalConst(c)),
                Decl::TypeAlias(a) => hover_for_symbol(&Symbol::Alias(a)),
                Decl::Import(_) => return None,
            };
            (text, d.range())
        }
    };
    Some(
        serde_json::json!({
            "contents": contents,
            "range": range_json(range, map),
        })
        .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::{AstArena, TypeContext};
    use bt_dsl_parser::parse_source;

    #[test]
    fn hover_on_tree_call_shows_port_signature() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let type_ctx = TypeContext::new(&type_arena);
        let src = "extern action Log(in msg: string);\ntree Main() { Log(msg: \"hi\"); }\n";
        let (program, mut diags) = parse_source(src, &arena);
        bt_dsl_sema::analyze(program, &arena, &type_ctx, &[], &mut diags);
        let map = SourceMap::new(src);
        let offset = src.find("Log(msg").unwrap() as u32 + 1;
        let json = hover_json(program, &map, offset).unwrap();
        assert!(json.contains("extern action Log"));
    }
}
