//! CFG builder (spec.md §4.6): one basic-block graph per tree, built once
//! and shared by the initialization-safety and null-safety checkers.
//!
//! Grounded on the worklist/arena-backed-vector shape spec.md §9's design
//! notes mandate ("do not rely on recursion over the CFG... blocks and
//! edges are identified by dense integer ids into arena-backed vectors")
//! and on the teacher's `vex-compiler/src/borrow_checker` family for the
//! overall "one dataflow pass per concern, built on a shared block graph"
//! split — the block/edge/worklist shapes themselves are new since the
//! examples pack has no generic CFG-with-policy-driven-branching builder
//! to lift from; BT-DSL's compound-node data/flow policy matrix
//! (`DataPolicy` x `FlowPolicy`, spec.md §4.6) has no teacher analogue.

use bt_dsl_ast::{
    AssignmentStmt, BehaviorAttr, BlackboardVarDeclStmt, DataPolicy, Expr, FlowPolicy,
    LocalConstDeclStmt, NodeCallStmt, NodeCategory, Precondition, PreconditionKind, Stmt, Symbol,
    TreeDecl,
};

pub type BlockId = usize;

/// A single statement-level effect recorded in a block, consumed by both
/// safety checkers (spec.md §4.6 "terminal actions").
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    Assignment(&'a AssignmentStmt<'a>),
    BlackboardDecl(&'a BlackboardVarDeclStmt<'a>),
    LocalConstDecl(&'a LocalConstDeclStmt<'a>),
    NodeCall(&'a NodeCallStmt<'a>),
    /// A precondition expression evaluated before a statement's body; not
    /// a "write", but still a read site and (for null-safety) a
    /// narrowing source via its outgoing `Branch` edge.
    Precondition(&'a Precondition<'a>),
}

#[derive(Debug, Clone, Copy)]
pub enum EdgeCond<'a> {
    Unconditional,
    WhenTrue(&'a Expr<'a>),
    WhenFalse(&'a Expr<'a>),
    /// Leaves a block via the success outcome of the `Action::NodeCall`
    /// it ends with. Distinct from `Unconditional` because init-safety's
    /// `out`-argument write only applies along this edge (spec.md §4.7:
    /// "unconditionally initializes the target if the call reaches its
    /// success exit; otherwise leaves the lattice unchanged") — both
    /// edges leaving a leaf call's fork share one source block, so the
    /// edge itself has to carry which outcome it represents.
    OnCallSuccess,
    /// The same call's failure outcome.
    OnCallFailure,
}

#[derive(Debug, Clone, Copy)]
pub struct Edge<'a> {
    pub to: BlockId,
    pub cond: EdgeCond<'a>,
}

#[derive(Debug, Default)]
pub struct BlockData<'a> {
    pub actions: Vec<Action<'a>>,
    pub succs: Vec<Edge<'a>>,
}

/// One tree's control-flow graph. `entry` is where analysis begins;
/// `success_exit`/`failure_exit` are sentinel blocks with no outgoing
/// edges (spec.md §4.6 "two sentinel blocks per tree").
pub struct Cfg<'a> {
    pub blocks: Vec<BlockData<'a>>,
    pub entry: BlockId,
    pub success_exit: BlockId,
    pub failure_exit: BlockId,
}

impl<'a> Cfg<'a> {
    /// Predecessor list for every block, computed once for worklist
    /// iteration (spec.md §9: "implement the fixed-point iteration with an
    /// explicit worklist").
    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for (from, block) in self.blocks.iter().enumerate() {
            for edge in &block.succs {
                preds[edge.to].push(from);
            }
        }
        preds
    }

    /// Reverse postorder over blocks reachable from `entry`, the standard
    /// worklist seed order for a forward analysis.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<(BlockId, usize)> = vec![(self.entry, 0)];
        visited[self.entry] = true;
        while let Some((b, ix)) = stack.pop() {
            let succs = &self.blocks[b].succs;
            if ix < succs.len() {
                let next = succs[ix].to;
                stack.push((b, ix + 1));
                if !visited[next] {
                    visited[next] = true;
                    stack.push((next, 0));
                }
            } else {
                postorder.push(b);
            }
        }
        postorder.reverse();
        postorder
    }
}

struct Builder<'a> {
    blocks: Vec<BlockData<'a>>,
}

impl<'a> Builder<'a> {
    fn new_block(&mut self) -> BlockId {
        self.blocks.push(BlockData::default());
        self.blocks.len() - 1
    }

    fn push_action(&mut self, b: BlockId, a: Action<'a>) {
        self.blocks[b].actions.push(a);
    }

    fn set_succs(&mut self, b: BlockId, edges: Vec<Edge<'a>>) {
        self.blocks[b].succs = edges;
    }

    fn wire_unconditional(&mut self, b: BlockId, to: BlockId) {
        self.set_succs(
            b,
            vec![Edge {
                to,
                cond: EdgeCond::Unconditional,
            }],
        );
    }

    /// A leaf call's outcome bifurcates into its enclosing success/failure
    /// targets; there is no boolean expression to branch on (the call's
    /// own runtime outcome decides which edge is taken), so the edges are
    /// tagged `OnCallSuccess`/`OnCallFailure` rather than `Unconditional`.
    fn wire_fork(&mut self, b: BlockId, on_success: BlockId, on_failure: BlockId) {
        self.set_succs(
            b,
            vec![
                Edge {
                    to: on_success,
                    cond: EdgeCond::OnCallSuccess,
                },
                Edge {
                    to: on_failure,
                    cond: EdgeCond::OnCallFailure,
                },
            ],
        );
    }

    fn apply_preconditions(
        &mut self,
        preconditions: &[&'a Precondition<'a>],
        entry: BlockId,
        parent_success: BlockId,
        parent_failure: BlockId,
    ) -> BlockId {
        let mut cur = entry;
        for p in preconditions {
            self.push_action(cur, Action::Precondition(p));
            let body_continue = self.new_block();
            let (when_true, when_false) = match p.kind {
                PreconditionKind::Guard => (body_continue, parent_failure),
                PreconditionKind::SuccessIf => (parent_success, body_continue),
                PreconditionKind::FailureIf => (parent_failure, body_continue),
                PreconditionKind::SkipIf => (parent_success, body_continue),
                PreconditionKind::RunWhile => (body_continue, parent_success),
            };
            self.set_succs(
                cur,
                vec![
                    Edge {
                        to: when_true,
                        cond: EdgeCond::WhenTrue(p.expr),
                    },
                    Edge {
                        to: when_false,
                        cond: EdgeCond::WhenFalse(p.expr),
                    },
                ],
            );
            cur = body_continue;
        }
        cur
    }

    fn build_stmts(
        &mut self,
        stmts: &[&'a Stmt<'a>],
        data_policy: DataPolicy,
        flow_policy: FlowPolicy,
        entry: BlockId,
        on_success: BlockId,
        on_failure: BlockId,
    ) {
        if stmts.is_empty() {
            self.wire_unconditional(entry, on_success);
            return;
        }
        match flow_policy {
            FlowPolicy::Chained => {
                self.build_chained(stmts, data_policy, entry, on_success, on_failure)
            }
            FlowPolicy::Isolated => {
                self.build_isolated(stmts, entry, on_success, on_failure)
            }
        }
    }

    fn build_chained(
        &mut self,
        stmts: &[&'a Stmt<'a>],
        data_policy: DataPolicy,
        entry: BlockId,
        on_success: BlockId,
        on_failure: BlockId,
    ) {
        let n = stmts.len();
        let mut cur_entry = entry;
        for (i, stmt) in stmts.iter().enumerate() {
            let is_last = i + 1 == n;
            let (child_succ, child_fail) = match data_policy {
                DataPolicy::All => (
                    if is_last { on_success } else { self.new_block() },
                    on_failure,
                ),
                DataPolicy::Any => (
                    on_success,
                    if is_last { on_failure } else { self.new_block() },
                ),
                DataPolicy::None => {
                    let next = if is_last {
                        let j = self.new_block();
                        self.set_succs(
                            j,
                            vec![
                                Edge {
                                    to: on_success,
                                    cond: EdgeCond::Unconditional,
                                },
                                Edge {
                                    to: on_failure,
                                    cond: EdgeCond::Unconditional,
                                },
                            ],
                        );
                        j
                    } else {
                        self.new_block()
                    };
                    (next, next)
                }
            };
            self.build_stmt(stmt, cur_entry, child_succ, child_fail);
            cur_entry = match data_policy {
                DataPolicy::All => child_succ,
                DataPolicy::Any => child_fail,
                DataPolicy::None => child_succ,
            };
        }
    }

    /// Isolated flow: every statement starts from the shared pre-state
    /// (`entry`) rather than from a sibling's post-state, and all outcomes
    /// join before reaching the parent's exits (spec.md §4.6 "Isolated").
    fn build_isolated(
        &mut self,
        stmts: &[&'a Stmt<'a>],
        entry: BlockId,
        on_success: BlockId,
        on_failure: BlockId,
    ) {
        let join = self.new_block();
        for stmt in stmts {
            self.build_stmt(stmt, entry, join, join);
        }
        self.set_succs(
            join,
            vec![
                Edge {
                    to: on_success,
                    cond: EdgeCond::Unconditional,
                },
                Edge {
                    to: on_failure,
                    cond: EdgeCond::Unconditional,
                },
            ],
        );
    }

    fn build_stmt(
        &mut self,
        stmt: &'a Stmt<'a>,
        entry: BlockId,
        on_success: BlockId,
        on_failure: BlockId,
    ) {
        match stmt {
            Stmt::Assignment(a) => {
                self.push_action(entry, Action::Assignment(a));
                self.wire_unconditional(entry, on_success);
            }
            Stmt::BlackboardVarDecl(d) => {
                self.push_action(entry, Action::BlackboardDecl(d));
                self.wire_unconditional(entry, on_success);
            }
            Stmt::LocalConstDecl(d) => {
                self.push_action(entry, Action::LocalConstDecl(d));
                self.wire_unconditional(entry, on_success);
            }
            Stmt::NodeCall(call) => self.build_node_call(call, entry, on_success, on_failure),
        }
    }

    fn build_node_call(
        &mut self,
        call: &'a NodeCallStmt<'a>,
        entry: BlockId,
        on_success: BlockId,
        on_failure: BlockId,
    ) {
        let body_entry = self.apply_preconditions(&call.preconditions, entry, on_success, on_failure);
        self.push_action(body_entry, Action::NodeCall(call));
        match &call.children {
            None => self.wire_fork(body_entry, on_success, on_failure),
            Some(children) => {
                let behavior = effective_behavior(call);
                let next = self.new_block();
                self.wire_unconditional(body_entry, next);
                self.build_stmts(
                    children,
                    behavior.data_policy,
                    behavior.flow_policy,
                    next,
                    on_success,
                    on_failure,
                );
            }
        }
    }
}

/// The `BehaviorAttr` governing a compound node call's children, resolved
/// from its callee's declared attribute or the category default (spec.md
/// §4.6; `#[behavior(...)]` is legal only on `extern control` per the
/// parser, so anything else falls back to a Sequence-like default).
fn effective_behavior(call: &NodeCallStmt<'_>) -> BehaviorAttr {
    match call.resolved_node.get() {
        Some(Symbol::ExternNode(n)) => match n.behavior {
            Some(b) => b,
            None => match n.category {
                NodeCategory::Decorator => BehaviorAttr::decorator(),
                _ => BehaviorAttr::sequence(),
            },
        },
        _ => BehaviorAttr::sequence(),
    }
}

/// Builds the CFG for one tree body (spec.md §4.6). The tree's top-level
/// statement list has no enclosing compound node to inherit a policy
/// from; it is treated as an implicit Sequence (`All`/`Chained`), the
/// same default an un-annotated `extern control` gets — this is the
/// natural reading of "a tree body executes its statements in order,
/// stopping at the first failure" and is documented as a grounded design
/// decision in DESIGN.md.
pub fn build_tree_cfg<'a>(tree: &'a TreeDecl<'a>) -> Cfg<'a> {
    let mut b = Builder { blocks: Vec::new() };
    let entry = b.new_block();
    let success_exit = b.new_block();
    let failure_exit = b.new_block();
    b.build_stmts(
        &tree.body,
        DataPolicy::All,
        FlowPolicy::Chained,
        entry,
        success_exit,
        failure_exit,
    );
    Cfg {
        blocks: b.blocks,
        entry,
        success_exit,
        failure_exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::{AstArena, Decl};
    use bt_dsl_parser::parse_source;

    fn tree_cfg<'a>(source: &str, arena: &'a AstArena<'a>) -> Cfg<'a> {
        let (program, _diags) = parse_source(source, arena);
        let tree = program
            .items
            .iter()
            .find_map(|d| match d {
                Decl::Tree(t) => Some(*t),
                _ => None,
            })
            .unwrap();
        build_tree_cfg(tree)
    }

    #[test]
    fn every_block_reachable_from_entry() {
        let arena = AstArena::new();
        let cfg = tree_cfg(
            "extern action A(); extern action B(); tree Main() { A(); B(); }",
            &arena,
        );
        let rpo = cfg.reverse_postorder();
        assert_eq!(rpo.len(), cfg.blocks.len());
    }

    #[test]
    fn leaf_call_forks_to_both_exits() {
        let arena = AstArena::new();
        let cfg = tree_cfg("extern action A(); tree Main() { A(); }", &arena);
        let preds = cfg.predecessors();
        assert!(preds[cfg.success_exit].iter().any(|_| true));
        assert!(preds[cfg.failure_exit].iter().any(|_| true));
    }

    #[test]
    fn guard_precondition_forks_on_condition() {
        let arena = AstArena::new();
        let cfg = tree_cfg(
            "extern action A(); tree Main(in ok: bool) { @guard(ok) A(); }",
            &arena,
        );
        let has_branch = cfg.blocks.iter().any(|b| {
            b.succs
                .iter()
                .any(|e| matches!(e.cond, EdgeCond::WhenTrue(_) | EdgeCond::WhenFalse(_)))
        });
        assert!(has_branch);
    }
}
