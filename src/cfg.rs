use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::{
    bound::{BoundBlock, BoundStmt, BoundStmtKind, Label},
    diagnostics::Location,
    types::Value,
};

/// Node index of the virtual *Start* node.
const START: usize = 0;
/// Node index of the virtual *End* node.
const END: usize = 1;

/// A control-flow graph over a lowered body. Basic blocks are runs of
/// statements split at labels and after (conditional) gotos and returns;
/// two virtual nodes bracket the graph.
pub struct ControlFlowGraph<'a> {
    statements: &'a [BoundStmt],
    /// Statement ranges of the basic blocks, in statement order. Block `i`
    /// is graph node `i + 2`.
    blocks: Vec<Range<usize>>,
    successors: Vec<Vec<usize>>,
}

impl<'a> ControlFlowGraph<'a> {
    /// Builds the graph. With `prune_constant_branches`, a conditional goto
    /// whose condition folded to a constant contributes only the taken
    /// edge, which is what exposes statically dead branches.
    pub fn build(body: &'a BoundBlock, prune_constant_branches: bool) -> ControlFlowGraph<'a> {
        let statements = body.statements.as_slice();
        let blocks = split_blocks(statements);

        let mut labels: HashMap<Label, usize> = HashMap::new();
        for (index, range) in blocks.iter().enumerate() {
            if let BoundStmtKind::Label(label) = &statements[range.start].kind {
                labels.insert(label.clone(), index + 2);
            }
        }

        let mut successors = vec![Vec::new(); blocks.len() + 2];
        successors[START] = vec![if blocks.is_empty() { END } else { 2 }];
        for (index, range) in blocks.iter().enumerate() {
            let node = index + 2;
            let next = if index + 1 < blocks.len() {
                node + 1
            } else {
                END
            };
            let target = |label: &Label| {
                *labels
                    .get(label)
                    .expect("gotos target labels within the same body")
            };
            successors[node] = match &statements[range.end - 1].kind {
                BoundStmtKind::Goto(label) => vec![target(label)],
                BoundStmtKind::ConditionalGoto {
                    label,
                    condition,
                    jump_if,
                } => match &condition.constant {
                    Some(Value::Bool(value)) if prune_constant_branches => {
                        if value == jump_if {
                            vec![target(label)]
                        } else {
                            vec![next]
                        }
                    }
                    _ => vec![target(label), next],
                },
                BoundStmtKind::Return(_) => vec![END],
                _ => vec![next],
            };
        }

        ControlFlowGraph {
            statements,
            blocks,
            successors,
        }
    }

    /// Nodes reachable from *Start*.
    fn reachable(&self) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut stack = vec![START];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            for &succ in &self.successors[node] {
                stack.push(succ);
            }
        }
        seen
    }
}

/// Whether every path from *Start* to *End* passes through a `return`.
/// Constant branches are not pruned here: a branch the analysis cannot
/// prove away still counts as a path.
pub fn all_paths_return(body: &BoundBlock) -> bool {
    let graph = ControlFlowGraph::build(body, false);
    let reachable = graph.reachable();
    for (node, successors) in graph.successors.iter().enumerate() {
        if node == START || !reachable.contains(&node) {
            continue;
        }
        if successors.contains(&END) {
            let range = &graph.blocks[node - 2];
            let last = &graph.statements[range.end - 1];
            if !matches!(last.kind, BoundStmtKind::Return(_)) {
                return false;
            }
        }
    }
    // An empty body flows straight from start to end.
    !graph.blocks.is_empty()
}

/// Locations of unreachable code: one per run of consecutive unreachable
/// basic blocks, anchored at the first statement that is not a label or a
/// nop.
pub fn unreachable_statements(body: &BoundBlock) -> Vec<Location> {
    let graph = ControlFlowGraph::build(body, true);
    let reachable = graph.reachable();

    let mut locations = Vec::new();
    let mut in_dead_run = false;
    for (index, range) in graph.blocks.iter().enumerate() {
        if reachable.contains(&(index + 2)) {
            in_dead_run = false;
            continue;
        }
        if in_dead_run {
            continue;
        }
        let first_real = graph.statements[range.clone()]
            .iter()
            .find(|stmt| !matches!(stmt.kind, BoundStmtKind::Label(_) | BoundStmtKind::Nop));
        if let Some(stmt) = first_real {
            locations.push(stmt.loc.clone());
            in_dead_run = true;
        }
    }
    locations
}

/// Splits a flat statement list into basic-block ranges: labels start a new
/// block, jumps and returns end one.
fn split_blocks(statements: &[BoundStmt]) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut start = 0;
    for (index, stmt) in statements.iter().enumerate() {
        match stmt.kind {
            BoundStmtKind::Label(_) => {
                if index > start {
                    blocks.push(start..index);
                }
                start = index;
            }
            BoundStmtKind::Goto(_)
            | BoundStmtKind::ConditionalGoto { .. }
            | BoundStmtKind::Return(_) => {
                blocks.push(start..index + 1);
                start = index + 1;
            }
            _ => {}
        }
    }
    if start < statements.len() {
        blocks.push(start..statements.len());
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound::BoundExpr;
    use crate::text::SourceText;
    use crate::token::Span;
    use crate::types::Value;
    use std::rc::Rc;

    fn loc() -> Location {
        Location::new(Rc::new(SourceText::new("")), Span::empty(0))
    }

    fn ret(value: Option<Value>) -> BoundStmt {
        BoundStmt {
            kind: BoundStmtKind::Return(value.map(|v| BoundExpr::literal(v, loc()))),
            loc: loc(),
        }
    }

    fn expr_stmt(value: Value) -> BoundStmt {
        BoundStmt {
            kind: BoundStmtKind::Expression(BoundExpr::literal(value, loc())),
            loc: loc(),
        }
    }

    fn goto_if(label: &Label, condition: Value, jump_if: bool) -> BoundStmt {
        BoundStmt {
            kind: BoundStmtKind::ConditionalGoto {
                label: label.clone(),
                condition: BoundExpr::literal(condition, loc()),
                jump_if,
            },
            loc: loc(),
        }
    }

    fn label_stmt(label: &Label) -> BoundStmt {
        BoundStmt {
            kind: BoundStmtKind::Label(label.clone()),
            loc: loc(),
        }
    }

    fn block(statements: Vec<BoundStmt>) -> BoundBlock {
        BoundBlock { statements }
    }

    #[test]
    fn straight_line_return() {
        let body = block(vec![expr_stmt(Value::I32(1)), ret(Some(Value::I32(1)))]);
        assert!(all_paths_return(&body));
        assert!(unreachable_statements(&body).is_empty());
    }

    #[test]
    fn fallthrough_does_not_return() {
        let body = block(vec![expr_stmt(Value::I32(1))]);
        assert!(!all_paths_return(&body));

        let empty = block(vec![]);
        assert!(!all_paths_return(&empty));
    }

    #[test]
    fn both_branches_must_return() {
        // gotoFalse else c; return 1; else:; return 2
        let else_label = Label::new("Label1");
        let returning = block(vec![
            goto_if(&else_label, Value::Bool(true), false),
            ret(Some(Value::I32(1))),
            label_stmt(&else_label),
            ret(Some(Value::I32(2))),
        ]);
        assert!(all_paths_return(&returning));

        // gotoFalse else c; return 1; else:;   (else falls through)
        let else_label = Label::new("Label1");
        let missing = block(vec![
            goto_if(&else_label, Value::Bool(true), false),
            ret(Some(Value::I32(1))),
            label_stmt(&else_label),
        ]);
        assert!(!all_paths_return(&missing));
    }

    #[test]
    fn constant_branch_is_conservative_for_returns() {
        // if true { return 1 }  lowers to: gotoFalse end true; return 1; end:
        // The fall-through edge still counts as a path without a return.
        let end_label = Label::new("Label1");
        let body = block(vec![
            goto_if(&end_label, Value::Bool(true), false),
            ret(Some(Value::I32(1))),
            label_stmt(&end_label),
        ]);
        assert!(!all_paths_return(&body));
    }

    #[test]
    fn constant_branch_exposes_unreachable_code() {
        // if false { A } else { B }: the then-block is statically dead.
        let else_label = Label::new("Label1");
        let end_label = Label::new("Label2");
        let body = block(vec![
            goto_if(&else_label, Value::Bool(false), false),
            expr_stmt(Value::I32(1)),
            BoundStmt {
                kind: BoundStmtKind::Goto(end_label.clone()),
                loc: loc(),
            },
            label_stmt(&else_label),
            expr_stmt(Value::I32(2)),
            label_stmt(&end_label),
        ]);
        let unreachable = unreachable_statements(&body);
        assert_eq!(unreachable.len(), 1);
        assert!(!all_paths_return(&body));
    }

    #[test]
    fn code_after_goto_is_unreachable_once() {
        let target = Label::new("Label1");
        let body = block(vec![
            BoundStmt {
                kind: BoundStmtKind::Goto(target.clone()),
                loc: loc(),
            },
            expr_stmt(Value::I32(1)),
            expr_stmt(Value::I32(2)),
            label_stmt(&target),
            ret(None),
        ]);
        // One warning for the whole dead run, not one per statement.
        assert_eq!(unreachable_statements(&body).len(), 1);
    }
}
