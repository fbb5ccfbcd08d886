use std::rc::Rc;

use crate::{
    ast::BinaryOp,
    bound::{
        BoundBinaryOp, BoundBlock, BoundExpr, BoundExprKind, BoundStmt, BoundStmtKind,
        BoundTreeRewriter, Label,
    },
    diagnostics::Location,
    symbols::{ClassId, VariableKind, VariableSymbol},
    types::{Ty, Value},
    util::intern::well_known,
};

/// Lowers a bound body: structured control flow becomes labels and
/// (conditional) gotos, compound assignments desugar, string concatenations
/// flatten, and the tree is squashed into one flat block. Void bodies that
/// can fall off the end get a trailing return.
pub fn lower_body(is_void: bool, body: BoundStmt) -> BoundBlock {
    let end_loc = body.loc.clone();
    let mut lowerer = Lowerer { label_count: 0 };
    let lowered = lowerer.rewrite_stmt(body);
    let lowered = ConcatFolder.rewrite_stmt(lowered);

    let mut statements = Vec::new();
    flatten_into(lowered, &mut statements);
    let ends_with_return = matches!(
        statements.last().map(|stmt| &stmt.kind),
        Some(BoundStmtKind::Return(_))
    );
    if is_void && !ends_with_return {
        statements.push(BoundStmt {
            kind: BoundStmtKind::Return(None),
            loc: end_loc,
        });
    }
    BoundBlock { statements }
}

fn flatten_into(stmt: BoundStmt, out: &mut Vec<BoundStmt>) {
    match stmt.kind {
        BoundStmtKind::Block(statements) => {
            for stmt in statements {
                flatten_into(stmt, out);
            }
        }
        _ => out.push(stmt),
    }
}

struct Lowerer {
    label_count: u32,
}

impl Lowerer {
    fn label(&mut self) -> Label {
        self.label_count += 1;
        Label::new(format!("Label{}", self.label_count))
    }
}

fn label_stmt(label: Label, loc: Location) -> BoundStmt {
    BoundStmt {
        kind: BoundStmtKind::Label(label),
        loc,
    }
}

fn goto(label: Label, loc: Location) -> BoundStmt {
    BoundStmt {
        kind: BoundStmtKind::Goto(label),
        loc,
    }
}

fn goto_if(label: Label, condition: BoundExpr, jump_if: bool, loc: Location) -> BoundStmt {
    BoundStmt {
        kind: BoundStmtKind::ConditionalGoto {
            label,
            condition,
            jump_if,
        },
        loc,
    }
}

fn block(statements: Vec<BoundStmt>, loc: Location) -> BoundStmt {
    BoundStmt {
        kind: BoundStmtKind::Block(statements),
        loc,
    }
}

impl BoundTreeRewriter for Lowerer {
    // if c then A            ==>  gotoFalse end c; A; end:
    // if c then A else B     ==>  gotoFalse else c; A; goto end; else:; B; end:
    fn rewrite_if(
        &mut self,
        condition: BoundExpr,
        then_branch: BoundStmt,
        else_branch: Option<BoundStmt>,
        loc: Location,
    ) -> BoundStmt {
        let lowered = match else_branch {
            None => {
                let end_label = self.label();
                block(
                    vec![
                        goto_if(end_label.clone(), condition, false, loc.clone()),
                        then_branch,
                        label_stmt(end_label, loc.clone()),
                    ],
                    loc,
                )
            }
            Some(else_branch) => {
                let else_label = self.label();
                let end_label = self.label();
                block(
                    vec![
                        goto_if(else_label.clone(), condition, false, loc.clone()),
                        then_branch,
                        goto(end_label.clone(), loc.clone()),
                        label_stmt(else_label, loc.clone()),
                        else_branch,
                        label_stmt(end_label, loc.clone()),
                    ],
                    loc,
                )
            }
        };
        self.rewrite_stmt(lowered)
    }

    // while c do B   ==>  goto continue; body:; B; continue:; gotoTrue body c; break:
    fn rewrite_while(
        &mut self,
        condition: BoundExpr,
        body: BoundStmt,
        break_label: Label,
        continue_label: Label,
        loc: Location,
    ) -> BoundStmt {
        let body_label = self.label();
        let lowered = block(
            vec![
                goto(continue_label.clone(), loc.clone()),
                label_stmt(body_label.clone(), loc.clone()),
                body,
                label_stmt(continue_label, loc.clone()),
                goto_if(body_label, condition, true, loc.clone()),
                label_stmt(break_label, loc.clone()),
            ],
            loc,
        );
        self.rewrite_stmt(lowered)
    }

    // do B while c   ==>  body:; B; continue:; gotoTrue body c; break:
    fn rewrite_do_while(
        &mut self,
        body: BoundStmt,
        condition: BoundExpr,
        break_label: Label,
        continue_label: Label,
        loc: Location,
    ) -> BoundStmt {
        let body_label = self.label();
        let lowered = block(
            vec![
                label_stmt(body_label.clone(), loc.clone()),
                body,
                label_stmt(continue_label, loc.clone()),
                goto_if(body_label, condition, true, loc.clone()),
                label_stmt(break_label, loc.clone()),
            ],
            loc,
        );
        self.rewrite_stmt(lowered)
    }

    // for i in lo..hi do B   ==>
    //     var i = lo
    //     var upper = hi
    //     while i <= upper { B; continue:; i = i + 1 }
    // The rewritten while gets a fresh continue label; the loop's original
    // one sits right before the increment.
    fn rewrite_for(
        &mut self,
        variable: Rc<VariableSymbol>,
        lower: BoundExpr,
        upper: BoundExpr,
        body: BoundStmt,
        break_label: Label,
        continue_label: Label,
        loc: Location,
    ) -> BoundStmt {
        let upper_var = Rc::new(VariableSymbol {
            name: well_known::UPPER,
            ty: Ty::I32,
            read_only: true,
            constant: None,
            kind: VariableKind::Local,
        });

        let le = BoundBinaryOp::bind(BinaryOp::Le, Ty::I32, Ty::I32)
            .expect("int32 <= int32 is defined");
        let add = BoundBinaryOp::bind(BinaryOp::Add, Ty::I32, Ty::I32)
            .expect("int32 + int32 is defined");

        let condition = BoundExpr {
            kind: BoundExprKind::Binary {
                op: le,
                lhs: Box::new(BoundExpr::variable(Rc::clone(&variable), loc.clone())),
                rhs: Box::new(BoundExpr::variable(Rc::clone(&upper_var), loc.clone())),
            },
            ty: Ty::Bool,
            constant: None,
            loc: loc.clone(),
        };
        let increment = BoundStmt {
            kind: BoundStmtKind::Expression(BoundExpr {
                kind: BoundExprKind::Assignment {
                    variable: Rc::clone(&variable),
                    value: Box::new(BoundExpr {
                        kind: BoundExprKind::Binary {
                            op: add,
                            lhs: Box::new(BoundExpr::variable(Rc::clone(&variable), loc.clone())),
                            rhs: Box::new(BoundExpr::literal(Value::I32(1), loc.clone())),
                        },
                        ty: Ty::I32,
                        constant: None,
                        loc: loc.clone(),
                    }),
                },
                ty: Ty::I32,
                constant: None,
                loc: loc.clone(),
            }),
            loc: loc.clone(),
        };

        let while_continue = self.label();
        let lowered = block(
            vec![
                BoundStmt {
                    kind: BoundStmtKind::VariableDeclaration {
                        variable,
                        initializer: lower,
                    },
                    loc: loc.clone(),
                },
                BoundStmt {
                    kind: BoundStmtKind::VariableDeclaration {
                        variable: upper_var,
                        initializer: upper,
                    },
                    loc: loc.clone(),
                },
                BoundStmt {
                    kind: BoundStmtKind::While {
                        condition,
                        body: Box::new(block(
                            vec![body, label_stmt(continue_label, loc.clone()), increment],
                            loc.clone(),
                        )),
                        break_label,
                        continue_label: while_continue,
                    },
                    loc: loc.clone(),
                },
            ],
            loc,
        );
        self.rewrite_stmt(lowered)
    }

    // v op= e   ==>   v = v op e
    fn rewrite_compound_assignment(
        &mut self,
        variable: Rc<VariableSymbol>,
        op: BoundBinaryOp,
        value: BoundExpr,
        ty: Ty,
        loc: Location,
    ) -> BoundExpr {
        let value = self.rewrite_expr(value);
        let binary = BoundExpr {
            kind: BoundExprKind::Binary {
                op,
                lhs: Box::new(BoundExpr::variable(Rc::clone(&variable), loc.clone())),
                rhs: Box::new(value),
            },
            ty: op.ty,
            constant: None,
            loc: loc.clone(),
        };
        BoundExpr {
            kind: BoundExprKind::Assignment {
                variable,
                value: Box::new(binary),
            },
            ty,
            constant: None,
            loc,
        }
    }

    // o.f op= e   ==>   o.f = o.f op e
    #[allow(clippy::too_many_arguments)]
    fn rewrite_compound_field_assignment(
        &mut self,
        instance: BoundExpr,
        class: ClassId,
        field: usize,
        op: BoundBinaryOp,
        value: BoundExpr,
        ty: Ty,
        loc: Location,
    ) -> BoundExpr {
        let instance = self.rewrite_expr(instance);
        let value = self.rewrite_expr(value);
        let access = BoundExpr {
            kind: BoundExprKind::FieldAccess {
                instance: Box::new(instance.clone()),
                class,
                field,
            },
            ty: op.lhs_ty,
            constant: None,
            loc: loc.clone(),
        };
        let binary = BoundExpr {
            kind: BoundExprKind::Binary {
                op,
                lhs: Box::new(access),
                rhs: Box::new(value),
            },
            ty: op.ty,
            constant: None,
            loc: loc.clone(),
        };
        BoundExpr {
            kind: BoundExprKind::FieldAssignment {
                instance: Box::new(instance),
                class,
                field,
                value: Box::new(binary),
            },
            ty,
            constant: None,
            loc,
        }
    }
}

/// Flattens `+` chains over strings into one n-ary concatenation, merging
/// adjacent constant operands. Works on arbitrarily nested trees: in
/// `(a + b) + c` with constant `b` and `c`, the parts become `[a, "bc"]`.
struct ConcatFolder;

impl ConcatFolder {
    fn collect(&mut self, expr: BoundExpr, parts: &mut Vec<BoundExpr>) {
        match expr.kind {
            BoundExprKind::Binary { op, lhs, rhs }
                if op.kind == BinaryOp::Add && op.ty == Ty::String =>
            {
                self.collect(*lhs, parts);
                self.collect(*rhs, parts);
            }
            BoundExprKind::StringConcat(inner) => {
                for part in inner {
                    self.collect(part, parts);
                }
            }
            _ => parts.push(self.rewrite_expr(expr)),
        }
    }
}

impl BoundTreeRewriter for ConcatFolder {
    fn rewrite_binary(
        &mut self,
        op: BoundBinaryOp,
        lhs: BoundExpr,
        rhs: BoundExpr,
        ty: Ty,
        constant: Option<Value>,
        loc: Location,
    ) -> BoundExpr {
        if !(op.kind == BinaryOp::Add && ty == Ty::String) {
            return BoundExpr {
                kind: BoundExprKind::Binary {
                    op,
                    lhs: Box::new(self.rewrite_expr(lhs)),
                    rhs: Box::new(self.rewrite_expr(rhs)),
                },
                ty,
                constant,
                loc,
            };
        }

        let mut parts = Vec::new();
        self.collect(lhs, &mut parts);
        self.collect(rhs, &mut parts);

        // Merge adjacent constant strings.
        let mut merged: Vec<BoundExpr> = Vec::with_capacity(parts.len());
        for part in parts {
            let previous = merged.last().and_then(|prev| match &prev.constant {
                Some(Value::Str(s)) => Some(Rc::clone(s)),
                _ => None,
            });
            let current = match &part.constant {
                Some(Value::Str(s)) => Some(Rc::clone(s)),
                _ => None,
            };
            match (previous, current) {
                (Some(a), Some(b)) => {
                    let folded = Value::Str(Rc::from(format!("{a}{b}").as_str()));
                    let loc = merged
                        .last()
                        .map(|prev| prev.loc.clone())
                        .unwrap_or_else(|| part.loc.clone());
                    *merged.last_mut().expect("previous constant implies a part") =
                        BoundExpr::literal(folded, loc);
                }
                _ => merged.push(part),
            }
        }

        if merged.len() == 1 {
            merged.pop().expect("length was checked")
        } else {
            BoundExpr {
                kind: BoundExprKind::StringConcat(merged),
                ty: Ty::String,
                constant: None,
                loc,
            }
        }
    }
}
