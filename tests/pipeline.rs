//! End-to-end scenarios driving the whole pipeline: lex, parse, bind,
//! lower, and analyze, asserting on the formatted diagnostics and on the
//! shape of the resulting program.

use std::rc::Rc;

use indoc::indoc;
use pretty_assertions::assert_eq;
use quill::{
    binder::BoundProgram,
    bound::{BoundExprKind, BoundStmtKind},
    compilation::Compilation,
    parser::SyntaxTree,
    text::SourceText,
    token::Span,
    types::{Ty, Value},
    util::intern::Interner,
};

fn compile(source: &str) -> (BoundProgram, Vec<String>, Interner) {
    let mut interner = Interner::with_capacity(256);
    let tree = SyntaxTree::parse(SourceText::new(source), &mut interner);
    let program = Compilation::new(vec![tree]).bind(&mut interner);
    let diagnostics = program
        .diagnostics
        .iter()
        .map(|diagnostic| diagnostic.to_string())
        .collect();
    (program, diagnostics, interner)
}

#[track_caller]
fn assert_diagnostics(actual: &[String], expected: &[&str]) {
    assert_eq!(actual, expected);
}

#[test]
fn integer_widening_folds_to_typed_constant() {
    let (program, diagnostics, _) = compile("var x: int64 = 1 + 2");
    assert_diagnostics(&diagnostics, &[]);

    let scope = &program.global_scope;
    let BoundStmtKind::VariableDeclaration {
        variable,
        initializer,
    } = &scope.statements[0].kind
    else {
        panic!("expected a variable declaration");
    };
    assert_eq!(variable.ty, Ty::I64);
    assert_eq!(initializer.ty, Ty::I64);
    assert_eq!(initializer.constant, Some(Value::I64(3)));
}

#[test]
fn read_only_assignment_is_reported_at_the_assignment_operator() {
    let (program, diagnostics, _) = compile("const k = 1\nk = 2");
    assert_diagnostics(&diagnostics, &["cannot assign to read-only k"]);
    let location = &program.diagnostics[0].location;
    // The `=` of the second statement.
    assert_eq!(location.span, Span::new_of_bounds(14..15));
}

#[test]
fn divide_by_constant_zero_binds_no_division() {
    let (program, diagnostics, _) = compile("var x = 10 / 0");
    assert_diagnostics(&diagnostics, &["division by constant zero"]);

    let BoundStmtKind::VariableDeclaration { initializer, .. } =
        &program.global_scope.statements[0].kind
    else {
        panic!("expected a variable declaration");
    };
    assert!(matches!(initializer.kind, BoundExprKind::Error));
    // The emission gate empties the body maps.
    assert!(program.functions.is_empty());
}

#[test]
fn constant_false_branch_is_unreachable() {
    let source = r#"if false { writeLine("a") } else { writeLine("b") }"#;
    let (program, diagnostics, _) = compile(source);
    assert_diagnostics(&diagnostics, &["unreachable code detected"]);
    assert!(program.diagnostics[0].is_warning());
    // The warning points at the then-branch statement.
    let span = program.diagnostics[0].location.span;
    assert_eq!(span.lo, source.find("writeLine").unwrap());
    // Warnings do not gate emission.
    assert!(!program.functions.is_empty());
}

#[test]
fn class_constructors_are_synthesized_from_writable_fields() {
    let source = indoc! {r#"
        class P {
            x: int32;
            const tag: string = "p";
        }

        function main() {
            var p = P(7)
        }
    "#};
    let (program, diagnostics, interner) = compile(source);
    assert_diagnostics(&diagnostics, &[]);

    let class_id = program.global_scope.classes[0];
    let class = program.symbols.class(class_id);
    let parameterized = program.symbols.function(class.ctor());
    let zero = program.symbols.function(
        parameterized
            .overload_for
            .expect("the parameterized constructor chains to the zero-arg one"),
    );

    assert!(parameterized.is_constructor && zero.is_constructor);
    assert!(zero.params.is_empty());
    // `tag` is const and therefore not a constructor parameter.
    assert_eq!(parameterized.params.len(), 1);
    assert_eq!(interner.resolve(parameterized.params[0].name), "x");
    assert_eq!(parameterized.params[0].ty, Ty::I32);

    // Both constructors and main have lowered bodies.
    assert_eq!(program.functions.len(), 3);
    assert!(program.class_initializers.contains_key(&class_id));
}

#[test]
fn missing_return_on_some_path_is_reported_at_the_function_name() {
    let source = "function f(): int32 { if true { return 1 } }";
    let (program, diagnostics, _) = compile(source);
    assert_diagnostics(&diagnostics, &["not all code paths of f return a value"]);
    let span = program.diagnostics[0].location.span;
    assert_eq!(span.lo, source.find('f').unwrap());
    assert_eq!(span.len, 1);
}

#[test]
fn overload_resolution_takes_the_first_matching_candidate() {
    let source = indoc! {"
        function pick(a: int32): int32 { return 1 }
        function pick(a: int32, b: int32): int32 { return 2 }
        var two = pick(1, 2)
        var one = pick(5)
    "};
    let (program, diagnostics, _) = compile(source);
    assert_diagnostics(&diagnostics, &[]);

    let call_target = |stmt: &quill::bound::BoundStmt| {
        let BoundStmtKind::VariableDeclaration { initializer, .. } = &stmt.kind else {
            panic!("expected a variable declaration");
        };
        let BoundExprKind::Call { function, .. } = &initializer.kind else {
            panic!("expected a call initializer, got {initializer:?}");
        };
        *function
    };
    let two_target = call_target(&program.global_scope.statements[0]);
    let one_target = call_target(&program.global_scope.statements[1]);
    assert_ne!(two_target, one_target);
    assert_eq!(program.symbols.function(two_target).params.len(), 2);
    assert_eq!(program.symbols.function(one_target).params.len(), 1);
}

#[test]
fn no_matching_overload_reports_undefined_function() {
    let source = indoc! {r#"
        function pick(a: int32): int32 { return 1 }
        function pick(a: int32, b: int32): int32 { return 2 }
        var x = pick("nope")
    "#};
    let (_, diagnostics, _) = compile(source);
    assert_diagnostics(
        &diagnostics,
        &["function pick with matching arguments is not defined"],
    );
}

#[test]
fn instance_methods_bind_this_and_fields() {
    let source = indoc! {"
        class Counter {
            value: int32;
        }

        function Counter.bump(amount: int32): int32 {
            this.value += amount
            return this.value
        }

        function main() {
            var c = Counter(1)
            var v = c.bump(2)
        }
    "};
    let (program, diagnostics, _) = compile(source);
    assert_diagnostics(&diagnostics, &[]);

    let class_id = program.global_scope.classes[0];
    let class = program.symbols.class(class_id);
    assert_eq!(class.methods.len(), 1);
    let bump = program.symbols.function(class.methods[0]);
    assert_eq!(bump.receiver, Some(class_id));
    assert_eq!(bump.return_ty, Ty::I32);
}

#[test]
fn lowered_bodies_satisfy_the_goto_form_invariant() {
    let source = indoc! {"
        function sum(n: int32): int32 {
            var total = 0
            for i in 1..n {
                if i % 2 == 0 {
                    continue
                }
                total += i
            }
            var j = 0
            do {
                j += 1
            } while j < 3
            while total > 100 {
                total -= 10
            }
            return total
        }
    "};
    let (program, diagnostics, _) = compile(source);
    assert_diagnostics(&diagnostics, &[]);

    let (_, block) = program
        .functions
        .iter()
        .next()
        .expect("one function was bound");
    for stmt in &block.statements {
        assert!(
            matches!(
                stmt.kind,
                BoundStmtKind::Expression(_)
                    | BoundStmtKind::VariableDeclaration { .. }
                    | BoundStmtKind::Label(_)
                    | BoundStmtKind::Goto(_)
                    | BoundStmtKind::ConditionalGoto { .. }
                    | BoundStmtKind::Return(_)
                    | BoundStmtKind::Nop
            ),
            "structured statement survived lowering: {stmt:?}"
        );
        if let BoundStmtKind::Expression(expr) = &stmt.kind {
            assert!(
                !matches!(
                    expr.kind,
                    BoundExprKind::CompoundAssignment { .. }
                        | BoundExprKind::CompoundFieldAssignment { .. }
                ),
                "compound assignment survived lowering: {expr:?}"
            );
        }
    }
}

#[test]
fn the_point_distance_program_binds_cleanly() {
    let source = indoc! {"
        class Point { x: int32; y: int32; }
        function distanceSq(a: Point, b: Point): int32 {
            var dx = a.x - b.x;
            var dy = a.y - b.y;
            return dx * dx + dy * dy;
        }
    "};
    let (program, diagnostics, _) = compile(source);
    assert_diagnostics(&diagnostics, &[]);
    // Two constructors plus the function itself.
    assert_eq!(program.functions.len(), 3);
}

#[test]
fn global_statements_and_main_cannot_mix() {
    let source = indoc! {"
        writeLine(1)
        function main() { }
    "};
    let (_, diagnostics, _) = compile(source);
    assert_diagnostics(
        &diagnostics,
        &[
            "cannot declare main function when global statements are used",
            "cannot declare main function when global statements are used",
        ],
    );
}

#[test]
fn main_signature_is_checked() {
    let (_, diagnostics, _) = compile("function main(x: int32) { }");
    assert_diagnostics(
        &diagnostics,
        &["main must not take arguments and not return anything"],
    );
}

#[test]
fn break_outside_of_a_loop_is_an_error() {
    let (_, diagnostics, _) = compile("break");
    assert_diagnostics(&diagnostics, &["break can only be used inside of a loop"]);
}

#[test]
fn narrowing_literal_initializers_coerce_silently() {
    let (program, diagnostics, _) = compile("var y: int8 = 300");
    assert_diagnostics(&diagnostics, &[]);
    let BoundStmtKind::VariableDeclaration { initializer, .. } =
        &program.global_scope.statements[0].kind
    else {
        panic!("expected a variable declaration");
    };
    assert_eq!(initializer.constant, Some(Value::I8(44)));
}

#[test]
fn explicit_conversions_use_call_syntax() {
    let (_, diagnostics, _) = compile("var x = int32(\"42\")\nvar y = float64(x)");
    assert_diagnostics(&diagnostics, &[]);

    // Without the cast, a narrowing between variables is rejected.
    let (_, diagnostics, _) = compile("var a = 1\nvar b: int8 = a");
    assert_diagnostics(
        &diagnostics,
        &[
            "cannot implicitly convert type int32 to int8; an explicit conversion exists \
             (are you missing a cast?)",
        ],
    );
}

#[test]
fn string_concatenation_flattens_across_nesting() {
    let source = r#"
        function shout(name: string): string {
            return (name + "!") + "!"
        }
    "#;
    let (program, diagnostics, _) = compile(source);
    assert_diagnostics(&diagnostics, &[]);

    let (_, block) = program.functions.iter().next().expect("one bound body");
    let concat = block.statements.iter().find_map(|stmt| {
        let BoundStmtKind::Return(Some(expr)) = &stmt.kind else {
            return None;
        };
        let BoundExprKind::StringConcat(parts) = &expr.kind else {
            return None;
        };
        Some(parts)
    });
    let parts = concat.expect("the return value is a flattened concatenation");
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[1].constant, Some(Value::Str(Rc::from("!!"))));
}

#[test]
fn repl_style_chaining_keeps_previous_declarations_visible() {
    let mut interner = Interner::with_capacity(256);

    let first = SyntaxTree::parse(
        SourceText::new("var greeting = \"hello\"\nfunction twice(x: int32): int32 { return x * 2 }"),
        &mut interner,
    );
    let first = Rc::new(Compilation::new(vec![first]).bind(&mut interner));
    assert!(first.diagnostics.is_empty(), "{:?}", first.diagnostics);

    let second = SyntaxTree::parse(
        SourceText::new("var loud = greeting + \"!\"\nvar four = twice(2)"),
        &mut interner,
    );
    let second = Rc::new(Compilation::with_previous(&first, vec![second]).bind(&mut interner));
    assert!(second.diagnostics.is_empty(), "{:?}", second.diagnostics);

    // Identity of the chained global is preserved.
    let previous_global = &first.global_scope.variables[0];
    let BoundStmtKind::VariableDeclaration { initializer, .. } =
        &second.global_scope.statements[0].kind
    else {
        panic!("expected a variable declaration");
    };
    fn find_variable(expr: &quill::bound::BoundExpr) -> Option<&Rc<quill::symbols::VariableSymbol>> {
        match &expr.kind {
            BoundExprKind::Variable(v) => Some(v),
            BoundExprKind::Conversion { expr } => find_variable(expr),
            BoundExprKind::Binary { lhs, rhs, .. } => {
                find_variable(lhs).or_else(|| find_variable(rhs))
            }
            BoundExprKind::StringConcat(parts) => parts.iter().find_map(find_variable),
            _ => None,
        }
    }
    let used = find_variable(initializer).expect("the initializer reads the chained global");
    assert!(Rc::ptr_eq(used, previous_global));
}

#[test]
fn only_one_file_can_have_global_statements() {
    let mut interner = Interner::with_capacity(256);
    let a = SyntaxTree::parse(SourceText::new("var x = 1"), &mut interner);
    let b = SyntaxTree::parse(SourceText::new("var y = 2"), &mut interner);
    let program = Compilation::new(vec![a, b]).bind(&mut interner);
    let diagnostics: Vec<String> = program
        .diagnostics
        .iter()
        .map(|diagnostic| diagnostic.to_string())
        .collect();
    assert_diagnostics(&diagnostics, &["at most one file can have global statements"]);
}

#[test]
fn error_types_suppress_cascading_diagnostics() {
    // Only the undefined variable is reported, not a follow-on operator or
    // conversion error.
    let (_, diagnostics, _) = compile("var x = missing + 1\nvar y: int32 = x");
    assert_diagnostics(&diagnostics, &["variable missing is not defined"]);
}
