use std::{collections::HashMap, rc::Rc};

use crate::{
    ast::{self, ClassDecl, Expr, ExprKind, FunctionDecl, Ident, Member, Stmt, StmtKind},
    bound::{
        self, BoundBinaryOp, BoundBlock, BoundExpr, BoundExprKind, BoundStmt, BoundStmtKind,
        BoundUnaryOp, Label,
    },
    cfg,
    diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind, Location},
    lowerer,
    parser::SyntaxTree,
    symbols::{
        pop_scope, push_scope, BoundScope, ClassId, ClassSymbol, FieldSymbol, FnId,
        FunctionSymbol, Symbol, Symbols, VariableKind, VariableSymbol,
    },
    text::SourceText,
    token::{Span, TokenKind},
    types::{Conversion, Ty, Value},
    util::intern::{well_known, Interner, Name},
};

/// The result of binding the declarations (and global statements) of one
/// compilation, chained under the previous compilation's scope.
pub struct BoundGlobalScope {
    pub previous: Option<Rc<BoundGlobalScope>>,
    pub diagnostics: Vec<Diagnostic>,
    pub main_function: Option<FnId>,
    /// Whether `main` was synthesized to hold the global statements.
    pub main_is_synthesized: bool,
    /// Classes declared by this compilation, in declaration order.
    pub classes: Vec<ClassId>,
    /// User functions (including instance methods) declared by this
    /// compilation, in declaration order.
    pub functions: Vec<FnId>,
    /// Global variables declared by this compilation's global statements.
    pub variables: Vec<Rc<VariableSymbol>>,
    /// The bound global statements, in textual order.
    pub statements: Vec<BoundStmt>,
    /// Bound field initializer expressions per class, parallel to the field
    /// list. Consumed by constructor synthesis.
    pub field_initializers: HashMap<ClassId, Vec<Option<BoundExpr>>>,
    pub symbols: Symbols,
}

/// A fully bound and lowered program, ready for emission.
pub struct BoundProgram {
    pub previous: Option<Rc<BoundProgram>>,
    pub diagnostics: Vec<Diagnostic>,
    pub main_function: Option<FnId>,
    /// Lowered bodies: user functions, `main`, and the synthesized class
    /// constructors. Empty when any error diagnostic exists.
    pub functions: HashMap<FnId, BoundBlock>,
    /// Lowered field-initializer block per class. Empty when any error
    /// diagnostic exists.
    pub class_initializers: HashMap<ClassId, BoundBlock>,
    pub symbols: Symbols,
    pub global_scope: Rc<BoundGlobalScope>,
}

/// Binds the declarations of all trees into a global scope: classes first,
/// then functions, then the global statements. The order is load-bearing;
/// functions may reference any class and statements may reference both.
pub fn bind_global_scope(
    previous: Option<Rc<BoundGlobalScope>>,
    trees: &[SyntaxTree],
    interner: &mut Interner,
) -> BoundGlobalScope {
    let symbols = match &previous {
        Some(previous) => previous.symbols.clone(),
        None => Symbols::with_builtins(interner),
    };

    let chain = scope_chain(previous.as_ref());
    let mut binder = Binder::new(interner, symbols);
    binder.scope = build_scope(&binder.symbols, &chain);
    // The working scope of this compilation.
    push_scope(&mut binder.scope);

    // Phase 1a: forward-declare every class so fields and signatures may
    // reference classes in any order.
    let mut class_ids = Vec::new();
    for tree in trees {
        binder.source = Rc::clone(&tree.source);
        for member in &tree.root.members {
            if let Member::Class(decl) = member {
                class_ids.push(binder.declare_class(decl));
            }
        }
    }

    // Phase 1b: bind field lists and synthesize the constructor pair.
    let mut field_initializers = HashMap::new();
    let mut class_index = 0;
    for tree in trees {
        binder.source = Rc::clone(&tree.source);
        for member in &tree.root.members {
            if let Member::Class(decl) = member {
                let id = class_ids[class_index];
                class_index += 1;
                let initializers = binder.bind_class_fields(id, decl);
                binder.make_constructors(id);
                field_initializers.insert(id, initializers);
            }
        }
    }

    // Phase 2: declare functions.
    let mut function_ids = Vec::new();
    for tree in trees {
        binder.source = Rc::clone(&tree.source);
        for member in &tree.root.members {
            if let Member::Function(decl) = member {
                function_ids.push(binder.declare_function(decl));
            }
        }
    }

    // Phase 3: bind global statements, in textual order per tree.
    let mut statements = Vec::new();
    let mut first_statement_locations = Vec::new();
    for tree in trees {
        let Some(first) = tree.global_statements().next() else {
            continue;
        };
        binder.source = Rc::clone(&tree.source);
        let location = binder.loc(first.span);
        if !first_statement_locations.is_empty() {
            binder
                .diagnostics
                .report(location.clone(), DiagnosticKind::OnlyOneFileCanHaveGlobalStatements);
        }
        first_statement_locations.push(location);
        for stmt in tree.global_statements() {
            let bound = binder.bind_statement(stmt);
            statements.push(bound);
        }
    }

    // Entry-point resolution.
    let user_main = function_ids
        .iter()
        .copied()
        .find(|&id| binder.symbols.function(id).name == well_known::MAIN);
    let mut main_is_synthesized = false;
    let main_function = if !statements.is_empty() {
        match user_main {
            Some(id) => {
                // Both surfaces are flagged: the declaration and the first
                // global statement of every file that has one.
                let locations = binder.symbols.function(id).decl.clone().into_iter();
                for location in locations.chain(first_statement_locations) {
                    binder
                        .diagnostics
                        .report(location, DiagnosticKind::CannotMixMainAndGlobalStatements);
                }
                Some(id)
            }
            None => {
                main_is_synthesized = true;
                Some(binder.symbols.add_function(FunctionSymbol {
                    name: well_known::MAIN,
                    params: Vec::new(),
                    return_ty: Ty::Void,
                    receiver: None,
                    overload_for: None,
                    is_constructor: false,
                    decl: None,
                    builtin: None,
                }))
            }
        }
    } else {
        if let Some(id) = user_main {
            let function = binder.symbols.function(id);
            if !function.params.is_empty() || function.return_ty != Ty::Void {
                if let Some(location) = function.decl.clone() {
                    binder
                        .diagnostics
                        .report(location, DiagnosticKind::MainMustHaveCorrectSignature);
                }
            }
        }
        user_main
    };

    BoundGlobalScope {
        previous,
        diagnostics: binder.diagnostics.into_vec(),
        main_function,
        main_is_synthesized,
        classes: class_ids,
        functions: function_ids,
        variables: binder.globals,
        statements,
        field_initializers,
        symbols: binder.symbols,
    }
}

/// Binds every function body of the global scope, synthesizes constructor
/// bodies, lowers everything, and runs the control-flow checks. When any
/// error diagnostic exists the body maps are left empty, gating emission.
pub fn bind_program(
    previous: Option<Rc<BoundProgram>>,
    global_scope: &Rc<BoundGlobalScope>,
    trees: &[SyntaxTree],
    interner: &mut Interner,
) -> BoundProgram {
    let mut binder = Binder::new(interner, global_scope.symbols.clone());
    let mut functions = HashMap::new();
    let mut class_initializers = HashMap::new();

    // Constructor bodies, in class declaration order.
    for &class_id in &global_scope.classes {
        let initializers = &global_scope.field_initializers[&class_id];
        let (zero_body, param_body, init_block) =
            binder.synthesize_constructor_bodies(class_id, initializers);
        let class = binder.symbols.class(class_id);
        let param_ctor = class.ctor();
        let zero_ctor = binder
            .symbols
            .function(param_ctor)
            .overload_for
            .expect("the parameterized constructor chains to the zero-arg one");
        functions.insert(zero_ctor, zero_body);
        functions.insert(param_ctor, param_body);
        class_initializers.insert(class_id, init_block);
    }

    // User function bodies, paired with their symbols in declaration order.
    let full_chain = scope_chain(Some(global_scope));
    let mut decl_ids = global_scope.functions.iter().copied();
    for tree in trees {
        binder.source = Rc::clone(&tree.source);
        for member in &tree.root.members {
            if let Member::Function(decl) = member {
                let fn_id = decl_ids
                    .next()
                    .expect("function symbols align with declarations");
                binder.scope = build_scope(&binder.symbols, &full_chain);
                let block = binder.bind_function_body(fn_id, decl);
                functions.insert(fn_id, block);
            }
        }
    }

    // The synthesized main holds the lowered global statements.
    if global_scope.main_is_synthesized {
        if let Some(main_id) = global_scope.main_function {
            let loc = global_scope
                .statements
                .first()
                .map(|stmt| stmt.loc.clone())
                .unwrap_or_else(|| binder.loc_here());
            let body = BoundStmt {
                kind: BoundStmtKind::Block(global_scope.statements.clone()),
                loc,
            };
            let block = lowerer::lower_body(true, body);
            binder.report_unreachable(&block);
            functions.insert(main_id, block);
        }
    }

    let mut diagnostics = global_scope.diagnostics.clone();
    diagnostics.extend(binder.diagnostics.into_vec());
    if diagnostics.iter().any(Diagnostic::is_error) {
        functions.clear();
        class_initializers.clear();
    }

    BoundProgram {
        previous,
        diagnostics,
        main_function: global_scope.main_function,
        functions,
        class_initializers,
        symbols: binder.symbols,
        global_scope: Rc::clone(global_scope),
    }
}

/// The scope chain ending at (and including) `scope`, oldest first.
fn scope_chain(scope: Option<&Rc<BoundGlobalScope>>) -> Vec<Rc<BoundGlobalScope>> {
    let mut chain = Vec::new();
    let mut current = scope.cloned();
    while let Some(scope) = current {
        current = scope.previous.clone();
        chain.push(scope);
    }
    chain.reverse();
    chain
}

/// Builds the scope tree: builtins at the root, then one fresh scope per
/// chained compilation replaying its classes, functions, and variables, in
/// that order.
fn build_scope(symbols: &Symbols, chain: &[Rc<BoundGlobalScope>]) -> BoundScope {
    let mut scope = BoundScope::root();
    for &id in symbols.builtins() {
        scope.redeclare(symbols.function(id).name, Symbol::Function(id));
    }
    for global in chain {
        push_scope(&mut scope);
        for &class in &global.classes {
            scope.redeclare(symbols.class(class).name, Symbol::Class(class));
        }
        for &function in &global.functions {
            // Instance methods live in their class's namespace, not here.
            // Later overload heads replace earlier ones.
            if symbols.function(function).receiver.is_none() {
                scope.redeclare(symbols.function(function).name, Symbol::Function(function));
            }
        }
        for variable in &global.variables {
            scope.redeclare(variable.name, Symbol::Variable(Rc::clone(variable)));
        }
    }
    scope
}

/// The binder proper: a single mutable cursor (`scope`) walking the scope
/// tree, a loop stack, a label counter, and the diagnostic bag of the run.
struct Binder<'i> {
    interner: &'i mut Interner,
    symbols: Symbols,
    scope: BoundScope,
    diagnostics: DiagnosticBag,
    source: Rc<SourceText>,
    /// The function whose body is being bound; `None` during global
    /// statements.
    function: Option<FnId>,
    this_var: Option<Rc<VariableSymbol>>,
    /// `(break, continue)` labels of the enclosing loops.
    loop_stack: Vec<(Label, Label)>,
    label_counter: u32,
    globals: Vec<Rc<VariableSymbol>>,
}

impl<'i> Binder<'i> {
    fn new(interner: &'i mut Interner, symbols: Symbols) -> Binder<'i> {
        Binder {
            interner,
            symbols,
            scope: BoundScope::root(),
            diagnostics: DiagnosticBag::new(),
            source: Rc::new(SourceText::new("")),
            function: None,
            this_var: None,
            loop_stack: Vec::new(),
            label_counter: 0,
            globals: Vec::new(),
        }
    }

    fn loc(&self, span: Span) -> Location {
        Location::new(Rc::clone(&self.source), span)
    }

    fn loc_here(&self) -> Location {
        Location::new(Rc::clone(&self.source), Span::empty(0))
    }

    fn name_str(&self, name: Name) -> Box<str> {
        self.interner.resolve(name).into()
    }

    fn type_name(&self, ty: Ty) -> Box<str> {
        self.symbols.type_name(self.interner, ty)
    }

    fn is_missing(&self, ident: &Ident) -> bool {
        ident.name.is_empty()
    }

    // ------------------------------------------------------------------
    // Declarations

    fn declare_class(&mut self, decl: &ClassDecl) -> ClassId {
        let location = self.loc(decl.name.span);
        let id = self
            .symbols
            .add_class(ClassSymbol::new(decl.name.name, Some(location.clone())));
        if !self.is_missing(&decl.name)
            && !self.scope.try_declare(decl.name.name, Symbol::Class(id))
        {
            let name = self.name_str(decl.name.name);
            self.diagnostics
                .report(location, DiagnosticKind::SymbolAlreadyDeclared(name));
        }
        id
    }

    fn bind_class_fields(&mut self, id: ClassId, decl: &ClassDecl) -> Vec<Option<BoundExpr>> {
        let mut initializers = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let ty = self.bind_type(&field.ty.name);
            if self.symbols.class(id).field(field.name.name).is_some() {
                let name = self.name_str(field.name.name);
                let location = self.loc(field.name.span);
                self.diagnostics
                    .report(location, DiagnosticKind::SymbolAlreadyDeclared(name));
            }
            self.symbols.class_mut(id).fields.push(FieldSymbol {
                name: field.name.name,
                ty,
                read_only: field.const_kw.is_some(),
            });
            let initializer = field.initializer.as_ref().map(|init| {
                let bound = self.bind_value_expression(init);
                self.bind_initializer_conversion(bound, ty)
            });
            initializers.push(initializer);
        }
        initializers
    }

    /// Declares the constructor pair: a zero-arg `.ctor`, and a
    /// parameterized `.ctor` (one parameter per writable field, in field
    /// order) that chains to the zero-arg one.
    fn make_constructors(&mut self, id: ClassId) {
        let decl = self.symbols.class(id).decl.clone();

        let zero = self.symbols.add_function(FunctionSymbol {
            name: well_known::CTOR,
            params: Vec::new(),
            return_ty: Ty::Void,
            receiver: Some(id),
            overload_for: None,
            is_constructor: true,
            decl: decl.clone(),
            builtin: None,
        });

        let params = self
            .symbols
            .class(id)
            .ctor_fields()
            .enumerate()
            .map(|(ordinal, (_, field))| {
                Rc::new(VariableSymbol {
                    name: field.name,
                    ty: field.ty,
                    read_only: true,
                    constant: None,
                    // Ordinal 0 is the implicit receiver.
                    kind: VariableKind::Parameter {
                        ordinal: ordinal as u32 + 1,
                    },
                })
            })
            .collect();
        let parameterized = self.symbols.add_function(FunctionSymbol {
            name: well_known::CTOR,
            params,
            return_ty: Ty::Void,
            receiver: Some(id),
            overload_for: Some(zero),
            is_constructor: true,
            decl,
            builtin: None,
        });
        self.symbols.class_mut(id).set_ctor(parameterized);
    }

    fn declare_function(&mut self, decl: &FunctionDecl) -> FnId {
        let receiver = decl.receiver.as_ref().and_then(|ident| {
            match self.scope.try_lookup(ident.name) {
                Some(Symbol::Class(id)) => Some(*id),
                _ => {
                    let name = self.name_str(ident.name);
                    let location = self.loc(ident.span);
                    self.diagnostics
                        .report(location, DiagnosticKind::NotAClass(name));
                    None
                }
            }
        });

        let ordinal_base = receiver.is_some() as u32;
        let mut params: Vec<Rc<VariableSymbol>> = Vec::with_capacity(decl.params.len());
        for (index, param) in decl.params.iter().enumerate() {
            let ty = self.bind_type(&param.ty.name);
            if params.iter().any(|p| p.name == param.name.name) {
                let name = self.name_str(param.name.name);
                let location = self.loc(param.name.span);
                self.diagnostics
                    .report(location, DiagnosticKind::ParameterAlreadyDeclared(name));
            }
            params.push(Rc::new(VariableSymbol {
                name: param.name.name,
                ty,
                read_only: true,
                constant: None,
                kind: VariableKind::Parameter {
                    ordinal: ordinal_base + index as u32,
                },
            }));
        }

        let return_ty = decl
            .return_ty
            .as_ref()
            .map(|clause| self.bind_type(&clause.name))
            .unwrap_or(Ty::Void);

        let id = self.symbols.add_function(FunctionSymbol {
            name: decl.name.name,
            params,
            return_ty,
            receiver,
            overload_for: None,
            is_constructor: false,
            decl: Some(self.loc(decl.name.span)),
            builtin: None,
        });

        match receiver {
            Some(class_id) => {
                self.symbols.class_mut(class_id).methods.push(id);
            }
            None => {
                if !self.is_missing(&decl.name) {
                    self.declare_function_in_scope(id, decl);
                }
            }
        }
        id
    }

    /// Free functions share a name by forming an overload chain: the newest
    /// declaration becomes the head and links to the previous one. A clash
    /// with a non-function is a plain redeclaration error.
    fn declare_function_in_scope(&mut self, id: FnId, decl: &FunctionDecl) {
        let name = decl.name.name;
        match self.scope.try_lookup_here(name) {
            None => {
                self.scope.redeclare(name, Symbol::Function(id));
            }
            Some(Symbol::Function(existing)) => {
                let existing = *existing;
                self.symbols.function_mut(id).overload_for = Some(existing);
                self.scope.redeclare(name, Symbol::Function(id));
            }
            Some(_) => {
                let text = self.name_str(name);
                let location = self.loc(decl.name.span);
                self.diagnostics
                    .report(location, DiagnosticKind::SymbolAlreadyDeclared(text));
            }
        }
    }

    // ------------------------------------------------------------------
    // Bodies

    fn bind_function_body(&mut self, fn_id: FnId, decl: &FunctionDecl) -> BoundBlock {
        self.function = Some(fn_id);
        self.label_counter = 0;
        push_scope(&mut self.scope);

        let function = self.symbols.function(fn_id);
        let receiver = function.receiver;
        let return_ty = function.return_ty;
        let params = function.params.clone();

        self.this_var = receiver.map(|class_id| {
            Rc::new(VariableSymbol {
                name: well_known::THIS,
                ty: Ty::Class(class_id),
                read_only: true,
                constant: None,
                kind: VariableKind::Parameter { ordinal: 0 },
            })
        });
        for param in params {
            self.scope.redeclare(param.name, Symbol::Variable(param));
        }

        let body = self.bind_statement(&decl.body);
        pop_scope(&mut self.scope);
        self.this_var = None;
        self.function = None;

        let block = lowerer::lower_body(return_ty == Ty::Void, body);
        self.report_unreachable(&block);
        if return_ty != Ty::Void && !cfg::all_paths_return(&block) {
            let function = self.symbols.function(fn_id);
            if let Some(location) = function.decl.clone() {
                let name = self.name_str(function.name);
                self.diagnostics
                    .report(location, DiagnosticKind::AllPathsMustReturn(name));
            }
        }
        block
    }

    fn report_unreachable(&mut self, block: &BoundBlock) {
        for location in cfg::unreachable_statements(block) {
            self.diagnostics
                .report(location, DiagnosticKind::UnreachableCode);
        }
    }

    /// Builds the three synthesized bodies of a class: the zero-arg
    /// constructor (runs every field initializer or default), the
    /// parameterized constructor (const initializers, then one parameter
    /// store per writable field), and the bare initializer block.
    fn synthesize_constructor_bodies(
        &mut self,
        class_id: ClassId,
        initializers: &[Option<BoundExpr>],
    ) -> (BoundBlock, BoundBlock, BoundBlock) {
        let class = self.symbols.class(class_id);
        let loc = class
            .decl
            .clone()
            .unwrap_or_else(|| self.loc_here());
        let this = Rc::new(VariableSymbol {
            name: well_known::THIS,
            ty: Ty::Class(class_id),
            read_only: true,
            constant: None,
            kind: VariableKind::Parameter { ordinal: 0 },
        });
        let this_expr = || BoundExpr::variable(Rc::clone(&this), loc.clone());

        let class = self.symbols.class(class_id);
        let mut init_stmts = Vec::new();
        for (index, field) in class.fields.iter().enumerate() {
            let value = match initializers.get(index).and_then(Clone::clone) {
                Some(bound) => bound,
                None => match field.ty.default_value() {
                    Some(value) => BoundExpr::typed_literal(value, field.ty, loc.clone()),
                    // Class-typed fields without initializers keep their
                    // host default.
                    None => continue,
                },
            };
            init_stmts.push(BoundStmt {
                kind: BoundStmtKind::Expression(BoundExpr {
                    ty: value.ty,
                    constant: None,
                    loc: loc.clone(),
                    kind: BoundExprKind::FieldAssignment {
                        instance: Box::new(this_expr()),
                        class: class_id,
                        field: index,
                        value: Box::new(value),
                    },
                }),
                loc: loc.clone(),
            });
        }

        let mut param_stmts = Vec::new();
        let param_ctor = class.ctor();
        let params = self.symbols.function(param_ctor).params.clone();
        let mut params = params.into_iter();
        let class = self.symbols.class(class_id);
        for (index, field) in class.fields.iter().enumerate() {
            let value = if field.read_only {
                match initializers.get(index).and_then(Clone::clone) {
                    Some(bound) => bound,
                    None => match field.ty.default_value() {
                        Some(value) => BoundExpr::typed_literal(value, field.ty, loc.clone()),
                        None => continue,
                    },
                }
            } else {
                let param = params
                    .next()
                    .expect("one constructor parameter per writable field");
                BoundExpr::variable(param, loc.clone())
            };
            param_stmts.push(BoundStmt {
                kind: BoundStmtKind::Expression(BoundExpr {
                    ty: value.ty,
                    constant: None,
                    loc: loc.clone(),
                    kind: BoundExprKind::FieldAssignment {
                        instance: Box::new(this_expr()),
                        class: class_id,
                        field: index,
                        value: Box::new(value),
                    },
                }),
                loc: loc.clone(),
            });
        }

        let block_of = |stmts: Vec<BoundStmt>| {
            lowerer::lower_body(
                true,
                BoundStmt {
                    kind: BoundStmtKind::Block(stmts),
                    loc: loc.clone(),
                },
            )
        };
        let zero_body = block_of(init_stmts.clone());
        let param_body = block_of(param_stmts);
        let init_block = block_of(init_stmts);
        (zero_body, param_body, init_block)
    }

    // ------------------------------------------------------------------
    // Statements

    fn bind_statement(&mut self, stmt: &Stmt) -> BoundStmt {
        let loc = self.loc(stmt.span);
        match &stmt.kind {
            StmtKind::Block(statements) => {
                push_scope(&mut self.scope);
                let statements = statements
                    .iter()
                    .map(|stmt| self.bind_statement(stmt))
                    .collect();
                pop_scope(&mut self.scope);
                BoundStmt {
                    kind: BoundStmtKind::Block(statements),
                    loc,
                }
            }
            StmtKind::VariableDeclaration {
                keyword,
                name,
                ty,
                initializer,
            } => self.bind_variable_declaration(*keyword, name, ty.as_ref(), initializer.as_ref(), loc),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.bind_condition(condition);
                let then_branch = Box::new(self.bind_statement(then_branch));
                let else_branch = else_branch
                    .as_ref()
                    .map(|stmt| Box::new(self.bind_statement(stmt)));
                BoundStmt {
                    kind: BoundStmtKind::If {
                        condition,
                        then_branch,
                        else_branch,
                    },
                    loc,
                }
            }
            StmtKind::While { condition, body } => {
                let condition = self.bind_condition(condition);
                let (break_label, continue_label) = self.loop_labels();
                let body = Box::new(self.bind_loop_body(body, &break_label, &continue_label));
                BoundStmt {
                    kind: BoundStmtKind::While {
                        condition,
                        body,
                        break_label,
                        continue_label,
                    },
                    loc,
                }
            }
            StmtKind::DoWhile { body, condition } => {
                let (break_label, continue_label) = self.loop_labels();
                let body = Box::new(self.bind_loop_body(body, &break_label, &continue_label));
                let condition = self.bind_condition(condition);
                BoundStmt {
                    kind: BoundStmtKind::DoWhile {
                        body,
                        condition,
                        break_label,
                        continue_label,
                    },
                    loc,
                }
            }
            StmtKind::For {
                variable,
                lower,
                upper,
                body,
            } => {
                let lower = self.bind_value_expression(lower);
                let lower = self.bind_conversion(lower, Ty::I32, false);
                let upper = self.bind_value_expression(upper);
                let upper = self.bind_conversion(upper, Ty::I32, false);

                push_scope(&mut self.scope);
                let variable = self.declare_variable(variable, Ty::I32, true, None);
                let (break_label, continue_label) = self.loop_labels();
                let body = Box::new(self.bind_loop_body(body, &break_label, &continue_label));
                pop_scope(&mut self.scope);

                BoundStmt {
                    kind: BoundStmtKind::For {
                        variable,
                        lower,
                        upper,
                        body,
                        break_label,
                        continue_label,
                    },
                    loc,
                }
            }
            StmtKind::Break | StmtKind::Continue => {
                let is_break = matches!(stmt.kind, StmtKind::Break);
                match self.loop_stack.last() {
                    Some((break_label, continue_label)) => {
                        let label = if is_break { break_label } else { continue_label };
                        BoundStmt {
                            kind: BoundStmtKind::Goto(label.clone()),
                            loc,
                        }
                    }
                    None => {
                        let keyword = if is_break { "break" } else { "continue" };
                        self.diagnostics.report(
                            loc.clone(),
                            DiagnosticKind::InvalidBreakOrContinue(keyword.into()),
                        );
                        BoundStmt {
                            kind: BoundStmtKind::Nop,
                            loc,
                        }
                    }
                }
            }
            StmtKind::Return { value } => self.bind_return(value.as_ref(), loc),
            StmtKind::Expression(expr) => {
                let bound = self.bind_expression(expr);
                use BoundExprKind::*;
                let valid = matches!(
                    bound.kind,
                    Assignment { .. }
                        | CompoundAssignment { .. }
                        | FieldAssignment { .. }
                        | CompoundFieldAssignment { .. }
                        | Call { .. }
                        | Error
                );
                if !valid {
                    self.diagnostics
                        .report(bound.loc.clone(), DiagnosticKind::InvalidExpressionStatement);
                }
                BoundStmt {
                    kind: BoundStmtKind::Expression(bound),
                    loc,
                }
            }
        }
    }

    fn bind_variable_declaration(
        &mut self,
        keyword: TokenKind,
        name: &Ident,
        ty: Option<&ast::TypeClause>,
        initializer: Option<&Expr>,
        loc: Location,
    ) -> BoundStmt {
        let declared_ty = ty.map(|clause| self.bind_type(&clause.name));
        let initializer = match initializer {
            Some(expr) => {
                let bound = self.bind_value_expression(expr);
                match declared_ty {
                    Some(ty) => self.bind_initializer_conversion(bound, ty),
                    None => bound,
                }
            }
            None => self.default_value_expression(declared_ty.unwrap_or(Ty::Error), loc.clone()),
        };
        let var_ty = declared_ty.unwrap_or(initializer.ty);
        let read_only = keyword == TokenKind::Const;
        let constant = if read_only {
            initializer.constant.clone()
        } else {
            None
        };
        let variable = self.declare_variable(name, var_ty, read_only, constant);
        BoundStmt {
            kind: BoundStmtKind::VariableDeclaration {
                variable,
                initializer,
            },
            loc,
        }
    }

    /// The expression a declaration without an initializer evaluates to.
    fn default_value_expression(&mut self, ty: Ty, loc: Location) -> BoundExpr {
        if let Some(value) = ty.default_value() {
            return BoundExpr::typed_literal(value, ty, loc);
        }
        if let Ty::Class(class_id) = ty {
            let ctor = self.symbols.class(class_id).ctor();
            let zero_ctor = self
                .symbols
                .function(ctor)
                .overload_for
                .expect("the parameterized constructor chains to the zero-arg one");
            return BoundExpr {
                kind: BoundExprKind::Call {
                    function: zero_ctor,
                    instance: None,
                    args: Vec::new(),
                },
                ty,
                constant: None,
                loc,
            };
        }
        BoundExpr::error(loc)
    }

    fn bind_return(&mut self, value: Option<&Expr>, loc: Location) -> BoundStmt {
        let return_ty = match self.function {
            Some(id) => self.symbols.function(id).return_ty,
            None => Ty::Void,
        };
        let value = match value {
            Some(expr) => {
                let bound = self.bind_value_expression(expr);
                if return_ty == Ty::Void {
                    self.diagnostics
                        .report(bound.loc.clone(), DiagnosticKind::InvalidReturnExpression);
                    Some(bound)
                } else {
                    Some(self.bind_conversion(bound, return_ty, false))
                }
            }
            None => {
                if return_ty != Ty::Void {
                    self.diagnostics
                        .report(loc.clone(), DiagnosticKind::MissingReturnExpression);
                }
                None
            }
        };
        BoundStmt {
            kind: BoundStmtKind::Return(value),
            loc,
        }
    }

    fn bind_condition(&mut self, condition: &Expr) -> BoundExpr {
        let bound = self.bind_value_expression(condition);
        self.bind_conversion(bound, Ty::Bool, false)
    }

    fn bind_loop_body(
        &mut self,
        body: &Stmt,
        break_label: &Label,
        continue_label: &Label,
    ) -> BoundStmt {
        self.loop_stack
            .push((break_label.clone(), continue_label.clone()));
        let bound = self.bind_statement(body);
        self.loop_stack.pop();
        bound
    }

    fn loop_labels(&mut self) -> (Label, Label) {
        self.label_counter += 1;
        let n = self.label_counter;
        (
            Label::new(format!("break{n}")),
            Label::new(format!("continue{n}")),
        )
    }

    fn declare_variable(
        &mut self,
        name: &Ident,
        ty: Ty,
        read_only: bool,
        constant: Option<Value>,
    ) -> Rc<VariableSymbol> {
        let kind = if self.function.is_none() {
            VariableKind::Global
        } else {
            VariableKind::Local
        };
        let variable = Rc::new(VariableSymbol {
            name: name.name,
            ty,
            read_only,
            constant,
            kind,
        });
        if !self.is_missing(name) {
            if self
                .scope
                .try_declare(name.name, Symbol::Variable(Rc::clone(&variable)))
            {
                if kind == VariableKind::Global {
                    self.globals.push(Rc::clone(&variable));
                }
            } else {
                let text = self.name_str(name.name);
                let location = self.loc(name.span);
                self.diagnostics
                    .report(location, DiagnosticKind::SymbolAlreadyDeclared(text));
            }
        }
        variable
    }

    // ------------------------------------------------------------------
    // Expressions

    /// Binds an expression which must produce a value.
    fn bind_value_expression(&mut self, expr: &Expr) -> BoundExpr {
        let bound = self.bind_expression(expr);
        if bound.ty == Ty::Void {
            self.diagnostics
                .report(bound.loc.clone(), DiagnosticKind::ExpressionMustHaveValue);
            return BoundExpr::error(bound.loc);
        }
        bound
    }

    fn bind_expression(&mut self, expr: &Expr) -> BoundExpr {
        let loc = self.loc(expr.span);
        match &expr.kind {
            ExprKind::Literal(value) => BoundExpr::literal(value.clone(), loc),
            ExprKind::Paren(inner) => self.bind_expression(inner),
            ExprKind::Name(ident) => self.bind_name_expression(ident, loc),
            ExprKind::This => match &self.this_var {
                Some(this) => BoundExpr::variable(Rc::clone(this), loc),
                None => {
                    self.diagnostics
                        .report(loc.clone(), DiagnosticKind::CannotUseThisOutsideOfReceiver);
                    BoundExpr::error(loc)
                }
            },
            ExprKind::Unary {
                op,
                op_span,
                operand,
            } => {
                let operand = self.bind_value_expression(operand);
                if operand.ty.is_error() {
                    return BoundExpr::error(loc);
                }
                let Some(bound_op) = BoundUnaryOp::bind(*op, operand.ty) else {
                    let op_text = self.source.slice(*op_span).into();
                    let operand_name = self.type_name(operand.ty);
                    self.diagnostics.report(
                        loc.clone(),
                        DiagnosticKind::UndefinedUnaryOperator {
                            op: op_text,
                            operand: operand_name,
                        },
                    );
                    return BoundExpr::error(loc);
                };
                let constant = bound::fold_unary(&bound_op, &operand);
                BoundExpr {
                    kind: BoundExprKind::Unary {
                        op: bound_op,
                        operand: Box::new(operand),
                    },
                    ty: bound_op.ty,
                    constant,
                    loc,
                }
            }
            ExprKind::Binary {
                op,
                op_span,
                lhs,
                rhs,
            } => self.bind_binary_expression(*op, *op_span, lhs, rhs, loc),
            ExprKind::Assignment {
                op,
                op_span,
                target,
                value,
            } => self.bind_assignment(*op, *op_span, target, value, loc),
            ExprKind::Call { callee, args } => self.bind_call(callee, args, loc),
            ExprKind::Member { object, name } => self.bind_field_access(object, name, loc),
        }
    }

    fn bind_name_expression(&mut self, ident: &Ident, loc: Location) -> BoundExpr {
        // A missing identifier token was already reported by the parser.
        if self.is_missing(ident) {
            return BoundExpr::error(loc);
        }
        match self.scope.try_lookup(ident.name) {
            Some(Symbol::Variable(variable)) => {
                BoundExpr::variable(Rc::clone(variable), loc)
            }
            Some(_) => {
                let name = self.name_str(ident.name);
                self.diagnostics
                    .report(loc.clone(), DiagnosticKind::NotAVariable(name));
                BoundExpr::error(loc)
            }
            None => {
                let name = self.name_str(ident.name);
                self.diagnostics
                    .report(loc.clone(), DiagnosticKind::UndefinedVariable(name));
                BoundExpr::error(loc)
            }
        }
    }

    fn bind_binary_expression(
        &mut self,
        op: ast::BinaryOp,
        op_span: Span,
        lhs: &Expr,
        rhs: &Expr,
        loc: Location,
    ) -> BoundExpr {
        let lhs = self.bind_value_expression(lhs);
        let rhs = self.bind_value_expression(rhs);
        if lhs.ty.is_error() || rhs.ty.is_error() {
            return BoundExpr::error(loc);
        }

        // Implicit promotion: when exactly one side widens implicitly into
        // the other, widen the narrower side.
        let (lhs, rhs) = if lhs.ty != rhs.ty {
            let to_right = Conversion::classify(lhs.ty, rhs.ty);
            let to_left = Conversion::classify(rhs.ty, lhs.ty);
            match (to_right.is_implicit(), to_left.is_implicit()) {
                (true, false) => {
                    let ty = rhs.ty;
                    (self.wrap_conversion(lhs, ty), rhs)
                }
                (false, true) => {
                    let ty = lhs.ty;
                    (lhs, self.wrap_conversion(rhs, ty))
                }
                _ => (lhs, rhs),
            }
        } else {
            (lhs, rhs)
        };

        if op == ast::BinaryOp::Div && rhs.constant.as_ref().is_some_and(Value::is_zero) {
            self.diagnostics
                .report(loc.clone(), DiagnosticKind::DivideByZero);
            return BoundExpr::error(loc);
        }

        let Some(bound_op) = BoundBinaryOp::bind(op, lhs.ty, rhs.ty) else {
            let op_text = self.source.slice(op_span).into();
            let lhs_name = self.type_name(lhs.ty);
            let rhs_name = self.type_name(rhs.ty);
            self.diagnostics.report(
                loc.clone(),
                DiagnosticKind::UndefinedBinaryOperator {
                    op: op_text,
                    lhs: lhs_name,
                    rhs: rhs_name,
                },
            );
            return BoundExpr::error(loc);
        };
        let constant = bound::fold_binary(&bound_op, &lhs, &rhs);
        BoundExpr {
            kind: BoundExprKind::Binary {
                op: bound_op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty: bound_op.ty,
            constant,
            loc,
        }
    }

    fn bind_assignment(
        &mut self,
        op: Option<ast::BinaryOp>,
        op_span: Span,
        target: &Expr,
        value: &Expr,
        loc: Location,
    ) -> BoundExpr {
        match &target.kind {
            ExprKind::Name(ident) => {
                if self.is_missing(ident) {
                    return BoundExpr::error(loc);
                }
                let variable = match self.scope.try_lookup(ident.name) {
                    Some(Symbol::Variable(variable)) => Rc::clone(variable),
                    Some(_) => {
                        let name = self.name_str(ident.name);
                        self.diagnostics
                            .report(self.loc(ident.span), DiagnosticKind::NotAVariable(name));
                        return BoundExpr::error(loc);
                    }
                    None => {
                        let name = self.name_str(ident.name);
                        self.diagnostics
                            .report(self.loc(ident.span), DiagnosticKind::UndefinedVariable(name));
                        return BoundExpr::error(loc);
                    }
                };
                if variable.read_only {
                    let name = self.name_str(variable.name);
                    self.diagnostics
                        .report(self.loc(op_span), DiagnosticKind::CannotAssign(name));
                }
                let bound_value = self.bind_value_expression(value);
                let bound_value = self.bind_conversion(bound_value, variable.ty, false);
                let ty = variable.ty;
                match self.bind_assignment_operator(op, op_span, ty) {
                    AssignmentOp::Plain => BoundExpr {
                        kind: BoundExprKind::Assignment {
                            variable,
                            value: Box::new(bound_value),
                        },
                        ty,
                        constant: None,
                        loc,
                    },
                    AssignmentOp::Compound(bound_op) => BoundExpr {
                        kind: BoundExprKind::CompoundAssignment {
                            variable,
                            op: bound_op,
                            value: Box::new(bound_value),
                        },
                        ty,
                        constant: None,
                        loc,
                    },
                    AssignmentOp::Invalid => BoundExpr::error(loc),
                }
            }
            ExprKind::Member { object, name } => {
                let Some((instance, class_id, field_index)) = self.bind_field_ref(object, name)
                else {
                    return BoundExpr::error(loc);
                };
                let field = &self.symbols.class(class_id).fields[field_index];
                let field_ty = field.ty;
                if field.read_only {
                    let text = self.name_str(field.name);
                    self.diagnostics
                        .report(self.loc(op_span), DiagnosticKind::CannotAssign(text));
                }
                let bound_value = self.bind_value_expression(value);
                let bound_value = self.bind_conversion(bound_value, field_ty, false);
                match self.bind_assignment_operator(op, op_span, field_ty) {
                    AssignmentOp::Plain => BoundExpr {
                        kind: BoundExprKind::FieldAssignment {
                            instance: Box::new(instance),
                            class: class_id,
                            field: field_index,
                            value: Box::new(bound_value),
                        },
                        ty: field_ty,
                        constant: None,
                        loc,
                    },
                    AssignmentOp::Compound(bound_op) => BoundExpr {
                        kind: BoundExprKind::CompoundFieldAssignment {
                            instance: Box::new(instance),
                            class: class_id,
                            field: field_index,
                            op: bound_op,
                            value: Box::new(bound_value),
                        },
                        ty: field_ty,
                        constant: None,
                        loc,
                    },
                    AssignmentOp::Invalid => BoundExpr::error(loc),
                }
            }
            _ => {
                let text = self.source.slice(target.span).into();
                self.diagnostics
                    .report(self.loc(op_span), DiagnosticKind::CannotAssign(text));
                // Still bind the value for its diagnostics.
                let _ = self.bind_value_expression(value);
                BoundExpr::error(loc)
            }
        }
    }

    /// Resolves the operator of a compound assignment against the target
    /// type. Plain assignments have no operator.
    fn bind_assignment_operator(
        &mut self,
        op: Option<ast::BinaryOp>,
        op_span: Span,
        target_ty: Ty,
    ) -> AssignmentOp {
        let Some(op) = op else {
            return AssignmentOp::Plain;
        };
        if target_ty.is_error() {
            return AssignmentOp::Invalid;
        }
        match BoundBinaryOp::bind(op, target_ty, target_ty) {
            Some(bound_op) => AssignmentOp::Compound(bound_op),
            None => {
                let op_text = self.source.slice(op_span).into();
                let name = self.type_name(target_ty);
                self.diagnostics.report(
                    self.loc(op_span),
                    DiagnosticKind::UndefinedBinaryOperator {
                        op: op_text,
                        lhs: name.clone(),
                        rhs: name,
                    },
                );
                AssignmentOp::Invalid
            }
        }
    }

    fn bind_call(&mut self, callee: &Expr, args: &ast::SeparatedList<Expr>, loc: Location) -> BoundExpr {
        // A single-argument call on a primitive type name is an explicit
        // conversion.
        if let ExprKind::Name(ident) = &callee.kind {
            let name = self.interner.resolve(ident.name);
            if let Some(ty) = Ty::from_primitive_name(name) {
                if args.len() == 1 {
                    let arg = self.bind_value_expression(&args.items[0]);
                    return self.bind_conversion(arg, ty, true);
                }
            }
        }

        let (fn_id, instance) = match &callee.kind {
            ExprKind::Name(ident) => {
                if self.is_missing(ident) {
                    let _ = self.bind_call_args(args);
                    return BoundExpr::error(loc);
                }
                match self.scope.try_lookup(ident.name) {
                    Some(Symbol::Function(id)) => (*id, None),
                    Some(Symbol::Class(class_id)) => {
                        (self.symbols.class(*class_id).ctor(), None)
                    }
                    Some(Symbol::Variable(_)) => {
                        let name = self.name_str(ident.name);
                        self.diagnostics
                            .report(loc.clone(), DiagnosticKind::NotAFunction(name));
                        let _ = self.bind_call_args(args);
                        return BoundExpr::error(loc);
                    }
                    None => {
                        let name = self.name_str(ident.name);
                        self.diagnostics
                            .report(loc.clone(), DiagnosticKind::UndefinedFunction(name));
                        let _ = self.bind_call_args(args);
                        return BoundExpr::error(loc);
                    }
                }
            }
            ExprKind::Member { object, name } => {
                let instance = self.bind_expression(object);
                if instance.ty.is_error() {
                    let _ = self.bind_call_args(args);
                    return BoundExpr::error(loc);
                }
                let Ty::Class(class_id) = instance.ty else {
                    let text = self.type_name(instance.ty);
                    self.diagnostics
                        .report(instance.loc.clone(), DiagnosticKind::NotAClass(text));
                    let _ = self.bind_call_args(args);
                    return BoundExpr::error(loc);
                };
                let method = self
                    .symbols
                    .class(class_id)
                    .methods
                    .iter()
                    .copied()
                    .find(|&id| self.symbols.function(id).name == name.name);
                match method {
                    Some(id) => (id, Some(instance)),
                    None => {
                        let text = self.name_str(name.name);
                        self.diagnostics
                            .report(self.loc(name.span), DiagnosticKind::UndefinedFunction(text));
                        let _ = self.bind_call_args(args);
                        return BoundExpr::error(loc);
                    }
                }
            }
            _ => {
                let text = self.source.slice(callee.span).into();
                self.diagnostics
                    .report(loc.clone(), DiagnosticKind::NotAFunction(text));
                let _ = self.bind_call_args(args);
                return BoundExpr::error(loc);
            }
        };

        let bound_args = self.bind_call_args(args);

        // Overload resolution: without a chain the arity must match
        // exactly; with one, the first candidate whose arity matches and
        // whose parameters all admit the arguments implicitly wins.
        let function = self.symbols.function(fn_id);
        let selected = if function.overload_for.is_none() {
            if function.params.len() != bound_args.len() {
                self.diagnostics.report(
                    loc.clone(),
                    DiagnosticKind::ArgumentCountMismatch {
                        expected: function.params.len(),
                        got: bound_args.len(),
                    },
                );
                return BoundExpr::error(loc);
            }
            fn_id
        } else {
            let mut candidate = Some(fn_id);
            let selected = loop {
                let Some(id) = candidate else {
                    break None;
                };
                let function = self.symbols.function(id);
                let matches = function.params.len() == bound_args.len()
                    && function
                        .params
                        .iter()
                        .zip(&bound_args)
                        .all(|(param, arg)| {
                            Conversion::classify(arg.ty, param.ty).is_implicit()
                        });
                if matches {
                    break Some(id);
                }
                candidate = function.overload_for;
            };
            match selected {
                Some(id) => id,
                None => {
                    let name = self.name_str(self.symbols.function(fn_id).name);
                    self.diagnostics
                        .report(loc.clone(), DiagnosticKind::UndefinedFunction(name));
                    return BoundExpr::error(loc);
                }
            }
        };

        let function = self.symbols.function(selected);
        let params: Vec<Ty> = function.params.iter().map(|p| p.ty).collect();
        let ty = if function.is_constructor {
            Ty::Class(
                function
                    .receiver
                    .expect("constructors always have a receiver class"),
            )
        } else {
            function.return_ty
        };
        let args = bound_args
            .into_iter()
            .zip(params)
            .map(|(arg, param_ty)| self.bind_conversion(arg, param_ty, false))
            .collect();

        BoundExpr {
            kind: BoundExprKind::Call {
                function: selected,
                instance: instance.map(Box::new),
                args,
            },
            ty,
            constant: None,
            loc,
        }
    }

    fn bind_call_args(&mut self, args: &ast::SeparatedList<Expr>) -> Vec<BoundExpr> {
        args.iter()
            .map(|arg| self.bind_value_expression(arg))
            .collect()
    }

    /// Binds `object.name` where `name` must resolve to a field. Returns
    /// the bound instance expression together with the field coordinates.
    fn bind_field_ref(
        &mut self,
        object: &Expr,
        name: &Ident,
    ) -> Option<(BoundExpr, ClassId, usize)> {
        let instance = self.bind_expression(object);
        if instance.ty.is_error() {
            return None;
        }
        let Ty::Class(class_id) = instance.ty else {
            let text = self.type_name(instance.ty);
            self.diagnostics
                .report(instance.loc.clone(), DiagnosticKind::NotAClass(text));
            return None;
        };
        if self.is_missing(name) {
            return None;
        }
        match self.symbols.class(class_id).field(name.name) {
            Some((index, _)) => Some((instance, class_id, index)),
            None => {
                let class = self.name_str(self.symbols.class(class_id).name);
                let field = self.name_str(name.name);
                self.diagnostics.report(
                    self.loc(name.span),
                    DiagnosticKind::UndefinedClassField { class, field },
                );
                None
            }
        }
    }

    fn bind_field_access(&mut self, object: &Expr, name: &Ident, loc: Location) -> BoundExpr {
        let Some((instance, class_id, field_index)) = self.bind_field_ref(object, name) else {
            return BoundExpr::error(loc);
        };
        let ty = self.symbols.class(class_id).fields[field_index].ty;
        BoundExpr {
            kind: BoundExprKind::FieldAccess {
                instance: Box::new(instance),
                class: class_id,
                field: field_index,
            },
            ty,
            constant: None,
            loc,
        }
    }

    // ------------------------------------------------------------------
    // Conversions and types

    /// Converts a declaration initializer to the declared type. Numeric
    /// literals are retyped to the declared type silently, even when that
    /// narrows; everything else follows the normal implicit rules.
    fn bind_initializer_conversion(&mut self, expr: BoundExpr, to: Ty) -> BoundExpr {
        let adjust_literal = matches!(expr.kind, BoundExprKind::Literal)
            && to.is_numeric()
            && expr
                .constant
                .as_ref()
                .is_some_and(|value| value.ty().is_numeric());
        self.bind_conversion(expr, to, adjust_literal)
    }

    /// Applies the conversion lattice to coerce `expr` into `to`.
    /// Implicit conversions are silent; explicit ones require
    /// `allow_explicit` (a cast-style call); anything else diagnoses.
    fn bind_conversion(&mut self, expr: BoundExpr, to: Ty, allow_explicit: bool) -> BoundExpr {
        match Conversion::classify(expr.ty, to) {
            Conversion::Identity => expr,
            Conversion::Implicit => self.wrap_conversion(expr, to),
            Conversion::Explicit if allow_explicit => self.wrap_conversion(expr, to),
            Conversion::Explicit => {
                let from = self.type_name(expr.ty);
                let to_name = self.type_name(to);
                self.diagnostics.report(
                    expr.loc.clone(),
                    DiagnosticKind::CannotConvertImplicitly {
                        from,
                        to: to_name,
                    },
                );
                BoundExpr::error(expr.loc)
            }
            Conversion::None => {
                let from = self.type_name(expr.ty);
                let to_name = self.type_name(to);
                self.diagnostics.report(
                    expr.loc.clone(),
                    DiagnosticKind::CannotConvert {
                        from,
                        to: to_name,
                    },
                );
                BoundExpr::error(expr.loc)
            }
        }
    }

    fn wrap_conversion(&mut self, expr: BoundExpr, to: Ty) -> BoundExpr {
        let constant = expr
            .constant
            .as_ref()
            .and_then(|value| bound::fold_conversion(to, value));
        let loc = expr.loc.clone();
        BoundExpr {
            kind: BoundExprKind::Conversion {
                expr: Box::new(expr),
            },
            ty: to,
            constant,
            loc,
        }
    }

    fn bind_type(&mut self, name: &Ident) -> Ty {
        if self.is_missing(name) {
            return Ty::Error;
        }
        if let Some(ty) = Ty::from_primitive_name(self.interner.resolve(name.name)) {
            return ty;
        }
        match self.scope.try_lookup(name.name) {
            Some(Symbol::Class(id)) => Ty::Class(*id),
            _ => {
                let text = self.name_str(name.name);
                let location = self.loc(name.span);
                self.diagnostics
                    .report(location, DiagnosticKind::UndefinedType(text));
                Ty::Error
            }
        }
    }
}

enum AssignmentOp {
    Plain,
    Compound(BoundBinaryOp),
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn check(source: &str) -> (BoundProgram, Vec<String>, Interner) {
        let mut interner = Interner::with_capacity(128);
        let tree = SyntaxTree::parse(SourceText::new(source), &mut interner);
        assert!(
            tree.diagnostics.is_empty(),
            "unexpected syntax errors: {:?}",
            tree.diagnostics
        );
        let global = Rc::new(bind_global_scope(
            None,
            std::slice::from_ref(&tree),
            &mut interner,
        ));
        let program = bind_program(None, &global, std::slice::from_ref(&tree), &mut interner);
        let diagnostics = program
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .collect();
        (program, diagnostics, interner)
    }

    fn first_initializer(program: &BoundProgram) -> &BoundExpr {
        match &program.global_scope.statements[0].kind {
            BoundStmtKind::VariableDeclaration { initializer, .. } => initializer,
            other => panic!("expected a variable declaration, got {other:?}"),
        }
    }

    #[test]
    fn binary_promotion_widens_the_narrower_side() {
        let (program, diagnostics, _) = check("var x = 1 + int64(2)");
        assert_eq!(diagnostics, Vec::<String>::new());
        let initializer = first_initializer(&program);
        assert_eq!(initializer.ty, Ty::I64);
        assert_eq!(initializer.constant, Some(Value::I64(3)));
    }

    #[test]
    fn void_expressions_cannot_be_used_as_values() {
        let (_, diagnostics, _) = check("var x = writeLine(1)");
        assert_eq!(diagnostics, ["expression must have a value"]);
    }

    #[test]
    fn this_outside_an_instance_method() {
        let (_, diagnostics, _) = check("function f() { this }");
        assert_eq!(
            diagnostics,
            ["this can only be used inside an instance method"]
        );
    }

    #[test]
    fn calling_a_variable_is_not_a_function() {
        let (_, diagnostics, _) = check("var x = 1\nx(2)");
        assert_eq!(diagnostics, ["x is not a function"]);
    }

    #[test]
    fn unknown_type_clause() {
        let (_, diagnostics, _) = check("var x: zorp = 1");
        assert_eq!(diagnostics, ["type zorp is not defined"]);
    }

    #[test]
    fn unknown_class_field() {
        let source = "class P { x: int32; }\nfunction f(p: P): int32 { return p.y }";
        let (_, diagnostics, _) = check(source);
        assert_eq!(diagnostics, ["class P has no field y"]);
    }

    #[test]
    fn arity_is_exact_without_overloads() {
        let (_, diagnostics, _) = check("function f(a: int32) { }\nf()");
        assert_eq!(diagnostics, ["expected 1 arguments, but got 0"]);
    }

    #[test]
    fn undefined_operators_name_their_operand_types() {
        let (_, diagnostics, _) = check("var x = true + false");
        assert_eq!(
            diagnostics,
            ["binary operator + is not defined for types bool and bool"]
        );

        let (_, diagnostics, _) = check("var x = !1");
        assert_eq!(
            diagnostics,
            ["unary operator ! is not defined for type int32"]
        );
    }

    #[test]
    fn duplicate_declarations_collide_within_one_scope() {
        let (_, diagnostics, _) = check("var x = 1\nvar x = 2");
        assert_eq!(diagnostics, ["x is already declared"]);

        // Shadowing in a nested scope is allowed.
        let (_, diagnostics, _) = check("var x = 1\nfunction f() { var x = 2 }");
        assert_eq!(diagnostics, Vec::<String>::new());
    }

    #[test]
    fn duplicate_parameters_are_reported() {
        let (_, diagnostics, _) = check("function f(a: int32, a: int32) { }");
        assert_eq!(diagnostics, ["a parameter named a is already declared"]);
    }

    #[test]
    fn constants_are_recorded_on_const_declarations() {
        let (program, diagnostics, _) = check("const k = 1 + 2");
        assert_eq!(diagnostics, Vec::<String>::new());
        let BoundStmtKind::VariableDeclaration { variable, .. } =
            &program.global_scope.statements[0].kind
        else {
            panic!("expected a variable declaration");
        };
        assert!(variable.read_only);
        assert_eq!(variable.constant, Some(Value::I32(3)));
    }

    #[test]
    fn variable_reads_do_not_propagate_constants() {
        let (program, diagnostics, _) = check("const k = 2\nvar x = k * 3");
        assert_eq!(diagnostics, Vec::<String>::new());
        let BoundStmtKind::VariableDeclaration { initializer, .. } =
            &program.global_scope.statements[1].kind
        else {
            panic!("expected a variable declaration");
        };
        // Folding stops at named variables.
        assert_eq!(initializer.constant, None);
    }

    #[test]
    fn default_values_are_synthesized_without_initializers() {
        let (program, diagnostics, _) = check("var x: int32\nvar s: string");
        assert_eq!(diagnostics, Vec::<String>::new());
        let first = first_initializer(&program);
        assert_eq!(first.constant, Some(Value::I32(0)));
        assert_eq!(first.ty, Ty::I32);
    }

    #[test]
    fn return_type_mismatches() {
        let (_, diagnostics, _) = check("function f() { return 1 }");
        assert_eq!(diagnostics, ["a void function cannot return a value"]);

        let (_, diagnostics, _) = check("function f(): int32 { return }");
        assert_eq!(diagnostics, ["an expression of the return type is expected"]);
    }

    #[test]
    fn invalid_expression_statements() {
        let (_, diagnostics, _) = check("1 + 2");
        assert_eq!(
            diagnostics,
            ["only assignment and call expressions can be used as a statement"]
        );
    }
}
