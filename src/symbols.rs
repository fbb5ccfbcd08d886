use std::{collections::HashMap, mem, rc::Rc};

use crate::{
    diagnostics::Location,
    types::{Ty, Value},
    util::intern::{Interner, Name},
};

/// Handle to a class in the [`Symbols`] arena. Handle equality is symbol
/// identity: a compilation clones its predecessor's arena, so handles stay
/// valid along a `previous` chain.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ClassId(u32);

/// Handle to a function in the [`Symbols`] arena.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct FnId(u32);

/// Arena for class and function symbols. Keeping the cyclic references
/// (class -> method -> receiver class, overload chains) as indices avoids
/// `Rc` cycles and keeps [`Ty`] `Copy`.
///
/// The arena only grows while a global scope is being bound; body binding
/// reads it.
#[derive(Clone, Default)]
pub struct Symbols {
    classes: Vec<ClassSymbol>,
    functions: Vec<FunctionSymbol>,
    builtins: Vec<FnId>,
}

impl Symbols {
    /// Creates an arena populated with the built-in functions.
    pub fn with_builtins(interner: &mut Interner) -> Symbols {
        let mut symbols = Symbols::default();
        for builtin in Builtin::ALL {
            let params = builtin
                .params(interner)
                .into_iter()
                .enumerate()
                .map(|(ordinal, (name, ty))| {
                    Rc::new(VariableSymbol {
                        name,
                        ty,
                        read_only: true,
                        constant: None,
                        kind: VariableKind::Parameter {
                            ordinal: ordinal as u32,
                        },
                    })
                })
                .collect();
            let id = symbols.add_function(FunctionSymbol {
                name: interner.intern(builtin.name()),
                params,
                return_ty: builtin.return_ty(),
                receiver: None,
                overload_for: None,
                is_constructor: false,
                decl: None,
                builtin: Some(*builtin),
            });
            symbols.builtins.push(id);
        }
        symbols
    }

    pub fn add_class(&mut self, class: ClassSymbol) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(class);
        id
    }

    pub fn add_function(&mut self, function: FunctionSymbol) -> FnId {
        let id = FnId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn class(&self, id: ClassId) -> &ClassSymbol {
        &self.classes[id.0 as usize]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassSymbol {
        &mut self.classes[id.0 as usize]
    }

    pub fn function(&self, id: FnId) -> &FunctionSymbol {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FnId) -> &mut FunctionSymbol {
        &mut self.functions[id.0 as usize]
    }

    pub fn builtins(&self) -> &[FnId] {
        &self.builtins
    }

    /// The source-level name of a type, resolving class names through the
    /// arena. Used when formatting diagnostics.
    pub fn type_name(&self, interner: &Interner, ty: Ty) -> Box<str> {
        match ty.primitive_name() {
            Some(name) => name.into(),
            None => match ty {
                Ty::Class(id) => interner.resolve(self.class(id).name).into(),
                _ => unreachable!("primitive types have names"),
            },
        }
    }
}

pub struct ClassSymbol {
    pub name: Name,
    /// Instance fields in declaration order; a field's ordinal is its index.
    pub fields: Vec<FieldSymbol>,
    /// Instance methods installed by receiver-carrying function
    /// declarations.
    pub methods: Vec<FnId>,
    /// The parameterized constructor, head of the constructor overload
    /// chain. Set right after field binding.
    ctor: Option<FnId>,
    pub decl: Option<Location>,
}

impl ClassSymbol {
    pub fn new(name: Name, decl: Option<Location>) -> ClassSymbol {
        ClassSymbol {
            name,
            fields: Vec::new(),
            methods: Vec::new(),
            ctor: None,
            decl,
        }
    }

    pub fn ctor(&self) -> FnId {
        self.ctor
            .expect("constructors are synthesized when the class is declared")
    }

    pub fn set_ctor(&mut self, ctor: FnId) {
        self.ctor = Some(ctor);
    }

    /// Looks a field up by name, returning its ordinal.
    pub fn field(&self, name: Name) -> Option<(usize, &FieldSymbol)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
    }

    /// The writable instance fields, in declaration order. These define the
    /// parameterized constructor's parameter list.
    pub fn ctor_fields(&self) -> impl Iterator<Item = (usize, &FieldSymbol)> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| !field.read_only)
    }
}

impl Clone for ClassSymbol {
    fn clone(&self) -> Self {
        ClassSymbol {
            name: self.name,
            fields: self.fields.clone(),
            methods: self.methods.clone(),
            ctor: self.ctor,
            decl: self.decl.clone(),
        }
    }
}

#[derive(Clone)]
pub struct FieldSymbol {
    pub name: Name,
    pub ty: Ty,
    /// `const` fields are excluded from the constructor parameter list and
    /// reject assignment.
    pub read_only: bool,
}

#[derive(Clone)]
pub struct FunctionSymbol {
    pub name: Name,
    pub params: Vec<Rc<VariableSymbol>>,
    pub return_ty: Ty,
    /// The class this function is an instance method of; `None` for free
    /// functions.
    pub receiver: Option<ClassId>,
    /// Next candidate in the overload chain; chains are singly linked and
    /// terminate at `None`.
    pub overload_for: Option<FnId>,
    pub is_constructor: bool,
    /// Location of the declaring identifier, when user-declared.
    pub decl: Option<Location>,
    pub builtin: Option<Builtin>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Builtin {
    Write,
    WriteLine,
    ReadLine,
    ReadKey,
    ReadAllText,
    WriteAllText,
    Rnd,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::Write,
        Builtin::WriteLine,
        Builtin::ReadLine,
        Builtin::ReadKey,
        Builtin::ReadAllText,
        Builtin::WriteAllText,
        Builtin::Rnd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Write => "write",
            Builtin::WriteLine => "writeLine",
            Builtin::ReadLine => "readLine",
            Builtin::ReadKey => "readKey",
            Builtin::ReadAllText => "readAllText",
            Builtin::WriteAllText => "writeAllText",
            Builtin::Rnd => "rnd",
        }
    }

    fn params(self, interner: &mut Interner) -> Vec<(Name, Ty)> {
        match self {
            Builtin::Write | Builtin::WriteLine => vec![(interner.intern("value"), Ty::Object)],
            Builtin::ReadLine | Builtin::ReadKey => vec![],
            Builtin::ReadAllText => vec![(interner.intern("path"), Ty::String)],
            Builtin::WriteAllText => vec![
                (interner.intern("path"), Ty::String),
                (interner.intern("contents"), Ty::String),
            ],
            // The host-side generator behind rnd is a process-global,
            // lazily constructed random instance.
            Builtin::Rnd => vec![(interner.intern("max"), Ty::I32)],
        }
    }

    fn return_ty(self) -> Ty {
        match self {
            Builtin::Write | Builtin::WriteLine | Builtin::WriteAllText => Ty::Void,
            Builtin::ReadLine | Builtin::ReadAllText => Ty::String,
            Builtin::ReadKey => Ty::Char,
            Builtin::Rnd => Ty::I32,
        }
    }
}

#[derive(Debug)]
pub struct VariableSymbol {
    pub name: Name,
    pub ty: Ty,
    pub read_only: bool,
    /// Folded initializer value of a `const` declaration, when one was
    /// computed.
    pub constant: Option<Value>,
    pub kind: VariableKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VariableKind {
    Global,
    Local,
    Parameter { ordinal: u32 },
}

/// Any symbol a name can resolve to. Variables are shared pointers;
/// variable identity is pointer identity.
#[derive(Clone)]
pub enum Symbol {
    Class(ClassId),
    Function(FnId),
    Variable(Rc<VariableSymbol>),
}

/// One link in the scope chain. Each scope lazily allocates its map on
/// first declaration.
#[derive(Default)]
pub struct BoundScope {
    parent: Option<Box<BoundScope>>,
    symbols: Option<HashMap<Name, Symbol>>,
}

impl BoundScope {
    pub fn root() -> BoundScope {
        BoundScope::default()
    }

    pub fn with_parent(parent: BoundScope) -> BoundScope {
        BoundScope {
            parent: Some(Box::new(parent)),
            symbols: None,
        }
    }

    /// Detaches and returns the parent scope, dropping this one.
    pub fn into_parent(self) -> BoundScope {
        match self.parent {
            Some(parent) => *parent,
            None => BoundScope::root(),
        }
    }

    /// Declares a symbol in this scope. Fails if the name already exists
    /// here; shadowing an outer scope is fine.
    pub fn try_declare(&mut self, name: Name, symbol: Symbol) -> bool {
        let map = self.symbols.get_or_insert_with(HashMap::new);
        if map.contains_key(&name) {
            return false;
        }
        map.insert(name, symbol);
        true
    }

    /// Unconditionally (re)declares a symbol in this scope. Used when a new
    /// overload head replaces the previous chain head under the same name.
    pub fn redeclare(&mut self, name: Name, symbol: Symbol) {
        self.symbols
            .get_or_insert_with(HashMap::new)
            .insert(name, symbol);
    }

    /// Looks a name up in this scope, then through the parents.
    pub fn try_lookup(&self, name: Name) -> Option<&Symbol> {
        let mut scope = self;
        loop {
            if let Some(symbol) = scope.symbols.as_ref().and_then(|map| map.get(&name)) {
                return Some(symbol);
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Looks a name up in this scope only.
    pub fn try_lookup_here(&self, name: Name) -> Option<&Symbol> {
        self.symbols.as_ref()?.get(&name)
    }
}

/// Pushes a fresh scope onto the chain held by `slot`.
pub fn push_scope(slot: &mut BoundScope) {
    let parent = mem::take(slot);
    *slot = BoundScope::with_parent(parent);
}

/// Pops the innermost scope off the chain held by `slot`.
pub fn pop_scope(slot: &mut BoundScope) {
    let scope = mem::take(slot);
    *slot = scope.into_parent();
}
