//! Abstract syntax for the morloc middle end
//!
//! The surface parser is an external collaborator; it delivers each module
//! as a `Module` whose body is a list of indexed expressions (`ExprI`).
//! Every node carries a globally unique integer index used as the key into
//! the term-type table.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Names
// ============================================================================

/// A module name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MVar(String);

impl MVar {
    pub fn new(name: impl Into<String>) -> Self {
        MVar(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An expression-level variable name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EVar(String);

impl EVar {
    pub fn new(name: impl Into<String>) -> Self {
        EVar(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A backend language tag (e.g. "py", "R")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lang(String);

impl Lang {
    pub fn new(name: impl Into<String>) -> Self {
        Lang(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A type-level name, optionally tagged with the language it belongs to.
/// General types carry no tag; concrete realization types are tagged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TVar {
    pub lang: Option<Lang>,
    pub name: String,
}

impl TVar {
    /// A general (untagged) type name
    pub fn gen(name: impl Into<String>) -> Self {
        TVar {
            lang: None,
            name: name.into(),
        }
    }

    /// A language-tagged type name
    pub fn conc(lang: Lang, name: impl Into<String>) -> Self {
        TVar {
            lang: Some(lang),
            name: name.into(),
        }
    }
}

impl fmt::Display for TVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lang {
            Some(lang) => write!(f, "{}@{}", self.name, lang),
            None => write!(f, "{}", self.name),
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// The type representation shared by general signatures and concrete
/// realizations
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Type variable or nullary named type
    Var(TVar),

    /// Universal quantification: forall a . t
    Forall(TVar, Box<Type>),

    /// Unsolved existential with its default instantiations; the first
    /// default wins when the existential survives desugaring
    Exists(TVar, Vec<Type>),

    /// Function type: a -> b
    Arrow(Box<Type>, Box<Type>),

    /// Applied parameterised type: Map a b
    App(TVar, Vec<Type>),

    /// Named record type
    Record {
        tag: String,
        name: TVar,
        params: Vec<Type>,
        fields: Vec<(String, Type)>,
    },
}

impl Type {
    pub fn var(name: impl Into<String>) -> Type {
        Type::Var(TVar::gen(name))
    }

    pub fn arrow(from: Type, to: Type) -> Type {
        Type::Arrow(Box::new(from), Box::new(to))
    }

    /// Build a multi-argument function type: a -> b -> c -> r
    pub fn arrows(args: Vec<Type>, ret: Type) -> Type {
        args.into_iter()
            .rev()
            .fold(ret, |acc, arg| Type::arrow(arg, acc))
    }

    /// Strip leading quantifiers
    pub fn unqualified(&self) -> &Type {
        match self {
            Type::Forall(_, body) => body.unqualified(),
            t => t,
        }
    }

    /// The number of arguments the type accepts
    pub fn arity(&self) -> usize {
        match self.unqualified() {
            Type::Arrow(_, ret) => 1 + ret.arity(),
            _ => 0,
        }
    }

    /// The argument types, outermost first
    pub fn args(&self) -> Vec<&Type> {
        let mut out = Vec::new();
        let mut t = self.unqualified();
        while let Type::Arrow(a, r) = t {
            out.push(a.as_ref());
            t = r.unqualified();
        }
        out
    }

    /// The final return type
    pub fn ret(&self) -> &Type {
        let mut t = self.unqualified();
        while let Type::Arrow(_, r) = t {
            t = r.unqualified();
        }
        t
    }

    /// Whether the given type-level name occurs anywhere in this type.
    /// Used for the self-recursive alias check.
    pub fn mentions(&self, name: &str) -> bool {
        match self {
            Type::Var(v) => v.name == name,
            Type::Forall(v, body) => v.name == name || body.mentions(name),
            Type::Exists(v, defaults) => {
                v.name == name || defaults.iter().any(|t| t.mentions(name))
            }
            Type::Arrow(a, b) => a.mentions(name) || b.mentions(name),
            Type::App(v, args) => v.name == name || args.iter().any(|t| t.mentions(name)),
            Type::Record {
                name: v,
                params,
                fields,
                ..
            } => {
                v.name == name
                    || params.iter().any(|t| t.mentions(name))
                    || fields.iter().any(|(_, t)| t.mentions(name))
            }
        }
    }

    /// Substitute every occurrence of the variable `name` with `replacement`.
    /// Quantifiers binding the same name shadow the substitution.
    pub fn substitute(&self, name: &str, replacement: &Type) -> Type {
        match self {
            Type::Var(v) if v.name == name => replacement.clone(),
            Type::Var(_) => self.clone(),
            Type::Forall(v, body) => {
                if v.name == name {
                    self.clone()
                } else {
                    Type::Forall(v.clone(), Box::new(body.substitute(name, replacement)))
                }
            }
            Type::Exists(v, defaults) => Type::Exists(
                v.clone(),
                defaults
                    .iter()
                    .map(|t| t.substitute(name, replacement))
                    .collect(),
            ),
            Type::Arrow(a, b) => Type::arrow(
                a.substitute(name, replacement),
                b.substitute(name, replacement),
            ),
            Type::App(v, args) => Type::App(
                v.clone(),
                args.iter()
                    .map(|t| t.substitute(name, replacement))
                    .collect(),
            ),
            Type::Record {
                tag,
                name: rname,
                params,
                fields,
            } => Type::Record {
                tag: tag.clone(),
                name: rname.clone(),
                params: params
                    .iter()
                    .map(|t| t.substitute(name, replacement))
                    .collect(),
                fields: fields
                    .iter()
                    .map(|(k, t)| (k.clone(), t.substitute(name, replacement)))
                    .collect(),
            },
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Var(v) => write!(f, "{}", v),
            Type::Forall(v, body) => write!(f, "forall {} . {}", v, body),
            Type::Exists(v, _) => write!(f, "{}?", v),
            Type::Arrow(a, b) => {
                if matches!(a.as_ref(), Type::Arrow(_, _)) {
                    write!(f, "({}) -> {}", a, b)
                } else {
                    write!(f, "{} -> {}", a, b)
                }
            }
            Type::App(v, args) => {
                write!(f, "{}", v)?;
                for arg in args {
                    match arg {
                        Type::Arrow(_, _) | Type::App(_, _) => write!(f, " ({})", arg)?,
                        _ => write!(f, " {}", arg)?,
                    }
                }
                Ok(())
            }
            Type::Record { name, fields, .. } => {
                write!(f, "{} {{", name)?;
                for (i, (k, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} :: {}", k, t)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ============================================================================
// Annotated types
// ============================================================================

/// Properties attached to a signature. The middle end interprets `Pack` and
/// `Unpack` (serialization planner input).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Property {
    Pack,
    Unpack,
}

/// A type together with its signature properties
#[derive(Debug, Clone, PartialEq)]
pub struct EType {
    pub ty: Type,
    pub props: BTreeSet<Property>,
}

impl EType {
    pub fn new(ty: Type) -> Self {
        EType {
            ty,
            props: BTreeSet::new(),
        }
    }

    pub fn with_prop(mut self, prop: Property) -> Self {
        self.props.insert(prop);
        self
    }

    pub fn is_packer(&self) -> bool {
        self.props.contains(&Property::Pack)
    }

    pub fn is_unpacker(&self) -> bool {
        self.props.contains(&Property::Unpack)
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Literal data that crosses into generated code without serialization
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Num(f64),
    Str(String),
    Bool(bool),
    Unit,
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Record(Vec<(String, Literal)>),
}

/// One name imported from a module, with its optional local alias:
/// `from A import (foo as bar)` carries `ImportItem { name: foo, alias: Some(bar) }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportItem {
    pub name: EVar,
    pub alias: Option<EVar>,
}

impl ImportItem {
    pub fn plain(name: impl Into<String>) -> Self {
        ImportItem {
            name: EVar::new(name),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        ImportItem {
            name: EVar::new(name),
            alias: Some(EVar::new(alias)),
        }
    }

    /// The name the importer sees
    pub fn local(&self) -> &EVar {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

/// An import declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: MVar,
    /// `None` imports the full export surface of the target
    pub include: Option<Vec<ImportItem>>,
    pub exclude: Vec<EVar>,
    /// Module alias: `import A as B` qualifies imported names as `B.x`
    pub alias: Option<MVar>,
}

impl Import {
    pub fn all(module: impl Into<String>) -> Self {
        Import {
            module: MVar::new(module),
            include: None,
            exclude: Vec::new(),
            alias: None,
        }
    }

    pub fn only(module: impl Into<String>, items: Vec<ImportItem>) -> Self {
        Import {
            module: MVar::new(module),
            include: Some(items),
            exclude: Vec::new(),
            alias: None,
        }
    }
}

/// A source declaration: functions pulled in from a backend-language file
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub lang: Lang,
    pub path: Option<PathBuf>,
    /// (name in the source file, local alias)
    pub names: Vec<(String, EVar)>,
}

/// An indexed expression node. The index is globally unique and keys the
/// term-type table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprI {
    pub idx: u32,
    pub expr: Expr,
}

impl ExprI {
    pub fn new(idx: u32, expr: Expr) -> Self {
        ExprI { idx, expr }
    }
}

/// Expression forms delivered by the parser
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Import(Import),
    Export(EVar),
    Source(Source),

    /// Value declaration `v = e` with optional where-bindings
    Declaration {
        name: EVar,
        rhs: Box<ExprI>,
        wheres: Vec<ExprI>,
    },

    /// Signature `v :: t`; `lang: None` is the general type, `Some` a
    /// concrete realization type
    Signature {
        name: EVar,
        lang: Option<Lang>,
        etype: EType,
    },

    /// Type alias `type V p... = t`
    TypeAlias {
        name: TVar,
        params: Vec<TVar>,
        body: Type,
    },

    Var(EVar),

    /// Field accessor `e.k`
    Access { object: Box<ExprI>, key: String },

    List(Vec<ExprI>),
    Tuple(Vec<ExprI>),
    Record(Vec<(String, ExprI)>),

    Lambda { params: Vec<EVar>, body: Box<ExprI> },

    App { func: Box<ExprI>, args: Vec<ExprI> },

    /// Type annotation `e :: t`
    Ann { expr: Box<ExprI>, ty: Type },

    Lit(Literal),
}

// ============================================================================
// Modules
// ============================================================================

/// A parsed module as delivered by the external parser
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: MVar,
    pub exports: Vec<EVar>,
    pub imports: Vec<Import>,
    pub body: Vec<ExprI>,
}

impl Module {
    pub fn exports_name(&self, name: &EVar) -> bool {
        self.exports.contains(name)
    }

    /// Reassign every node index from a monotonic counter, pre-order.
    /// Ingestion renumbers unconditionally so indexes are unique across the
    /// whole module set regardless of what the parser assigned.
    pub fn ensure_indexes(&mut self, counter: &mut u32) {
        for e in &mut self.body {
            renumber(e, counter);
        }
    }

    pub fn declarations(&self) -> impl Iterator<Item = &ExprI> {
        self.body
            .iter()
            .filter(|e| matches!(e.expr, Expr::Declaration { .. }))
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.body.iter().filter_map(|e| match &e.expr {
            Expr::Source(s) => Some(s),
            _ => None,
        })
    }

    pub fn type_aliases(&self) -> impl Iterator<Item = (&TVar, &Vec<TVar>, &Type)> {
        self.body.iter().filter_map(|e| match &e.expr {
            Expr::TypeAlias { name, params, body } => Some((name, params, body)),
            _ => None,
        })
    }
}

fn renumber(e: &mut ExprI, counter: &mut u32) {
    e.idx = *counter;
    *counter += 1;
    match &mut e.expr {
        Expr::Declaration { rhs, wheres, .. } => {
            renumber(rhs, counter);
            for w in wheres {
                renumber(w, counter);
            }
        }
        Expr::Access { object, .. } => renumber(object, counter),
        Expr::List(items) | Expr::Tuple(items) => {
            for i in items {
                renumber(i, counter);
            }
        }
        Expr::Record(fields) => {
            for (_, v) in fields {
                renumber(v, counter);
            }
        }
        Expr::Lambda { body, .. } => renumber(body, counter),
        Expr::App { func, args } => {
            renumber(func, counter);
            for a in args {
                renumber(a, counter);
            }
        }
        Expr::Ann { expr, .. } => renumber(expr, counter),
        Expr::Import(_)
        | Expr::Export(_)
        | Expr::Source(_)
        | Expr::Signature { .. }
        | Expr::TypeAlias { .. }
        | Expr::Var(_)
        | Expr::Lit(_) => {}
    }
}

// ============================================================================
// Tests
// ============================================================================
