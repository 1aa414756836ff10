//! Manifold construction
//!
//! Walks the call tree of every exported root declaration and assigns each
//! application a manifold: the unit of code generation carrying its own
//! arguments, bound variables, and realizations. IDs come from a single
//! monotonic counter and are assigned pre-order.

use std::collections::{BTreeSet, HashMap};

use log::debug;
use thiserror::Error;

use crate::ast::{EVar, Expr, ExprI, Lang, Literal, Type};
use crate::dag::ModuleDag;
use crate::error::Diagnostic;
use crate::termtypes::{Realization, TermTable, TermTypes};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("unbound variable '{0}'")]
    UnboundVariable(EVar),
    #[error("lambda expressions are not supported inside applications")]
    UnsupportedNestedLambda,
    #[error("recursive composition '{0}'")]
    RecursiveComposition(EVar),
    #[error("exported name '{0}' has no declaration or source in the root module")]
    MissingExport(EVar),
    #[error("composition '{name}' takes {expected} arguments but was given {got}")]
    CompositionArity {
        name: EVar,
        expected: usize,
        got: usize,
    },
    #[error("unsupported expression in a composition: {0}")]
    UnsupportedShape(String),
}

/// One argument of a manifold
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Reference to a bound variable; arrives serialized
    Name(EVar),
    /// A free term passed through by name (e.g. a function argument to a
    /// higher-order call); resolved to its source name at emission
    Nest(EVar),
    /// Literal data, passed unserialized
    Data(Literal),
    /// Positional input of the enclosing manifold
    Positional(usize),
    /// The result of invoking another manifold
    Call(u32),
}

/// A code-generation unit for one call site
#[derive(Debug, Clone, PartialEq)]
pub struct Manifold {
    pub id: u32,
    /// The AST node of the application this manifold was built from;
    /// absent for synthesized re-export manifolds
    pub call_id: Option<u32>,
    pub abstract_type: Option<Type>,
    pub realizations: Vec<Realization>,
    pub morloc_name: EVar,
    pub exported: bool,
    pub called: bool,
    pub defined: bool,
    /// The root declaration this manifold was built under
    pub composition: Option<EVar>,
    pub bound_vars: Vec<EVar>,
    pub args: Vec<Arg>,
}

impl Manifold {
    /// A value manifold returns data or a positional input directly; it
    /// has no realization and no source call.
    pub fn is_value(&self) -> bool {
        self.realizations.is_empty()
    }

    pub fn realization_for(&self, lang: &Lang) -> Option<&Realization> {
        self.realizations.iter().find(|r| &r.lang == lang)
    }

    pub fn in_lang(&self, lang: &Lang) -> bool {
        self.realization_for(lang).is_some()
    }
}

/// The full manifold list plus the root entry points and the realizations
/// of terms passed through as `Nest` arguments
#[derive(Debug, Default)]
pub struct ManifoldGraph {
    pub manifolds: Vec<Manifold>,
    /// IDs of the manifolds the nexus dispatches to, in export order
    pub roots: Vec<u32>,
    pub nested: HashMap<EVar, Vec<Realization>>,
}

impl ManifoldGraph {
    pub fn get(&self, id: u32) -> Option<&Manifold> {
        self.manifolds.iter().find(|m| m.id == id)
    }

    /// Every language that will need a pool; value manifolds land in the
    /// default language.
    pub fn languages(&self, default_lang: &Lang) -> BTreeSet<Lang> {
        let mut langs = BTreeSet::new();
        for m in &self.manifolds {
            if m.is_value() {
                langs.insert(default_lang.clone());
            }
            for r in &m.realizations {
                langs.insert(r.lang.clone());
            }
        }
        langs
    }

    /// Check the structural invariants: dense pre-order IDs, resolvable
    /// `Call` targets marked as called, and argument counts matching the
    /// abstract arity. A failure here is a compiler bug.
    pub fn validate(&self) -> Result<(), String> {
        let mut ids: Vec<u32> = self.manifolds.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        for (expect, id) in ids.iter().enumerate() {
            if *id != expect as u32 {
                return Err(format!(
                    "manifold ids are not dense: expected {}, found {}",
                    expect, id
                ));
            }
        }
        for m in &self.manifolds {
            for arg in &m.args {
                if let Arg::Call(id) = arg {
                    match self.get(*id) {
                        None => {
                            return Err(format!(
                                "manifold {} calls missing manifold {}",
                                m.id, id
                            ))
                        }
                        Some(callee) if !callee.called => {
                            return Err(format!(
                                "manifold {} is called but not marked called",
                                id
                            ))
                        }
                        Some(_) => {}
                    }
                }
            }
            if !m.is_value() {
                if let Some(ty) = &m.abstract_type {
                    if m.args.len() != ty.arity() {
                        return Err(format!(
                            "manifold {} has {} args but its type '{}' has arity {}",
                            m.id,
                            m.args.len(),
                            ty,
                            ty.arity()
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Build the manifold graph for every exported root declaration
pub fn build_manifolds(
    dag: &ModuleDag,
    table: &TermTable,
) -> Result<ManifoldGraph, Vec<Diagnostic>> {
    let mut builder = Builder::new(dag, table);
    let root = dag.root();
    for export in &root.exports {
        builder.build_export(export);
    }
    if builder.diagnostics.is_empty() {
        debug!("built {} manifolds", builder.graph.manifolds.len());
        Ok(builder.graph)
    } else {
        Err(builder.diagnostics)
    }
}

struct Builder<'a> {
    dag: &'a ModuleDag,
    table: &'a TermTable,
    /// rhs node index -> declaration body, for composition expansion
    decl_bodies: HashMap<u32, &'a ExprI>,
    next_id: u32,
    graph: ManifoldGraph,
    /// compositions currently being expanded (recursion check)
    expanding: Vec<EVar>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Builder<'a> {
    fn new(dag: &'a ModuleDag, table: &'a TermTable) -> Self {
        let mut decl_bodies = HashMap::new();
        for module in dag.modules() {
            for item in &module.body {
                if let Expr::Declaration { rhs, .. } = &item.expr {
                    decl_bodies.insert(rhs.idx, rhs.as_ref());
                }
            }
        }
        Builder {
            dag,
            table,
            decl_bodies,
            next_id: 0,
            graph: ManifoldGraph::default(),
            expanding: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn fresh(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn report(&mut self, error: TreeError, node: Option<u32>) {
        let mut d = Diagnostic::new(error).in_module(self.dag.root().name.clone());
        if let Some(idx) = node {
            d = d.at_node(idx);
        }
        self.diagnostics.push(d);
    }

    fn is_exported(&self, name: &EVar) -> bool {
        self.dag.root().exports_name(name)
    }

    fn build_export(&mut self, export: &EVar) {
        let root_module = self.dag.root();
        let local = root_module.declarations().find_map(|e| match &e.expr {
            Expr::Declaration { name, rhs, .. } if name == export => Some(rhs.as_ref()),
            _ => None,
        });
        // an export may also name a declaration reached through imports
        let rhs = local.or_else(|| {
            self.table
                .term(&root_module.name, export)
                .filter(|tt| !tt.is_sourced() && tt.is_defined())
                .and_then(|tt| tt.declarations.first())
                .and_then(|idx| self.decl_bodies.get(idx).copied())
        });

        match rhs {
            Some(rhs) => {
                let (params, body) = normalize(rhs);
                self.expanding.push(export.clone());
                let root_id = self.walk_body(body, &params, export, &HashMap::new());
                self.expanding.pop();
                if let Some(id) = root_id {
                    self.graph.roots.push(id);
                }
            }
            None => self.build_reexport(export),
        }
    }

    /// A pure re-export of a sourced function: positional placeholders,
    /// no call tree.
    fn build_reexport(&mut self, export: &EVar) {
        let root_name = self.dag.root().name.clone();
        let tt = match self.table.term(&root_name, export) {
            Some(tt) if tt.is_sourced() => tt.clone(),
            _ => {
                self.report(TreeError::MissingExport(export.clone()), None);
                return;
            }
        };
        let arity = term_arity(&tt);
        let id = self.fresh();
        self.graph.manifolds.push(Manifold {
            id,
            call_id: None,
            abstract_type: tt.general.as_ref().map(|e| e.ty.clone()),
            realizations: tt.concrete.clone(),
            morloc_name: export.clone(),
            exported: true,
            called: false,
            defined: tt.is_defined(),
            composition: Some(export.clone()),
            bound_vars: Vec::new(),
            args: (0..arity).map(Arg::Positional).collect(),
        });
        self.graph.roots.push(id);
    }

    /// Walk a composition body: an application chain, a bare variable
    /// (zero-argument application), or literal data.
    fn walk_body(
        &mut self,
        body: &'a ExprI,
        params: &[EVar],
        composition: &EVar,
        subst: &HashMap<EVar, Arg>,
    ) -> Option<u32> {
        let body = unwrap_ann(body);
        match &body.expr {
            Expr::App { func, args } => {
                let arg_refs: Vec<&ExprI> = args.iter().collect();
                self.walk_app(func, &arg_refs, params, composition, body.idx, subst)
            }
            Expr::Var(v) => {
                if let Some(arg) = subst.get(v) {
                    let arg = arg.clone();
                    return Some(self.value_manifold(body, composition, params, arg));
                }
                if let Some(pos) = params.iter().position(|p| p == v) {
                    // identity over a positional input
                    let arg = Arg::Positional(pos);
                    return Some(self.value_manifold(body, composition, params, arg));
                }
                // an eta-contracted alias of a sourced function forwards
                // its inputs positionally
                if params.is_empty() {
                    if let Some(tt) = self.table.node(body.idx) {
                        let arity = term_arity(tt);
                        if tt.is_sourced() && arity > 0 {
                            let tt = tt.clone();
                            let id = self.fresh();
                            self.graph.manifolds.push(Manifold {
                                id,
                                call_id: Some(body.idx),
                                abstract_type: tt
                                    .general
                                    .as_ref()
                                    .map(|e| e.ty.clone()),
                                realizations: tt.concrete.clone(),
                                morloc_name: v.clone(),
                                exported: self.is_exported(v),
                                called: false,
                                defined: tt.is_defined(),
                                composition: Some(composition.clone()),
                                bound_vars: Vec::new(),
                                args: (0..arity).map(Arg::Positional).collect(),
                            });
                            return Some(id);
                        }
                    }
                }
                // zero-argument application of a free term
                self.walk_app(body, &[], params, composition, body.idx, subst)
            }
            Expr::Lit(l) => {
                let arg = Arg::Data(l.clone());
                Some(self.value_manifold(body, composition, params, arg))
            }
            Expr::List(_) | Expr::Tuple(_) | Expr::Record(_) => match literal_of(body) {
                Some(l) => {
                    let arg = Arg::Data(l);
                    Some(self.value_manifold(body, composition, params, arg))
                }
                None => {
                    self.report(
                        TreeError::UnsupportedShape(
                            "collection with non-literal elements".to_string(),
                        ),
                        Some(body.idx),
                    );
                    None
                }
            },
            Expr::Lambda { .. } => {
                self.report(TreeError::UnsupportedNestedLambda, Some(body.idx));
                None
            }
            other => {
                self.report(
                    TreeError::UnsupportedShape(shape_name(other).to_string()),
                    Some(body.idx),
                );
                None
            }
        }
    }

    /// A manifold that returns data or an input without calling a source
    fn value_manifold(
        &mut self,
        node: &ExprI,
        composition: &EVar,
        params: &[EVar],
        arg: Arg,
    ) -> u32 {
        let root_name = self.dag.root().name.clone();
        let abstract_type = self
            .table
            .term(&root_name, composition)
            .and_then(|tt| tt.general.as_ref())
            .map(|e| e.ty.clone());
        let id = self.fresh();
        self.graph.manifolds.push(Manifold {
            id,
            call_id: Some(node.idx),
            abstract_type,
            realizations: Vec::new(),
            morloc_name: composition.clone(),
            exported: self.is_exported(composition),
            called: false,
            defined: true,
            composition: Some(composition.clone()),
            bound_vars: params.to_vec(),
            args: vec![arg],
        });
        id
    }

    fn walk_app(
        &mut self,
        func: &'a ExprI,
        args: &[&'a ExprI],
        params: &[EVar],
        composition: &EVar,
        app_idx: u32,
        subst: &HashMap<EVar, Arg>,
    ) -> Option<u32> {
        let func = unwrap_ann(func);
        let fname = match &func.expr {
            Expr::Var(v) => v.clone(),
            Expr::Lambda { .. } => {
                self.report(TreeError::UnsupportedNestedLambda, Some(func.idx));
                return None;
            }
            other => {
                self.report(
                    TreeError::UnsupportedShape(format!(
                        "application of {}",
                        shape_name(other)
                    )),
                    Some(func.idx),
                );
                return None;
            }
        };

        let tt = match self.table.node(func.idx) {
            Some(tt) => tt.clone(),
            None => {
                // a declaration's own name is shadowed inside its body, so
                // a self-recursive call surfaces as a lookup miss
                if self.expanding.contains(&fname) {
                    self.report(TreeError::RecursiveComposition(fname), Some(func.idx));
                } else if params.contains(&fname) || subst.contains_key(&fname) {
                    self.report(
                        TreeError::UnsupportedShape(
                            "application of a bound variable".to_string(),
                        ),
                        Some(func.idx),
                    );
                } else {
                    self.report(TreeError::UnboundVariable(fname), Some(func.idx));
                }
                return None;
            }
        };

        // a declared composition with no source of its own is inlined
        if !tt.is_sourced() && tt.is_defined() {
            return self.expand_composition(&fname, &tt, args, params, composition, subst);
        }

        if let Some(general) = &tt.general {
            let arity = general.ty.arity();
            if args.len() != arity {
                self.report(
                    TreeError::CompositionArity {
                        name: fname,
                        expected: arity,
                        got: args.len(),
                    },
                    Some(app_idx),
                );
                return None;
            }
        }

        // pre-order: the call site takes its id before its arguments
        let id = self.fresh();
        let mut built = Vec::with_capacity(args.len());
        for a in args {
            built.push(self.classify_arg(a, params, composition, subst)?);
        }

        self.graph.manifolds.push(Manifold {
            id,
            call_id: Some(app_idx),
            abstract_type: tt.general.as_ref().map(|e| e.ty.clone()),
            realizations: tt.concrete.clone(),
            morloc_name: fname.clone(),
            exported: self.is_exported(&fname),
            called: false,
            defined: tt.is_defined(),
            composition: Some(composition.clone()),
            bound_vars: params.to_vec(),
            args: built,
        });
        Some(id)
    }

    fn classify_arg(
        &mut self,
        arg: &'a ExprI,
        params: &[EVar],
        composition: &EVar,
        subst: &HashMap<EVar, Arg>,
    ) -> Option<Arg> {
        let arg = unwrap_ann(arg);
        match &arg.expr {
            Expr::Var(v) => {
                if let Some(bound) = subst.get(v) {
                    return Some(bound.clone());
                }
                if params.contains(v) {
                    return Some(Arg::Name(v.clone()));
                }
                match self.table.node(arg.idx) {
                    Some(tt) if tt.is_sourced() => {
                        self.graph
                            .nested
                            .entry(v.clone())
                            .or_insert_with(|| tt.concrete.clone());
                        Some(Arg::Nest(v.clone()))
                    }
                    Some(_) => {
                        self.report(
                            TreeError::UnsupportedShape(format!(
                                "composition '{}' passed as a value",
                                v
                            )),
                            Some(arg.idx),
                        );
                        None
                    }
                    None => {
                        self.report(TreeError::UnboundVariable(v.clone()), Some(arg.idx));
                        None
                    }
                }
            }
            Expr::Lit(l) => Some(Arg::Data(l.clone())),
            Expr::List(_) | Expr::Tuple(_) | Expr::Record(_) => match literal_of(arg) {
                Some(l) => Some(Arg::Data(l)),
                None => {
                    self.report(
                        TreeError::UnsupportedShape(
                            "collection with non-literal elements".to_string(),
                        ),
                        Some(arg.idx),
                    );
                    None
                }
            },
            Expr::App { func, args } => {
                let arg_refs: Vec<&ExprI> = args.iter().collect();
                let id =
                    self.walk_app(func, &arg_refs, params, composition, arg.idx, subst)?;
                if let Some(m) = self.graph.manifolds.iter_mut().find(|m| m.id == id) {
                    m.called = true;
                }
                Some(Arg::Call(id))
            }
            Expr::Lambda { .. } => {
                self.report(TreeError::UnsupportedNestedLambda, Some(arg.idx));
                None
            }
            other => {
                self.report(
                    TreeError::UnsupportedShape(shape_name(other).to_string()),
                    Some(arg.idx),
                );
                None
            }
        }
    }

    /// Inline a declared composition at its call site. The callee's
    /// parameters are bound to the caller's classified arguments; its body
    /// manifolds join the caller's composition.
    fn expand_composition(
        &mut self,
        fname: &EVar,
        tt: &TermTypes,
        args: &[&'a ExprI],
        params: &[EVar],
        composition: &EVar,
        subst: &HashMap<EVar, Arg>,
    ) -> Option<u32> {
        if self.expanding.contains(fname) {
            self.report(TreeError::RecursiveComposition(fname.clone()), None);
            return None;
        }
        let rhs_idx = *tt.declarations.first()?;
        let rhs = match self.decl_bodies.get(&rhs_idx) {
            Some(rhs) => *rhs,
            None => {
                self.report(
                    TreeError::UnboundVariable(fname.clone()),
                    Some(rhs_idx),
                );
                return None;
            }
        };
        let (inner_params, inner_body) = normalize(rhs);
        if inner_params.len() != args.len() {
            self.report(
                TreeError::CompositionArity {
                    name: fname.clone(),
                    expected: inner_params.len(),
                    got: args.len(),
                },
                None,
            );
            return None;
        }

        let mut binding = HashMap::new();
        for (p, a) in inner_params.iter().zip(args) {
            let classified = self.classify_arg(a, params, composition, subst)?;
            binding.insert(p.clone(), classified);
        }

        self.expanding.push(fname.clone());
        let id = self.walk_body(inner_body, params, composition, &binding);
        self.expanding.pop();
        id
    }
}

/// Split a declaration right-hand side into parameters and body. A
/// non-lambda is a zero-parameter composition; curried lambdas flatten.
fn normalize(rhs: &ExprI) -> (Vec<EVar>, &ExprI) {
    let mut params = Vec::new();
    let mut body = unwrap_ann(rhs);
    while let Expr::Lambda { params: ps, body: b } = &body.expr {
        params.extend(ps.iter().cloned());
        body = unwrap_ann(b);
    }
    (params, body)
}

fn unwrap_ann(e: &ExprI) -> &ExprI {
    match &e.expr {
        Expr::Ann { expr, .. } => unwrap_ann(expr),
        _ => e,
    }
}

/// Collapse a collection expression into literal data, if every element is
/// itself a literal
fn literal_of(e: &ExprI) -> Option<Literal> {
    match &unwrap_ann(e).expr {
        Expr::Lit(l) => Some(l.clone()),
        Expr::List(items) => items
            .iter()
            .map(literal_of)
            .collect::<Option<Vec<_>>>()
            .map(Literal::List),
        Expr::Tuple(items) => items
            .iter()
            .map(literal_of)
            .collect::<Option<Vec<_>>>()
            .map(Literal::Tuple),
        Expr::Record(fields) => fields
            .iter()
            .map(|(k, v)| literal_of(v).map(|l| (k.clone(), l)))
            .collect::<Option<Vec<_>>>()
            .map(Literal::Record),
        _ => None,
    }
}

fn term_arity(tt: &TermTypes) -> usize {
    if let Some(general) = &tt.general {
        return general.ty.arity();
    }
    tt.concrete
        .iter()
        .filter_map(|r| r.concrete_type.as_ref())
        .map(|e| e.ty.arity())
        .next()
        .unwrap_or(0)
}

fn shape_name(e: &Expr) -> &'static str {
    match e {
        Expr::Import(_) => "an import",
        Expr::Export(_) => "an export",
        Expr::Source(_) => "a source declaration",
        Expr::Declaration { .. } => "a declaration",
        Expr::Signature { .. } => "a signature",
        Expr::TypeAlias { .. } => "a type alias",
        Expr::Var(_) => "a variable",
        Expr::Access { .. } => "a field accessor",
        Expr::List(_) => "a list",
        Expr::Tuple(_) => "a tuple",
        Expr::Record(_) => "a record",
        Expr::Lambda { .. } => "a lambda",
        Expr::App { .. } => "an application",
        Expr::Ann { .. } => "an annotation",
        Expr::Lit(_) => "a literal",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{EType, Import, MVar, Module, Source};
    use crate::termtypes::TermTable;
    use std::path::PathBuf;

    fn evar(s: &str) -> EVar {
        EVar::new(s)
    }

    fn var(s: &str) -> ExprI {
        ExprI::new(0, Expr::Var(evar(s)))
    }

    fn app(f: ExprI, args: Vec<ExprI>) -> ExprI {
        ExprI::new(
            0,
            Expr::App {
                func: Box::new(f),
                args,
            },
        )
    }

    fn lam(params: &[&str], body: ExprI) -> ExprI {
        ExprI::new(
            0,
            Expr::Lambda {
                params: params.iter().map(|p| evar(p)).collect(),
                body: Box::new(body),
            },
        )
    }

    fn decl(name: &str, rhs: ExprI) -> ExprI {
        ExprI::new(
            0,
            Expr::Declaration {
                name: evar(name),
                rhs: Box::new(rhs),
                wheres: vec![],
            },
        )
    }

    fn src(lang: &str, names: &[(&str, &str)]) -> ExprI {
        ExprI::new(
            0,
            Expr::Source(Source {
                lang: Lang::new(lang),
                path: Some(PathBuf::from(format!("lib.{}", lang))),
                names: names
                    .iter()
                    .map(|(r, a)| (r.to_string(), evar(a)))
                    .collect(),
            }),
        )
    }

    fn sig(name: &str, lang: Option<&str>, ty: Type) -> ExprI {
        ExprI::new(
            0,
            Expr::Signature {
                name: evar(name),
                lang: lang.map(Lang::new),
                etype: EType::new(ty),
            },
        )
    }

    fn int_to_int() -> Type {
        Type::arrow(Type::var("Int"), Type::var("Int"))
    }

    fn setup(modules: Vec<Module>) -> (ModuleDag, TermTable) {
        let mut modules = modules;
        let mut counter = 0;
        for m in &mut modules {
            m.ensure_indexes(&mut counter);
        }
        let dag = ModuleDag::resolve(modules).unwrap();
        let table = TermTable::build(&dag).unwrap();
        (dag, table)
    }

    fn main_module(exports: &[&str], body: Vec<ExprI>) -> Module {
        Module {
            name: MVar::new("Main"),
            exports: exports.iter().map(|e| evar(e)).collect(),
            imports: vec![],
            body,
        }
    }

    #[test]
    fn trivial_data_export() {
        let (dag, table) = setup(vec![main_module(
            &["x"],
            vec![decl("x", ExprI::new(0, Expr::Lit(Literal::Num(1.0))))],
        )]);
        let graph = build_manifolds(&dag, &table).unwrap();
        assert_eq!(graph.manifolds.len(), 1);
        let m = &graph.manifolds[0];
        assert!(m.is_value());
        assert!(m.exported);
        assert_eq!(m.args, vec![Arg::Data(Literal::Num(1.0))]);
        assert_eq!(graph.roots, vec![m.id]);
        graph.validate().unwrap();
    }

    #[test]
    fn identity_composition_uses_positional() {
        let (dag, table) = setup(vec![main_module(
            &["id"],
            vec![decl("id", lam(&["x"], var("x")))],
        )]);
        let graph = build_manifolds(&dag, &table).unwrap();
        assert_eq!(graph.manifolds.len(), 1);
        let m = &graph.manifolds[0];
        assert_eq!(m.bound_vars, vec![evar("x")]);
        assert_eq!(m.args, vec![Arg::Positional(0)]);
        graph.validate().unwrap();
    }

    #[test]
    fn nested_application_becomes_call() {
        // h x = g (f x)
        let (dag, table) = setup(vec![main_module(
            &["h"],
            vec![
                src("py", &[("g_impl", "g")]),
                src("py", &[("f_impl", "f")]),
                decl(
                    "h",
                    lam(&["x"], app(var("g"), vec![app(var("f"), vec![var("x")])])),
                ),
            ],
        )]);
        let graph = build_manifolds(&dag, &table).unwrap();
        assert_eq!(graph.manifolds.len(), 2);
        let g = graph
            .manifolds
            .iter()
            .find(|m| m.morloc_name == evar("g"))
            .unwrap();
        let f = graph
            .manifolds
            .iter()
            .find(|m| m.morloc_name == evar("f"))
            .unwrap();
        // pre-order: the outer call is numbered before its argument
        assert!(g.id < f.id);
        assert_eq!(g.args, vec![Arg::Call(f.id)]);
        assert!(f.called);
        assert!(!g.called);
        assert_eq!(f.args, vec![Arg::Name(evar("x"))]);
        assert_eq!(graph.roots, vec![g.id]);
        graph.validate().unwrap();
    }

    #[test]
    fn sourced_reexport_gets_positional_placeholders() {
        let (dag, table) = setup(vec![main_module(
            &["f"],
            vec![sig("f", None, int_to_int()), src("py", &[("f_impl", "f")])],
        )]);
        let graph = build_manifolds(&dag, &table).unwrap();
        assert_eq!(graph.manifolds.len(), 1);
        let m = &graph.manifolds[0];
        assert_eq!(m.args, vec![Arg::Positional(0)]);
        assert!(m.exported);
        assert!(!m.called);
        assert_eq!(m.realizations.len(), 1);
        graph.validate().unwrap();
    }

    #[test]
    fn aliased_import_keeps_local_name() {
        // from A import (foo as bar); go x = bar x
        let (dag, table) = setup(vec![
            Module {
                name: MVar::new("Main"),
                exports: vec![evar("go")],
                imports: vec![Import::only(
                    "A",
                    vec![crate::ast::ImportItem::aliased("foo", "bar")],
                )],
                body: vec![decl("go", lam(&["x"], app(var("bar"), vec![var("x")])))],
            },
            Module {
                name: MVar::new("A"),
                exports: vec![evar("foo")],
                imports: vec![],
                body: vec![src("py", &[("foo_impl", "foo")])],
            },
        ]);
        let graph = build_manifolds(&dag, &table).unwrap();
        let m = &graph.manifolds[0];
        assert_eq!(m.morloc_name, evar("bar"));
        assert_eq!(m.realizations[0].source_name, "foo_impl");
        graph.validate().unwrap();
    }

    #[test]
    fn defined_composition_is_inlined() {
        // h x = g (f x); main y = h y   (h has no source, so it inlines)
        let (dag, table) = setup(vec![main_module(
            &["main"],
            vec![
                src("py", &[("g_impl", "g"), ("f_impl", "f")]),
                decl(
                    "h",
                    lam(&["x"], app(var("g"), vec![app(var("f"), vec![var("x")])])),
                ),
                decl("main", lam(&["y"], app(var("h"), vec![var("y")]))),
            ],
        )]);
        let graph = build_manifolds(&dag, &table).unwrap();
        assert_eq!(graph.manifolds.len(), 2);
        let f = graph
            .manifolds
            .iter()
            .find(|m| m.morloc_name == evar("f"))
            .unwrap();
        // h's parameter x was bound to the caller's y
        assert_eq!(f.args, vec![Arg::Name(evar("y"))]);
        assert_eq!(f.bound_vars, vec![evar("y")]);
        graph.validate().unwrap();
    }

    #[test]
    fn self_recursive_composition_is_rejected() {
        // loop x = loop x
        let (dag, table) = setup(vec![main_module(
            &["loop"],
            vec![decl(
                "loop",
                lam(&["x"], app(var("loop"), vec![var("x")])),
            )]
        )]);
        let errs = build_manifolds(&dag, &table).unwrap_err();
        assert!(errs
            .iter()
            .any(|d| matches!(d.error, TreeError::RecursiveComposition(_))));
    }

    #[test]
    fn mutually_recursive_compositions_are_rejected() {
        let (dag, table) = setup(vec![main_module(
            &["a"],
            vec![
                decl("a", lam(&["x"], app(var("b"), vec![var("x")]))),
                decl("b", lam(&["x"], app(var("a"), vec![var("x")]))),
            ],
        )]);
        let errs = build_manifolds(&dag, &table).unwrap_err();
        assert!(errs
            .iter()
            .any(|d| matches!(d.error, TreeError::RecursiveComposition(_))));
    }

    #[test]
    fn unbound_variable_is_reported_with_node() {
        let (dag, table) = setup(vec![main_module(
            &["go"],
            vec![decl("go", lam(&["x"], app(var("ghost"), vec![var("x")])))],
        )]);
        let errs = build_manifolds(&dag, &table).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].error, TreeError::UnboundVariable(_)));
        assert!(errs[0].node.is_some());
    }

    #[test]
    fn lambda_argument_is_rejected() {
        let (dag, table) = setup(vec![main_module(
            &["go"],
            vec![
                src("py", &[("map_impl", "map")]),
                decl(
                    "go",
                    lam(
                        &["xs"],
                        app(var("map"), vec![lam(&["y"], var("y")), var("xs")]),
                    ),
                ),
            ],
        )]);
        let errs = build_manifolds(&dag, &table).unwrap_err();
        assert!(errs
            .iter()
            .any(|d| matches!(d.error, TreeError::UnsupportedNestedLambda)));
    }

    #[test]
    fn sourced_function_argument_is_nested() {
        // go xs = map f xs  where f and map are both sourced
        let (dag, table) = setup(vec![main_module(
            &["go"],
            vec![
                src("py", &[("map_impl", "map"), ("f_impl", "f")]),
                decl(
                    "go",
                    lam(&["xs"], app(var("map"), vec![var("f"), var("xs")])),
                ),
            ],
        )]);
        let graph = build_manifolds(&dag, &table).unwrap();
        let m = &graph.manifolds[0];
        assert_eq!(m.args[0], Arg::Nest(evar("f")));
        assert!(graph.nested.contains_key(&evar("f")));
        graph.validate().unwrap();
    }

    #[test]
    fn arity_mismatch_with_general_type_is_reported() {
        let (dag, table) = setup(vec![main_module(
            &["go"],
            vec![
                sig("f", None, int_to_int()),
                src("py", &[("f_impl", "f")]),
                decl("go", lam(&["x", "y"], app(var("f"), vec![var("x"), var("y")]))),
            ],
        )]);
        let errs = build_manifolds(&dag, &table).unwrap_err();
        assert!(errs
            .iter()
            .any(|d| matches!(d.error, TreeError::CompositionArity { .. })));
    }

    #[test]
    fn missing_export_is_reported() {
        let (dag, table) = setup(vec![main_module(&["ghost"], vec![])]);
        let errs = build_manifolds(&dag, &table).unwrap_err();
        assert!(matches!(errs[0].error, TreeError::MissingExport(_)));
    }

    #[test]
    fn ids_are_dense_and_preorder() {
        let (dag, table) = setup(vec![main_module(
            &["go"],
            vec![
                src("py", &[("f_impl", "f"), ("g_impl", "g"), ("h_impl", "h")]),
                decl(
                    "go",
                    lam(
                        &["x"],
                        app(
                            var("f"),
                            vec![
                                app(var("g"), vec![var("x")]),
                                app(var("h"), vec![var("x")]),
                            ],
                        ),
                    ),
                ),
            ],
        )]);
        let graph = build_manifolds(&dag, &table).unwrap();
        assert_eq!(graph.manifolds.len(), 3);
        graph.validate().unwrap();
        let f = graph
            .manifolds
            .iter()
            .find(|m| m.morloc_name == evar("f"))
            .unwrap();
        let g = graph
            .manifolds
            .iter()
            .find(|m| m.morloc_name == evar("g"))
            .unwrap();
        let h = graph
            .manifolds
            .iter()
            .find(|m| m.morloc_name == evar("h"))
            .unwrap();
        assert_eq!(f.id, 0);
        assert_eq!(g.id, 1);
        assert_eq!(h.id, 2);
        assert_eq!(f.args, vec![Arg::Call(g.id), Arg::Call(h.id)]);
    }
}
