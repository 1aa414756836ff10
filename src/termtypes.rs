//! Signature unification and the term-type table
//!
//! For every term in every module this pass collects the at-most-one
//! general type, all language-specific realizations, and all declaration
//! bodies, then records the merged bundle for every expression node that
//! refers to the term. Imported terms join through the DAG's alias maps.

use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use crate::ast::{EType, EVar, Expr, ExprI, Lang, MVar, Module, Type};
use crate::dag::ModuleDag;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TermError {
    #[error("term '{0}' has more than one general type in one scope")]
    MultipleGeneralTypes(EVar),
    #[error("incompatible general types: '{left}' vs '{right}'")]
    IncompatibleGeneralType { left: String, right: String },
    #[error("term '{term}' has a concrete signature for {lang} but no matching source")]
    ConcreteWithoutSource { term: EVar, lang: Lang },
}

/// A language-specific concrete implementation of a term
#[derive(Debug, Clone, PartialEq)]
pub struct Realization {
    pub lang: Lang,
    /// The function name in the source file
    pub source_name: String,
    pub source_path: Option<PathBuf>,
    /// The concrete signature, once one is attached
    pub concrete_type: Option<EType>,
}

/// Everything known about one term: general type, concrete realizations,
/// and declaration bodies (referenced by node index)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermTypes {
    pub general: Option<EType>,
    pub concrete: Vec<Realization>,
    pub declarations: Vec<u32>,
}

impl TermTypes {
    pub fn is_defined(&self) -> bool {
        !self.declarations.is_empty()
    }

    pub fn is_sourced(&self) -> bool {
        !self.concrete.is_empty()
    }

    pub fn realization_for(&self, lang: &Lang) -> Option<&Realization> {
        self.concrete.iter().find(|r| &r.lang == lang)
    }

    /// Merge an imported bundle into this one. General types go through
    /// the structural unifier; realizations and declarations accumulate.
    fn absorb(&mut self, other: &TermTypes) -> Result<(), TermError> {
        self.general = match (self.general.take(), &other.general) {
            (Some(a), Some(b)) => Some(merge_general(&a, b)?),
            (Some(a), None) => Some(a),
            (None, b) => b.clone(),
        };
        for r in &other.concrete {
            if !self.concrete.contains(r) {
                self.concrete.push(r.clone());
            }
        }
        for d in &other.declarations {
            if !self.declarations.contains(d) {
                self.declarations.push(*d);
            }
        }
        Ok(())
    }
}

/// The global term-type table: one bundle per (module, term), plus the
/// node-indexed view used by the manifold builder.
#[derive(Debug, Default)]
pub struct TermTable {
    by_term: HashMap<(MVar, EVar), TermTypes>,
    by_node: HashMap<u32, TermTypes>,
}

impl TermTable {
    /// Build the table over a resolved, desugared DAG
    pub fn build(dag: &ModuleDag) -> Result<TermTable, TermError> {
        let mut table = TermTable::default();
        for name in dag.order() {
            let module = dag.get(name).expect("module in order");
            let mut local = collect_local(module)?;

            // join imported terms through the edge alias maps
            for edge in dag.imports_of(name) {
                for (remote, local_name) in &edge.aliases {
                    let key = (edge.to.clone(), remote.clone());
                    if let Some(imported) = table.by_term.get(&key) {
                        local
                            .entry(local_name.clone())
                            .or_default()
                            .absorb(imported)?;
                    }
                }
            }

            // record the bundle for every variable node referring to a term
            for item in &module.body {
                index_nodes(item, &local, &mut Vec::new(), &mut table.by_node);
            }

            debug!("module {}: {} terms", name, local.len());
            for (term, tt) in local {
                table.by_term.insert((name.clone(), term), tt);
            }
        }
        Ok(table)
    }

    pub fn node(&self, idx: u32) -> Option<&TermTypes> {
        self.by_node.get(&idx)
    }

    pub fn term(&self, module: &MVar, name: &EVar) -> Option<&TermTypes> {
        self.by_term.get(&(module.clone(), name.clone()))
    }

    pub fn iter_terms(&self) -> impl Iterator<Item = (&(MVar, EVar), &TermTypes)> {
        self.by_term.iter()
    }
}

/// Partition one module's body items by term into the signature, source,
/// and declaration buckets, then combine them into `TermTypes` bundles.
fn collect_local(module: &Module) -> Result<HashMap<EVar, TermTypes>, TermError> {
    let mut local: HashMap<EVar, TermTypes> = HashMap::new();
    let mut concrete_sigs: Vec<(EVar, Lang, EType)> = Vec::new();

    for item in &module.body {
        match &item.expr {
            Expr::Signature {
                name,
                lang: None,
                etype,
            } => {
                let entry = local.entry(name.clone()).or_default();
                if entry.general.is_some() {
                    return Err(TermError::MultipleGeneralTypes(name.clone()));
                }
                entry.general = Some(etype.clone());
            }
            Expr::Signature {
                name,
                lang: Some(lang),
                etype,
            } => {
                concrete_sigs.push((name.clone(), lang.clone(), etype.clone()));
            }
            Expr::Source(src) => {
                for (remote, alias) in &src.names {
                    local.entry(alias.clone()).or_default().concrete.push(
                        Realization {
                            lang: src.lang.clone(),
                            source_name: remote.clone(),
                            source_path: src.path.clone(),
                            concrete_type: None,
                        },
                    );
                }
            }
            Expr::Declaration { name, rhs, .. } => {
                local
                    .entry(name.clone())
                    .or_default()
                    .declarations
                    .push(rhs.idx);
            }
            _ => {}
        }
    }

    // a concrete signature is only legal when a matching source exists
    for (term, lang, etype) in concrete_sigs {
        let entry = local
            .get_mut(&term)
            .ok_or_else(|| TermError::ConcreteWithoutSource {
                term: term.clone(),
                lang: lang.clone(),
            })?;
        let mut attached = false;
        for r in entry.concrete.iter_mut().filter(|r| r.lang == lang) {
            if r.concrete_type.is_none() {
                r.concrete_type = Some(etype.clone());
            }
            attached = true;
        }
        if !attached {
            return Err(TermError::ConcreteWithoutSource { term, lang });
        }
    }

    Ok(local)
}

/// Record `node index -> TermTypes` for every variable occurrence, with
/// lambda parameters, declaration left-hand sides, and where-clause
/// bindings shadowing the term for the duration of the body traversal.
fn index_nodes(
    e: &ExprI,
    scope: &HashMap<EVar, TermTypes>,
    shadowed: &mut Vec<EVar>,
    out: &mut HashMap<u32, TermTypes>,
) {
    match &e.expr {
        Expr::Var(v) => {
            if !shadowed.contains(v) {
                if let Some(tt) = scope.get(v) {
                    out.insert(e.idx, tt.clone());
                }
            }
        }
        Expr::Declaration { name, rhs, wheres } => {
            let mark = shadowed.len();
            shadowed.push(name.clone());
            for w in wheres {
                if let Expr::Declaration { name, .. } = &w.expr {
                    shadowed.push(name.clone());
                }
            }
            index_nodes(rhs, scope, shadowed, out);
            for w in wheres {
                index_nodes(w, scope, shadowed, out);
            }
            shadowed.truncate(mark);
        }
        Expr::Lambda { params, body } => {
            let mark = shadowed.len();
            shadowed.extend(params.iter().cloned());
            index_nodes(body, scope, shadowed, out);
            shadowed.truncate(mark);
        }
        Expr::App { func, args } => {
            index_nodes(func, scope, shadowed, out);
            for a in args {
                index_nodes(a, scope, shadowed, out);
            }
        }
        Expr::Access { object, .. } => index_nodes(object, scope, shadowed, out),
        Expr::List(items) | Expr::Tuple(items) => {
            for i in items {
                index_nodes(i, scope, shadowed, out);
            }
        }
        Expr::Record(fields) => {
            for (_, v) in fields {
                index_nodes(v, scope, shadowed, out);
            }
        }
        Expr::Ann { expr, .. } => index_nodes(expr, scope, shadowed, out),
        Expr::Import(_)
        | Expr::Export(_)
        | Expr::Source(_)
        | Expr::Signature { .. }
        | Expr::TypeAlias { .. }
        | Expr::Lit(_) => {}
    }
}

/// Structural merge of two general types: equal variables pass through,
/// existentials absorb non-existentials, composite forms recurse
/// componentwise, anything else is a conflict.
pub fn merge_general(a: &EType, b: &EType) -> Result<EType, TermError> {
    let ty = unify(&a.ty, &b.ty)?;
    let mut props = a.props.clone();
    props.extend(b.props.iter().copied());
    Ok(EType { ty, props })
}

fn unify(a: &Type, b: &Type) -> Result<Type, TermError> {
    match (a, b) {
        (Type::Var(x), Type::Var(y)) if x == y => Ok(a.clone()),
        (Type::Exists(_, _), t) => Ok(t.clone()),
        (t, Type::Exists(_, _)) => Ok(t.clone()),
        (Type::Arrow(a1, r1), Type::Arrow(a2, r2)) => {
            Ok(Type::arrow(unify(a1, a2)?, unify(r1, r2)?))
        }
        (Type::App(x, xs), Type::App(y, ys)) if x == y && xs.len() == ys.len() => {
            let args = xs
                .iter()
                .zip(ys)
                .map(|(p, q)| unify(p, q))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Type::App(x.clone(), args))
        }
        (Type::Forall(v1, b1), Type::Forall(v2, b2)) if v1 == v2 => {
            Ok(Type::Forall(v1.clone(), Box::new(unify(b1, b2)?)))
        }
        (
            Type::Record {
                tag,
                name: nx,
                params: px,
                fields: fx,
            },
            Type::Record {
                name: ny,
                params: py,
                fields: fy,
                ..
            },
        ) if nx == ny
            && px.len() == py.len()
            && fx.len() == fy.len()
            && fx.iter().zip(fy.iter()).all(|((kx, _), (ky, _))| kx == ky) =>
        {
            let params = px
                .iter()
                .zip(py)
                .map(|(p, q)| unify(p, q))
                .collect::<Result<Vec<_>, _>>()?;
            let fields = fx
                .iter()
                .zip(fy)
                .map(|((k, p), (_, q))| Ok((k.clone(), unify(p, q)?)))
                .collect::<Result<Vec<_>, TermError>>()?;
            Ok(Type::Record {
                tag: tag.clone(),
                name: nx.clone(),
                params,
                fields,
            })
        }
        _ => Err(TermError::IncompatibleGeneralType {
            left: a.to_string(),
            right: b.to_string(),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Import, Literal, Source, TVar};
    use crate::dag::ModuleDag;

    fn sig(name: &str, lang: Option<&str>, ty: Type) -> ExprI {
        ExprI::new(
            0,
            Expr::Signature {
                name: EVar::new(name),
                lang: lang.map(Lang::new),
                etype: EType::new(ty),
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
                    .map(|(r, a)| (r.to_string(), EVar::new(*a)))
                    .collect(),
            }),
        )
    }

    fn int_to_int() -> Type {
        Type::arrow(Type::var("Int"), Type::var("Int"))
    }

    fn build(mut modules: Vec<Module>) -> Result<TermTable, TermError> {
        let mut counter = 0;
        for m in &mut modules {
            m.ensure_indexes(&mut counter);
        }
        let dag = ModuleDag::resolve(modules).unwrap();
        TermTable::build(&dag)
    }

    #[test]
    fn general_and_concrete_combine() {
        let table = build(vec![Module {
            name: MVar::new("Main"),
            exports: vec![EVar::new("f")],
            imports: vec![],
            body: vec![
                sig("f", None, int_to_int()),
                src("py", &[("f_impl", "f")]),
                sig("f", Some("py"), int_to_int()),
            ],
        }])
        .unwrap();
        let tt = table.term(&MVar::new("Main"), &EVar::new("f")).unwrap();
        assert!(tt.general.is_some());
        assert_eq!(tt.concrete.len(), 1);
        assert_eq!(tt.concrete[0].source_name, "f_impl");
        assert!(tt.concrete[0].concrete_type.is_some());
        assert!(tt.is_sourced());
        assert!(!tt.is_defined());
    }

    #[test]
    fn two_general_types_in_one_scope_fail() {
        let err = build(vec![Module {
            name: MVar::new("Main"),
            exports: vec![],
            imports: vec![],
            body: vec![
                sig("f", None, int_to_int()),
                sig("f", None, Type::var("Int")),
            ],
        }])
        .unwrap_err();
        assert_eq!(err, TermError::MultipleGeneralTypes(EVar::new("f")));
    }

    #[test]
    fn concrete_signature_without_source_fails() {
        let err = build(vec![Module {
            name: MVar::new("Main"),
            exports: vec![],
            imports: vec![],
            body: vec![sig("f", Some("py"), int_to_int())],
        }])
        .unwrap_err();
        assert!(matches!(err, TermError::ConcreteWithoutSource { .. }));
    }

    #[test]
    fn imported_terms_join_through_aliases() {
        let table = build(vec![
            Module {
                name: MVar::new("Main"),
                exports: vec![EVar::new("go")],
                imports: vec![Import::only(
                    "A",
                    vec![crate::ast::ImportItem::aliased("foo", "bar")],
                )],
                body: vec![],
            },
            Module {
                name: MVar::new("A"),
                exports: vec![EVar::new("foo")],
                imports: vec![],
                body: vec![
                    sig("foo", None, int_to_int()),
                    src("py", &[("foo_impl", "foo")]),
                ],
            },
        ])
        .unwrap();
        let tt = table.term(&MVar::new("Main"), &EVar::new("bar")).unwrap();
        assert_eq!(tt.concrete[0].source_name, "foo_impl");
        assert!(tt.general.is_some());
    }

    #[test]
    fn conflicting_general_types_across_imports_fail() {
        let err = build(vec![
            Module {
                name: MVar::new("Main"),
                exports: vec![],
                imports: vec![Import::all("A"), Import::all("B")],
                body: vec![],
            },
            Module {
                name: MVar::new("A"),
                exports: vec![EVar::new("f")],
                imports: vec![],
                body: vec![sig("f", None, int_to_int()), src("py", &[("fa", "f")])],
            },
            Module {
                name: MVar::new("B"),
                exports: vec![EVar::new("f")],
                imports: vec![],
                body: vec![
                    sig("f", None, Type::arrow(Type::var("Str"), Type::var("Str"))),
                    src("R", &[("fb", "f")]),
                ],
            },
        ])
        .unwrap_err();
        assert!(matches!(err, TermError::IncompatibleGeneralType { .. }));
    }

    #[test]
    fn existential_absorbs_concrete_side() {
        let a = EType::new(Type::Exists(TVar::gen("e"), vec![]));
        let b = EType::new(Type::var("Int"));
        let merged = merge_general(&a, &b).unwrap();
        assert_eq!(merged.ty, Type::var("Int"));
    }

    #[test]
    fn variable_nodes_are_indexed() {
        let mut module = Module {
            name: MVar::new("Main"),
            exports: vec![EVar::new("go")],
            imports: vec![],
            body: vec![
                src("py", &[("f_impl", "f")]),
                ExprI::new(
                    0,
                    Expr::Declaration {
                        name: EVar::new("go"),
                        rhs: Box::new(ExprI::new(
                            0,
                            Expr::App {
                                func: Box::new(ExprI::new(0, Expr::Var(EVar::new("f")))),
                                args: vec![ExprI::new(0, Expr::Lit(Literal::Num(1.0)))],
                            },
                        )),
                        wheres: vec![],
                    },
                ),
            ],
        };
        let mut counter = 0;
        module.ensure_indexes(&mut counter);
        let func_idx = match &module.body[1].expr {
            Expr::Declaration { rhs, .. } => match &rhs.expr {
                Expr::App { func, .. } => func.idx,
                _ => unreachable!(),
            },
            _ => unreachable!(),
        };
        let dag = ModuleDag::resolve(vec![module]).unwrap();
        let table = TermTable::build(&dag).unwrap();
        let tt = table.node(func_idx).unwrap();
        assert_eq!(tt.concrete[0].source_name, "f_impl");
    }

    #[test]
    fn lambda_parameters_shadow_terms() {
        let mut module = Module {
            name: MVar::new("Main"),
            exports: vec![EVar::new("go")],
            imports: vec![],
            body: vec![
                src("py", &[("x_impl", "x")]),
                ExprI::new(
                    0,
                    Expr::Declaration {
                        name: EVar::new("go"),
                        rhs: Box::new(ExprI::new(
                            0,
                            Expr::Lambda {
                                params: vec![EVar::new("x")],
                                body: Box::new(ExprI::new(0, Expr::Var(EVar::new("x")))),
                            },
                        )),
                        wheres: vec![],
                    },
                ),
            ],
        };
        let mut counter = 0;
        module.ensure_indexes(&mut counter);
        let var_idx = match &module.body[1].expr {
            Expr::Declaration { rhs, .. } => match &rhs.expr {
                Expr::Lambda { body, .. } => body.idx,
                _ => unreachable!(),
            },
            _ => unreachable!(),
        };
        let dag = ModuleDag::resolve(vec![module]).unwrap();
        let table = TermTable::build(&dag).unwrap();
        // the bound x shadows the sourced x, so the node is not indexed
        assert!(table.node(var_idx).is_none());
    }
}
