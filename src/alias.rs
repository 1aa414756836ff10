//! Type-alias desugaring
//!
//! Resolves `type` declarations transitively across the module DAG,
//! substitutes aliases into every signature and annotation, rejects
//! self-recursive aliases, and reconciles conflicting imported definitions
//! by bidirectional subtyping. Existentials that survive desugaring are
//! resolved to their first default instantiation.

use std::collections::{HashMap, HashSet};

use log::debug;
use thiserror::Error;

use crate::ast::{Expr, ExprI, MVar, TVar, Type};
use crate::dag::ModuleDag;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AliasError {
    #[error("type alias '{0}' refers to itself")]
    SelfRecursiveTypeAlias(String),
    #[error("type alias '{name}' takes {expected} parameters but was given {got}")]
    BadTypeAliasParameters {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("conflicting definitions of type alias '{0}' reached through imports")]
    ConflictingAliases(String),
}

/// One alias definition: parameter list and body
#[derive(Debug, Clone, PartialEq)]
pub struct AliasDef {
    pub params: Vec<TVar>,
    pub body: Type,
}

/// The aliases visible inside one module
#[derive(Debug, Clone, Default)]
pub struct AliasEnv {
    defs: HashMap<String, AliasDef>,
}

impl AliasEnv {
    pub fn get(&self, name: &str) -> Option<&AliasDef> {
        self.defs.get(name)
    }

    /// Insert a definition, reconciling with any existing one. Two
    /// definitions coexist only when they have equal arity and each is a
    /// subtype of the other under a common quantifier prefix.
    pub fn insert(&mut self, name: String, def: AliasDef) -> Result<(), AliasError> {
        match self.defs.get(&name) {
            None => {
                self.defs.insert(name, def);
                Ok(())
            }
            Some(existing) => {
                if existing.params.len() == def.params.len()
                    && equivalent(&existing.body, &def.body)
                {
                    Ok(())
                } else {
                    Err(AliasError::ConflictingAliases(name))
                }
            }
        }
    }
}

/// Desugar every type in the DAG's modules, in place
pub fn desugar(dag: &mut ModuleDag) -> Result<(), AliasError> {
    let envs = build_envs(dag)?;
    let names: Vec<MVar> = dag.order().to_vec();
    for name in names {
        let env = &envs[&name];
        let module = dag.get_mut(&name).expect("module in order");
        for e in &mut module.body {
            rewrite_types(e, env)?;
        }
    }
    Ok(())
}

/// Compute the alias environment of every module, dependencies first.
/// Aliases flow along import edges; an edge's alias map renames them like
/// any other imported name.
pub fn build_envs(dag: &ModuleDag) -> Result<HashMap<MVar, AliasEnv>, AliasError> {
    let mut envs: HashMap<MVar, AliasEnv> = HashMap::new();
    for name in dag.order() {
        let module = dag.get(name).expect("module in order");
        let mut env = AliasEnv::default();

        for edge in dag.imports_of(name) {
            let imported = &envs[&edge.to];
            for (alias_name, def) in &imported.defs {
                let local = edge
                    .aliases
                    .iter()
                    .find(|(remote, _)| remote.as_str() == alias_name)
                    .map(|(_, l)| l.as_str().to_string())
                    .unwrap_or_else(|| alias_name.clone());
                env.insert(local, def.clone())?;
            }
        }

        for (tname, params, body) in module.type_aliases() {
            if body.mentions(&tname.name) {
                return Err(AliasError::SelfRecursiveTypeAlias(tname.name.clone()));
            }
            env.insert(
                tname.name.clone(),
                AliasDef {
                    params: params.clone(),
                    body: body.clone(),
                },
            )?;
        }

        debug!(
            "module {}: {} type aliases visible",
            name,
            env.defs.len()
        );
        envs.insert(name.clone(), env);
    }
    Ok(envs)
}

/// Substitute aliases in a type until none remain, then resolve surviving
/// existentials to their first default instantiation. Idempotent: expanding
/// an already-expanded type is the identity.
pub fn expand(ty: &Type, env: &AliasEnv) -> Result<Type, AliasError> {
    let mut expanding = Vec::new();
    let expanded = go(ty, env, &mut expanding, &mut HashSet::new())?;
    Ok(resolve_existentials(&expanded))
}

fn go(
    ty: &Type,
    env: &AliasEnv,
    expanding: &mut Vec<String>,
    shadowed: &mut HashSet<String>,
) -> Result<Type, AliasError> {
    match ty {
        Type::Var(v) => match env.get(&v.name) {
            Some(def) if !shadowed.contains(&v.name) => {
                if !def.params.is_empty() {
                    return Err(AliasError::BadTypeAliasParameters {
                        name: v.name.clone(),
                        expected: def.params.len(),
                        got: 0,
                    });
                }
                enter(&v.name, &def.body, env, expanding, shadowed)
            }
            _ => Ok(ty.clone()),
        },
        Type::App(v, args) => {
            let args = args
                .iter()
                .map(|a| go(a, env, expanding, shadowed))
                .collect::<Result<Vec<_>, _>>()?;
            match env.get(&v.name) {
                Some(def) if !shadowed.contains(&v.name) => {
                    if def.params.len() != args.len() {
                        return Err(AliasError::BadTypeAliasParameters {
                            name: v.name.clone(),
                            expected: def.params.len(),
                            got: args.len(),
                        });
                    }
                    // positional substitution of the alias parameters
                    let mut body = def.body.clone();
                    for (param, arg) in def.params.iter().zip(&args) {
                        body = body.substitute(&param.name, arg);
                    }
                    enter(&v.name, &body, env, expanding, shadowed)
                }
                _ => Ok(Type::App(v.clone(), args)),
            }
        }
        Type::Forall(v, body) => {
            let fresh = shadowed.insert(v.name.clone());
            let out = go(body, env, expanding, shadowed);
            if fresh {
                shadowed.remove(&v.name);
            }
            Ok(Type::Forall(v.clone(), Box::new(out?)))
        }
        Type::Exists(v, defaults) => Ok(Type::Exists(
            v.clone(),
            defaults
                .iter()
                .map(|d| go(d, env, expanding, shadowed))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Type::Arrow(a, b) => Ok(Type::arrow(
            go(a, env, expanding, shadowed)?,
            go(b, env, expanding, shadowed)?,
        )),
        Type::Record {
            tag,
            name,
            params,
            fields,
        } => Ok(Type::Record {
            tag: tag.clone(),
            name: name.clone(),
            params: params
                .iter()
                .map(|t| go(t, env, expanding, shadowed))
                .collect::<Result<Vec<_>, _>>()?,
            fields: fields
                .iter()
                .map(|(k, t)| Ok((k.clone(), go(t, env, expanding, shadowed)?)))
                .collect::<Result<Vec<_>, AliasError>>()?,
        }),
    }
}

/// Expand an alias body, tracking the expansion stack so mutually
/// recursive alias chains are caught as self-recursion.
fn enter(
    name: &str,
    body: &Type,
    env: &AliasEnv,
    expanding: &mut Vec<String>,
    shadowed: &mut HashSet<String>,
) -> Result<Type, AliasError> {
    if expanding.iter().any(|n| n == name) {
        return Err(AliasError::SelfRecursiveTypeAlias(name.to_string()));
    }
    expanding.push(name.to_string());
    let out = go(body, env, expanding, shadowed);
    expanding.pop();
    out
}

/// Replace surviving existentials with their first default instantiation.
/// Existentials without defaults are left for the inference collaborator.
pub fn resolve_existentials(ty: &Type) -> Type {
    match ty {
        Type::Exists(_, defaults) if !defaults.is_empty() => {
            resolve_existentials(&defaults[0])
        }
        Type::Exists(v, _) => Type::Exists(v.clone(), vec![]),
        Type::Var(_) => ty.clone(),
        Type::Forall(v, body) => {
            Type::Forall(v.clone(), Box::new(resolve_existentials(body)))
        }
        Type::Arrow(a, b) => Type::arrow(resolve_existentials(a), resolve_existentials(b)),
        Type::App(v, args) => Type::App(
            v.clone(),
            args.iter().map(resolve_existentials).collect(),
        ),
        Type::Record {
            tag,
            name,
            params,
            fields,
        } => Type::Record {
            tag: tag.clone(),
            name: name.clone(),
            params: params.iter().map(resolve_existentials).collect(),
            fields: fields
                .iter()
                .map(|(k, t)| (k.clone(), resolve_existentials(t)))
                .collect(),
        },
    }
}

/// Bidirectional subtyping under a common quantifier prefix: each side must
/// be a subtype of the other, which collapses to structural equality modulo
/// binder renaming, with existentials absorbing anything.
pub fn equivalent(a: &Type, b: &Type) -> bool {
    fn walk(a: &Type, b: &Type, binders: &mut HashMap<String, String>) -> bool {
        match (a, b) {
            (Type::Forall(va, ba), Type::Forall(vb, bb)) => {
                binders.insert(vb.name.clone(), va.name.clone());
                walk(ba, bb, binders)
            }
            (Type::Exists(_, _), _) | (_, Type::Exists(_, _)) => true,
            (Type::Var(x), Type::Var(y)) => {
                let yname = binders.get(&y.name).map(String::as_str).unwrap_or(&y.name);
                x.name == yname && x.lang == y.lang
            }
            (Type::Arrow(a1, r1), Type::Arrow(a2, r2)) => {
                walk(a1, a2, binders) && walk(r1, r2, binders)
            }
            (Type::App(x, xs), Type::App(y, ys)) => {
                x.name == y.name
                    && xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(p, q)| walk(p, q, binders))
            }
            (
                Type::Record {
                    name: nx,
                    fields: fx,
                    ..
                },
                Type::Record {
                    name: ny,
                    fields: fy,
                    ..
                },
            ) => {
                nx.name == ny.name
                    && fx.len() == fy.len()
                    && fx.iter().zip(fy).all(|((kx, tx), (ky, ty))| {
                        kx == ky && walk(tx, ty, binders)
                    })
            }
            _ => false,
        }
    }
    walk(a, b, &mut HashMap::new()) && walk(b, a, &mut HashMap::new())
}

fn rewrite_types(e: &mut ExprI, env: &AliasEnv) -> Result<(), AliasError> {
    match &mut e.expr {
        Expr::Signature { etype, .. } => {
            etype.ty = expand(&etype.ty, env)?;
        }
        Expr::Ann { expr, ty } => {
            *ty = expand(ty, env)?;
            rewrite_types(expr, env)?;
        }
        Expr::Declaration { rhs, wheres, .. } => {
            rewrite_types(rhs, env)?;
            for w in wheres {
                rewrite_types(w, env)?;
            }
        }
        Expr::Access { object, .. } => rewrite_types(object, env)?,
        Expr::List(items) | Expr::Tuple(items) => {
            for i in items {
                rewrite_types(i, env)?;
            }
        }
        Expr::Record(fields) => {
            for (_, v) in fields {
                rewrite_types(v, env)?;
            }
        }
        Expr::Lambda { body, .. } => rewrite_types(body, env)?,
        Expr::App { func, args } => {
            rewrite_types(func, env)?;
            for a in args {
                rewrite_types(a, env)?;
            }
        }
        Expr::Import(_)
        | Expr::Export(_)
        | Expr::Source(_)
        | Expr::TypeAlias { .. }
        | Expr::Var(_)
        | Expr::Lit(_) => {}
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
