//! Pool emission
//!
//! A pool is one script per backend language holding a wrapper function
//! `m<id>` for every manifold that lives in that language, plus a dispatch
//! tail that reads a manifold id from the command line, invokes the
//! matching wrapper, and prints the packed result.

use std::collections::HashSet;
use std::path::PathBuf;

use log::debug;

use crate::ast::{Lang, Type};
use crate::compile::Config;
use crate::manifold::{Arg, Manifold, ManifoldGraph};
use crate::serial::SerialMap;

use super::grammar::{grammar_for, render_literal, Grammar};
use super::{classify, manifold_lang, EmitError, ManifoldClass};

/// Conventional pool file name for a grammar
pub fn pool_name(g: &dyn Grammar) -> String {
    format!("pool.{}", g.extension())
}

/// Emit the pool script for one language
pub fn emit_pool(
    lang: &Lang,
    graph: &ManifoldGraph,
    serial: &SerialMap,
    config: &Config,
) -> Result<String, EmitError> {
    let grammar = grammar_for(lang)?;
    let emitter = PoolEmitter {
        grammar: grammar.as_ref(),
        lang,
        graph,
        serial,
        config,
    };
    emitter.emit()
}

struct PoolEmitter<'a> {
    grammar: &'a dyn Grammar,
    lang: &'a Lang,
    graph: &'a ManifoldGraph,
    serial: &'a SerialMap,
    config: &'a Config,
}

impl<'a> PoolEmitter<'a> {
    fn emit(&self) -> Result<String, EmitError> {
        let roots: HashSet<u32> = self.graph.roots.iter().copied().collect();
        let mut emitted: Vec<&Manifold> = self
            .graph
            .manifolds
            .iter()
            .filter(|m| {
                matches!(
                    classify(m, self.lang, roots.contains(&m.id), &self.config.default_lang),
                    ManifoldClass::Cis | ManifoldClass::Source
                )
            })
            .collect();
        emitted.sort_by_key(|m| m.id);
        debug!("pool {}: emitting {} manifolds", self.lang, emitted.len());

        // a pool that sources foreign code must declare its generic codecs;
        // a pure-value pool falls back to the built-in scalar codecs
        let crosses_boundary = emitted.iter().any(|m| !m.is_value());
        let packer = match self.serial.generic_packer.as_deref() {
            Some(p) => p,
            None if crosses_boundary => {
                return Err(EmitError::MissingGenericPacker(self.lang.clone()))
            }
            None => self.builtin_packer(),
        };
        let unpacker_fallback = match self.serial.generic_unpacker.as_deref() {
            Some(u) => u,
            None if crosses_boundary => {
                return Err(EmitError::MissingGenericUnpacker(self.lang.clone()))
            }
            None => self.builtin_unpacker(),
        };

        let imports = self.collect_imports(&emitted);
        let mut out = self.grammar.preamble(&imports);

        for m in &emitted {
            out.push_str(&self.grammar.comment(&format!(
                "manifold {}: {}",
                m.id, m.morloc_name
            )));
            out.push('\n');
            out.push_str(&self.emit_manifold(m, unpacker_fallback)?);
            out.push('\n');
        }

        let entries: Vec<(u32, usize)> = emitted
            .iter()
            .map(|m| (m.id, m.bound_vars.len().max(m.args.len())))
            .collect();
        out.push_str(&self.grammar.dispatch(&entries, packer));
        Ok(out)
    }

    fn builtin_packer(&self) -> &'static str {
        match self.lang.as_str() {
            "R" => ".morloc_pack",
            _ => "_morloc_pack",
        }
    }

    fn builtin_unpacker(&self) -> &'static str {
        match self.lang.as_str() {
            "R" => ".morloc_unpack",
            _ => "_morloc_unpack",
        }
    }

    /// Source files this pool must load: realizations of emitted
    /// manifolds, nested pass-through terms, and (un)packer sources
    fn collect_imports(&self, emitted: &[&Manifold]) -> Vec<String> {
        let mut paths: Vec<PathBuf> = Vec::new();
        let push = |p: Option<&PathBuf>, paths: &mut Vec<PathBuf>| {
            if let Some(p) = p {
                let resolved = self.config.resolve_path(p);
                if !paths.contains(&resolved) {
                    paths.push(resolved);
                }
            }
        };
        for p in &self.serial.sources {
            push(Some(p), &mut paths);
        }
        for m in emitted {
            if let Some(r) = m.realization_for(self.lang) {
                push(r.source_path.as_ref(), &mut paths);
            }
        }
        for realizations in self.graph.nested.values() {
            for r in realizations.iter().filter(|r| &r.lang == self.lang) {
                push(r.source_path.as_ref(), &mut paths);
            }
        }
        paths
            .iter()
            .map(|p| self.grammar.source_import(p))
            .collect()
    }

    /// One wrapper function. Bound variables arrive serialized as
    /// parameters; each argument lands in a local `a<k>`, unpacked when it
    /// crosses a serialization boundary; the final line calls the source.
    fn emit_manifold(
        &self,
        m: &Manifold,
        unpacker_fallback: &str,
    ) -> Result<String, EmitError> {
        let params = self.param_names(m);
        let mut body = Vec::new();

        for (k, arg) in m.args.iter().enumerate() {
            let local = format!("a{}", k);
            let ty = self.arg_type(m, k);
            let rhs = match arg {
                Arg::Name(v) => {
                    self.unpack_expr(ty, unpacker_fallback, v.as_str().to_string())
                }
                Arg::Positional(i) => {
                    let name = params
                        .get(*i)
                        .cloned()
                        .unwrap_or_else(|| format!("x{}", i));
                    self.unpack_expr(ty, unpacker_fallback, name)
                }
                Arg::Data(lit) => render_literal(self.grammar, lit),
                Arg::Nest(v) => {
                    let realizations = self.graph.nested.get(v);
                    let r = realizations
                        .and_then(|rs| rs.iter().find(|r| &r.lang == self.lang))
                        .ok_or_else(|| EmitError::NoRealization {
                            term: v.clone(),
                            lang: self.lang.clone(),
                        })?;
                    r.source_name.clone()
                }
                Arg::Call(id) => {
                    let callee = self
                        .graph
                        .get(*id)
                        .expect("validated call target");
                    if callee.in_lang(self.lang)
                        || (callee.is_value() && self.lang == &self.config.default_lang)
                    {
                        // same language: a direct call, result stays native
                        self.grammar.call(
                            &format!("m{}", id),
                            &callee
                                .bound_vars
                                .iter()
                                .map(|v| v.as_str().to_string())
                                .collect::<Vec<_>>(),
                        )
                    } else {
                        // foreign call: spawn the other pool, unpack stdout
                        let callee_lang =
                            manifold_lang(callee, &self.config.default_lang);
                        let callee_grammar = grammar_for(&callee_lang)?;
                        let executor = self.config.executor_for(&callee_lang)?;
                        let spawn = self.grammar.foreign_call(
                            executor,
                            &pool_name(callee_grammar.as_ref()),
                            *id,
                            &callee
                                .bound_vars
                                .iter()
                                .map(|v| v.as_str().to_string())
                                .collect::<Vec<_>>(),
                        );
                        self.unpack_expr(ty, unpacker_fallback, spawn)
                    }
                }
            };
            body.push(self.grammar.assign(&local, &rhs));
        }

        let locals: Vec<String> = (0..m.args.len()).map(|k| format!("a{}", k)).collect();
        let last = match m.realization_for(self.lang) {
            Some(r) => self
                .grammar
                .ret(&self.grammar.try_call(&r.source_name, m.id, &locals)),
            // a value manifold returns its single argument
            None => self.grammar.ret(&locals[0]),
        };
        body.push(last);

        Ok(self
            .grammar
            .function(&format!("m{}", m.id), &params, &body))
    }

    fn param_names(&self, m: &Manifold) -> Vec<String> {
        if !m.bound_vars.is_empty() {
            return m.bound_vars.iter().map(|v| v.as_str().to_string()).collect();
        }
        let positional = m
            .args
            .iter()
            .filter(|a| matches!(a, Arg::Positional(_)))
            .count();
        (0..positional).map(|i| format!("x{}", i)).collect()
    }

    /// The declared type of argument `k`, preferring the concrete
    /// realization signature over the general type
    fn arg_type<'m>(&self, m: &'m Manifold, k: usize) -> Option<&'m Type> {
        if let Some(r) = m.realization_for(self.lang) {
            if let Some(e) = &r.concrete_type {
                if let Some(ty) = e.ty.args().get(k).copied() {
                    return Some(ty);
                }
            }
        }
        m.abstract_type.as_ref().and_then(|t| t.args().get(k).copied())
    }

    fn unpack_expr(&self, ty: Option<&Type>, fallback: &str, value: String) -> String {
        let unpacker = self.serial.unpacker_for(ty).unwrap_or(fallback);
        self.grammar.unpack(unpacker, &value)
    }
}
