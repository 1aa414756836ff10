//! Module DAG resolution: import edges, cycle detection, and alias maps
//!
//! Each import edge is reduced to an alias map `(exported name) -> (local
//! name)`. The compilation entry is the unique module imported by nothing.

use std::collections::{HashMap, HashSet};

use log::debug;
use thiserror::Error;

use crate::ast::{EVar, Import, MVar, Module};

/// Error during module resolution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("module '{0}' is defined more than once")]
    DuplicateModule(MVar),
    #[error("module '{importer}' imports unknown module '{module}'")]
    MissingModule { importer: MVar, module: MVar },
    #[error("name '{name}' is both included and excluded in the import of '{module}'")]
    ImportContradiction { module: MVar, name: EVar },
    #[error("name '{name}' is not exported by module '{module}'")]
    ImportMissing { module: MVar, name: EVar },
    #[error("circular module dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("no unique root module: {} are all imported by nothing", roots.join(", "))]
    NonUniqueRoot { roots: Vec<String> },
}

/// One resolved import edge. `aliases` maps the name exported by `to` onto
/// the name the importer uses locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub to: MVar,
    pub aliases: Vec<(EVar, EVar)>,
}

impl Edge {
    /// The remote name behind a local one, if this edge provides it
    pub fn remote(&self, local: &EVar) -> Option<&EVar> {
        self.aliases
            .iter()
            .find(|(_, l)| l == local)
            .map(|(r, _)| r)
    }
}

/// The resolved module graph: acyclic, single-rooted, dependencies-first
/// topological order, one alias map per import edge.
#[derive(Debug)]
pub struct ModuleDag {
    modules: HashMap<MVar, Module>,
    edges: HashMap<MVar, Vec<Edge>>,
    root: MVar,
    order: Vec<MVar>,
}

impl ModuleDag {
    /// Resolve a set of parsed modules into a DAG
    pub fn resolve(modules: Vec<Module>) -> Result<ModuleDag, DagError> {
        let mut by_name: HashMap<MVar, Module> = HashMap::new();
        for m in modules {
            if by_name.contains_key(&m.name) {
                return Err(DagError::DuplicateModule(m.name));
            }
            by_name.insert(m.name.clone(), m);
        }

        // Resolve every import edge to an alias map
        let mut edges: HashMap<MVar, Vec<Edge>> = HashMap::new();
        let mut imported: HashSet<MVar> = HashSet::new();
        for m in by_name.values() {
            let mut out = Vec::new();
            for import in &m.imports {
                let target = by_name
                    .get(&import.module)
                    .ok_or_else(|| DagError::MissingModule {
                        importer: m.name.clone(),
                        module: import.module.clone(),
                    })?;
                out.push(resolve_edge(import, target)?);
                imported.insert(import.module.clone());
            }
            edges.insert(m.name.clone(), out);
        }

        // The unique parentless module is the compilation root
        let mut roots: Vec<&MVar> = by_name.keys().filter(|n| !imported.contains(n)).collect();
        roots.sort();
        let root = match roots.len() {
            1 => roots[0].clone(),
            0 => {
                // every module is imported, so the graph has no sources
                let mut cycle: Vec<String> =
                    by_name.keys().map(|n| n.as_str().to_string()).collect();
                cycle.sort();
                return Err(DagError::CyclicDependency { cycle });
            }
            _ => {
                return Err(DagError::NonUniqueRoot {
                    roots: roots.iter().map(|n| n.as_str().to_string()).collect(),
                })
            }
        };

        // Topological sort, dependencies first
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();
        let mut stack = Vec::new();
        let mut names: Vec<&MVar> = by_name.keys().collect();
        names.sort();
        for name in names {
            topo_visit(
                name,
                &edges,
                &mut visited,
                &mut visiting,
                &mut stack,
                &mut order,
            )?;
        }

        debug!(
            "resolved module dag: root={}, order={:?}",
            root,
            order.iter().map(MVar::as_str).collect::<Vec<_>>()
        );

        Ok(ModuleDag {
            modules: by_name,
            edges,
            root,
            order,
        })
    }

    pub fn root(&self) -> &Module {
        &self.modules[&self.root]
    }

    pub fn root_name(&self) -> &MVar {
        &self.root
    }

    pub fn get(&self, name: &MVar) -> Option<&Module> {
        self.modules.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &MVar) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    /// Modules in dependencies-first order
    pub fn order(&self) -> &[MVar] {
        &self.order
    }

    /// The resolved import edges leaving `name`
    pub fn imports_of(&self, name: &MVar) -> &[Edge] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.order.iter().map(|n| &self.modules[n])
    }
}

/// Reduce one import to its alias map.
///
/// With no include list the full export surface flows through minus the
/// excluded names; with an include list only the listed names flow, renamed
/// by their per-item aliases. A module alias qualifies every local name.
fn resolve_edge(import: &Import, target: &Module) -> Result<Edge, DagError> {
    let mut aliases = Vec::new();
    match &import.include {
        Some(items) => {
            for item in items {
                if import.exclude.contains(&item.name) {
                    return Err(DagError::ImportContradiction {
                        module: target.name.clone(),
                        name: item.name.clone(),
                    });
                }
                if !target.exports_name(&item.name) {
                    return Err(DagError::ImportMissing {
                        module: target.name.clone(),
                        name: item.name.clone(),
                    });
                }
                aliases.push((item.name.clone(), qualify(import, item.local())));
            }
        }
        None => {
            for name in &target.exports {
                if !import.exclude.contains(name) {
                    aliases.push((name.clone(), qualify(import, name)));
                }
            }
        }
    }
    Ok(Edge {
        to: target.name.clone(),
        aliases,
    })
}

fn qualify(import: &Import, local: &EVar) -> EVar {
    match &import.alias {
        Some(m) => EVar::new(format!("{}.{}", m, local)),
        None => local.clone(),
    }
}

fn topo_visit(
    name: &MVar,
    edges: &HashMap<MVar, Vec<Edge>>,
    visited: &mut HashSet<MVar>,
    visiting: &mut HashSet<MVar>,
    stack: &mut Vec<MVar>,
    order: &mut Vec<MVar>,
) -> Result<(), DagError> {
    if visited.contains(name) {
        return Ok(());
    }
    if visiting.contains(name) {
        let mut cycle: Vec<String> = stack.iter().map(|m| m.as_str().to_string()).collect();
        cycle.push(name.as_str().to_string());
        return Err(DagError::CyclicDependency { cycle });
    }

    visiting.insert(name.clone());
    stack.push(name.clone());

    if let Some(out) = edges.get(name) {
        for edge in out {
            topo_visit(&edge.to, edges, visited, visiting, stack, order)?;
        }
    }

    visiting.remove(name);
    stack.pop();
    visited.insert(name.clone());
    order.push(name.clone());
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
