//! Serialization planning
//!
//! For each language, computes the map from types to the (un)packer
//! functions that move data across language boundaries. A signature tagged
//! `pack` feeds the packer map, `unpack` the unpacker map; the key is the
//! first function argument's type. A signature whose domain is a bare type
//! variable is the language's generic entry.

use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;

use crate::ast::{Lang, Type};
use crate::termtypes::TermTable;

/// Per-language serialization map
#[derive(Debug, Clone, Default)]
pub struct SerialMap {
    pub packers: Vec<(Type, String)>,
    pub unpackers: Vec<(Type, String)>,
    pub generic_packer: Option<String>,
    pub generic_unpacker: Option<String>,
    /// Source files declaring the (un)packers; imported by the pool
    pub sources: Vec<PathBuf>,
}

impl SerialMap {
    /// The packer for a type, falling back to the generic entry
    pub fn packer_for(&self, ty: Option<&Type>) -> Option<&str> {
        lookup(&self.packers, ty).or(self.generic_packer.as_deref())
    }

    /// The unpacker for a type, falling back to the generic entry
    pub fn unpacker_for(&self, ty: Option<&Type>) -> Option<&str> {
        lookup(&self.unpackers, ty).or(self.generic_unpacker.as_deref())
    }

    fn add_source(&mut self, path: &PathBuf) {
        if !self.sources.contains(path) {
            self.sources.push(path.clone());
        }
    }
}

fn lookup<'a>(entries: &'a [(Type, String)], ty: Option<&Type>) -> Option<&'a str> {
    let ty = ty?.unqualified();
    entries
        .iter()
        .find(|(key, _)| key == ty)
        .map(|(_, name)| name.as_str())
}

/// Scan every realization's concrete signature for `pack` and `unpack`
/// properties and derive one `SerialMap` per language.
pub fn plan(table: &TermTable) -> HashMap<Lang, SerialMap> {
    let mut maps: HashMap<Lang, SerialMap> = HashMap::new();
    let mut seen: Vec<(Lang, String, bool)> = Vec::new();

    for (_, tt) in table.iter_terms() {
        for r in &tt.concrete {
            let etype = match &r.concrete_type {
                Some(e) => e,
                None => continue,
            };
            let is_pack = etype.is_packer();
            let is_unpack = etype.is_unpacker();
            if !is_pack && !is_unpack {
                continue;
            }
            // the same source may be visible from several modules
            let key = (r.lang.clone(), r.source_name.clone(), is_pack);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            let map = maps.entry(r.lang.clone()).or_default();
            if let Some(path) = &r.source_path {
                map.add_source(path);
            }
            let domain = match etype.ty.args().first() {
                Some(d) => (*d).clone(),
                None => continue,
            };
            let generic = matches!(domain.unqualified(), Type::Var(v) if is_var_like(v));
            if is_pack {
                if generic {
                    map.generic_packer.get_or_insert(r.source_name.clone());
                } else {
                    map.packers.push((domain.clone(), r.source_name.clone()));
                }
            }
            if is_unpack {
                if generic {
                    map.generic_unpacker.get_or_insert(r.source_name.clone());
                } else {
                    map.unpackers.push((domain, r.source_name.clone()));
                }
            }
        }
    }

    for (lang, map) in &maps {
        debug!(
            "serial plan for {}: {} packers, {} unpackers, generic pack={:?} unpack={:?}",
            lang,
            map.packers.len(),
            map.unpackers.len(),
            map.generic_packer,
            map.generic_unpacker
        );
    }
    maps
}

/// A lowercase single-word name is a type variable; anything capitalized is
/// a ground type
fn is_var_like(v: &crate::ast::TVar) -> bool {
    v.name
        .chars()
        .next()
        .map(|c| c.is_lowercase())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{EType, EVar, Expr, ExprI, MVar, Module, Property, Source, TVar};
    use crate::dag::ModuleDag;

    fn psig(name: &str, lang: &str, ty: Type, prop: Property) -> ExprI {
        ExprI::new(
            0,
            Expr::Signature {
                name: EVar::new(name),
                lang: Some(Lang::new(lang)),
                etype: EType::new(ty).with_prop(prop),
            },
        )
    }

    fn src(lang: &str, path: &str, names: &[(&str, &str)]) -> ExprI {
        ExprI::new(
            0,
            Expr::Source(Source {
                lang: Lang::new(lang),
                path: Some(PathBuf::from(path)),
                names: names
                    .iter()
                    .map(|(r, a)| (r.to_string(), EVar::new(*a)))
                    .collect(),
            }),
        )
    }

    fn plan_for(body: Vec<ExprI>) -> HashMap<Lang, SerialMap> {
        let mut module = Module {
            name: MVar::new("Main"),
            exports: vec![],
            imports: vec![],
            body,
        };
        let mut counter = 0;
        module.ensure_indexes(&mut counter);
        let dag = ModuleDag::resolve(vec![module]).unwrap();
        let table = TermTable::build(&dag).unwrap();
        plan(&table)
    }

    #[test]
    fn generic_packers_come_from_variable_domains() {
        let maps = plan_for(vec![
            src("py", "serial.py", &[("packGeneral", "pack"), ("unpackGeneral", "unpack")]),
            psig(
                "pack",
                "py",
                Type::arrow(Type::var("a"), Type::var("Str")),
                Property::Pack,
            ),
            psig(
                "unpack",
                "py",
                Type::arrow(Type::var("a"), Type::var("b")),
                Property::Unpack,
            ),
        ]);
        let map = &maps[&Lang::new("py")];
        assert_eq!(map.generic_packer.as_deref(), Some("packGeneral"));
        assert_eq!(map.generic_unpacker.as_deref(), Some("unpackGeneral"));
        assert_eq!(map.sources, vec![PathBuf::from("serial.py")]);
    }

    #[test]
    fn typed_packer_is_keyed_by_first_argument() {
        let maps = plan_for(vec![
            src("py", "serial.py", &[("packDouble", "packD")]),
            psig(
                "packD",
                "py",
                Type::arrow(Type::var("Double"), Type::var("Str")),
                Property::Pack,
            ),
        ]);
        let map = &maps[&Lang::new("py")];
        assert_eq!(
            map.packer_for(Some(&Type::var("Double"))),
            Some("packDouble")
        );
        // no generic fallback declared
        assert_eq!(map.packer_for(Some(&Type::var("Int"))), None);
    }

    #[test]
    fn typed_lookup_falls_back_to_generic() {
        let maps = plan_for(vec![
            src(
                "py",
                "serial.py",
                &[("packDouble", "packD"), ("packGeneral", "pack")],
            ),
            psig(
                "packD",
                "py",
                Type::arrow(Type::var("Double"), Type::var("Str")),
                Property::Pack,
            ),
            psig(
                "pack",
                "py",
                Type::arrow(Type::var("a"), Type::var("Str")),
                Property::Pack,
            ),
        ]);
        let map = &maps[&Lang::new("py")];
        assert_eq!(
            map.packer_for(Some(&Type::var("Double"))),
            Some("packDouble")
        );
        assert_eq!(map.packer_for(Some(&Type::var("Int"))), Some("packGeneral"));
        assert_eq!(map.packer_for(None), Some("packGeneral"));
    }

    #[test]
    fn quantified_variable_domain_is_generic() {
        let maps = plan_for(vec![
            src("R", "serial.R", &[("pack_r", "pack")]),
            psig(
                "pack",
                "R",
                Type::Forall(
                    TVar::gen("a"),
                    Box::new(Type::arrow(Type::var("a"), Type::var("character"))),
                ),
                Property::Pack,
            ),
        ]);
        let map = &maps[&Lang::new("R")];
        assert_eq!(map.generic_packer.as_deref(), Some("pack_r"));
    }

    #[test]
    fn languages_are_planned_independently() {
        let maps = plan_for(vec![
            src("py", "serial.py", &[("py_pack", "pack")]),
            src("R", "serial.R", &[("r_pack", "rpack")]),
            psig(
                "pack",
                "py",
                Type::arrow(Type::var("a"), Type::var("Str")),
                Property::Pack,
            ),
            psig(
                "rpack",
                "R",
                Type::arrow(Type::var("a"), Type::var("character")),
                Property::Pack,
            ),
        ]);
        assert_eq!(maps.len(), 2);
        assert_eq!(
            maps[&Lang::new("py")].generic_packer.as_deref(),
            Some("py_pack")
        );
        assert_eq!(
            maps[&Lang::new("R")].generic_packer.as_deref(),
            Some("r_pack")
        );
    }
}
