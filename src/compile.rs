//! The compilation pipeline
//!
//! Wires the passes together: ingestion, DAG resolution, alias
//! desugaring, term-type collection, manifold construction, serialization
//! planning, and emission. Artifacts are rendered fully in memory and
//! written only after every pass has succeeded, so a failing compilation
//! leaves nothing on disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::alias;
use crate::ast::{Lang, Module};
use crate::codegen::{self, nexus::NEXUS_NAME, EmitError};
use crate::dag::ModuleDag;
use crate::error::MorlocError;
use crate::manifold;
use crate::serial::{self, SerialMap};
use crate::termtypes::TermTable;

/// Compiler configuration: executor commands per language, the library
/// root for resolving source paths, the default language for value
/// manifolds, and the directory artifacts are written into.
#[derive(Debug, Clone)]
pub struct Config {
    pub executors: HashMap<Lang, String>,
    pub lib_root: Option<PathBuf>,
    pub default_lang: Lang,
    pub out_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let mut executors = HashMap::new();
        executors.insert(Lang::new("py"), "python3".to_string());
        executors.insert(Lang::new("R"), "Rscript".to_string());
        Config {
            executors,
            lib_root: None,
            default_lang: Lang::new("py"),
            out_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// The default configuration with the `MORLOC_LIB` environment
    /// override applied
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(lib) = std::env::var("MORLOC_LIB") {
            if !lib.is_empty() {
                config.lib_root = Some(PathBuf::from(lib));
            }
        }
        config
    }

    pub fn executor_for(&self, lang: &Lang) -> Result<&str, EmitError> {
        self.executors
            .get(lang)
            .map(String::as_str)
            .ok_or_else(|| EmitError::MissingExecutor(lang.clone()))
    }

    /// Resolve a source path against the library root
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.lib_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// One generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub contents: String,
    pub executable: bool,
}

/// The full output of a compilation: the nexus plus one pool per language
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub nexus: Artifact,
    pub pools: Vec<Artifact>,
}

impl Artifacts {
    pub fn pool(&self, name: &str) -> Option<&Artifact> {
        self.pools.iter().find(|p| p.name == name)
    }
}

/// Compile a set of parsed modules into nexus and pool sources
pub fn compile(modules: Vec<Module>, config: &Config) -> Result<Artifacts, MorlocError> {
    let mut modules = modules;
    let mut counter = 0;
    for m in &mut modules {
        m.ensure_indexes(&mut counter);
    }
    debug!("ingested {} modules, {} nodes", modules.len(), counter);

    let mut dag = ModuleDag::resolve(modules)?;
    alias::desugar(&mut dag)?;
    let table = TermTable::build(&dag)?;
    let graph = manifold::build_manifolds(&dag, &table).map_err(MorlocError::Tree)?;
    graph.validate().map_err(MorlocError::Internal)?;

    let serial_maps = serial::plan(&table);
    let langs = graph.languages(&config.default_lang);

    let mut pools = Vec::new();
    for lang in &langs {
        let grammar = codegen::grammar_for(lang)?;
        let map = serial_maps.get(lang).cloned().unwrap_or_else(SerialMap::default);
        let contents = codegen::emit_pool(lang, &graph, &map, config)?;
        pools.push(Artifact {
            name: codegen::pool::pool_name(grammar.as_ref()),
            contents,
            executable: true,
        });
    }

    let nexus = Artifact {
        name: NEXUS_NAME.to_string(),
        contents: codegen::emit_nexus(&graph, config)?,
        executable: true,
    };

    info!(
        "compiled {} root commands into {} pools",
        graph.roots.len(),
        pools.len()
    );
    Ok(Artifacts { nexus, pools })
}

/// Write the artifacts into the configured output directory, marking them
/// executable
pub fn write_artifacts(artifacts: &Artifacts, config: &Config) -> Result<(), MorlocError> {
    let dir = &config.out_dir;
    fs::create_dir_all(dir)?;
    write_one(&artifacts.nexus, dir)?;
    for pool in &artifacts.pools {
        write_one(pool, dir)?;
    }
    Ok(())
}

fn write_one(artifact: &Artifact, dir: &Path) -> Result<(), MorlocError> {
    let path = dir.join(&artifact.name);
    fs::write(&path, &artifact.contents)?;
    if artifact.executable {
        set_executable(&path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_knows_python_and_r() {
        let config = Config::default();
        assert_eq!(config.executor_for(&Lang::new("py")).unwrap(), "python3");
        assert_eq!(config.executor_for(&Lang::new("R")).unwrap(), "Rscript");
        assert!(config.executor_for(&Lang::new("hs")).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_lib_root() {
        let mut config = Config::default();
        config.lib_root = Some(PathBuf::from("/opt/morloc"));
        assert_eq!(
            config.resolve_path(Path::new("lib.py")),
            PathBuf::from("/opt/morloc/lib.py")
        );
        assert_eq!(
            config.resolve_path(Path::new("/abs/lib.py")),
            PathBuf::from("/abs/lib.py")
        );
    }
}
