//! Nexus emission
//!
//! The nexus is the single user-facing entry point: a dispatcher script
//! exposing one subcommand per exported root manifold. Each subcommand
//! forwards `<manifold-id> <arg>...` to the pool of the manifold's
//! language and propagates the pool's exit status.

use log::debug;

use crate::compile::Config;
use crate::manifold::{Arg, Manifold, ManifoldGraph};

use super::grammar::grammar_for;
use super::pool::pool_name;
use super::{manifold_lang, EmitError};

/// The nexus file name; the dispatcher itself is a Python script
pub const NEXUS_NAME: &str = "nexus.py";

/// Emit the nexus dispatcher over the graph's root manifolds
pub fn emit_nexus(graph: &ManifoldGraph, config: &Config) -> Result<String, EmitError> {
    let mut commands = Vec::new();
    for id in &graph.roots {
        let m = graph.get(*id).expect("validated root id");
        let lang = manifold_lang(m, &config.default_lang);
        let grammar = grammar_for(&lang)?;
        let executor = config.executor_for(&lang)?;
        let name = m
            .composition
            .as_ref()
            .unwrap_or(&m.morloc_name)
            .as_str()
            .to_string();
        let signature = m
            .abstract_type
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string());
        commands.push((
            name,
            m.id,
            executor.to_string(),
            pool_name(grammar.as_ref()),
            cli_arity(m),
            signature,
        ));
    }
    debug!("nexus: {} subcommands", commands.len());

    let mut out = String::new();
    out.push_str("#!/usr/bin/env python3\n");
    out.push('\n');
    out.push_str("import subprocess\n");
    out.push_str("import sys\n");
    out.push('\n');
    out.push_str("COMMANDS = {\n");
    for (name, mid, executor, pool, nargs, signature) in &commands {
        out.push_str(&format!(
            "    \"{}\": ({}, \"{}\", \"{}\", {}, \"{}\"),\n",
            name,
            mid,
            executor,
            pool,
            nargs,
            signature.replace('"', "\\\"")
        ));
    }
    out.push_str("}\n");
    out.push('\n');
    out.push_str("def usage(out):\n");
    out.push_str("    out.write(\"Usage: nexus <command> [arguments]\\n\")\n");
    out.push_str("    out.write(\"\\n\")\n");
    out.push_str("    out.write(\"Commands:\\n\")\n");
    out.push_str("    for name in sorted(COMMANDS):\n");
    out.push_str("        _, _, _, _, signature = COMMANDS[name]\n");
    out.push_str("        out.write(\"  {}  {}\\n\".format(name, signature))\n");
    out.push('\n');
    out.push_str("def main():\n");
    out.push_str("    if len(sys.argv) < 2:\n");
    out.push_str("        usage(sys.stderr)\n");
    out.push_str("        return 1\n");
    out.push_str("    cmd = sys.argv[1]\n");
    out.push_str("    if cmd in (\"-h\", \"--help\"):\n");
    out.push_str("        usage(sys.stdout)\n");
    out.push_str("        return 0\n");
    out.push_str("    if cmd not in COMMANDS:\n");
    out.push_str("        sys.stderr.write(\"unknown command: {}\\n\".format(cmd))\n");
    out.push_str("        usage(sys.stderr)\n");
    out.push_str("        return 1\n");
    out.push_str("    mid, executor, pool, nargs, _ = COMMANDS[cmd]\n");
    out.push_str("    args = sys.argv[2:]\n");
    out.push_str("    if len(args) != nargs:\n");
    out.push_str(
        "        sys.stderr.write(\"{} expects {} arguments, got {}\\n\".format(cmd, nargs, len(args)))\n",
    );
    out.push_str("        return 1\n");
    out.push_str("    return subprocess.call([executor, pool, str(mid)] + args)\n");
    out.push('\n');
    out.push_str("if __name__ == \"__main__\":\n");
    out.push_str("    sys.exit(main())\n");
    Ok(out)
}

/// How many positional arguments the subcommand takes
fn cli_arity(m: &Manifold) -> usize {
    if !m.bound_vars.is_empty() {
        return m.bound_vars.len();
    }
    m.args
        .iter()
        .filter(|a| matches!(a, Arg::Positional(_)))
        .count()
}
