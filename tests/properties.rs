//! Property-based tests for the middle end
//!
//! These pin the laws from the design: alias substitution is idempotent,
//! full-import alias maps are identity maps, general-type merging is
//! reflexive, and manifold ids stay dense and pre-ordered over arbitrary
//! call trees.

use proptest::prelude::*;

use morloc::alias::{equivalent, expand, AliasDef, AliasEnv};
use morloc::ast::{EType, ExprI, Import, MVar, TVar, Type};
use morloc::compile::{compile, Config};
use morloc::dag::ModuleDag;
use morloc::manifold::build_manifolds;
use morloc::termtypes::{merge_general, TermTable};
use morloc::test_support::*;

// ============================================================================
// Generators
// ============================================================================

/// Ground types over a small vocabulary, with arrows and applications
fn arb_ground_type(depth: u32) -> BoxedStrategy<Type> {
    if depth == 0 {
        prop_oneof![
            Just(Type::var("Int")),
            Just(Type::var("Str")),
            Just(Type::var("Bool")),
        ]
        .boxed()
    } else {
        prop_oneof![
            3 => Just(Type::var("Int")),
            3 => Just(Type::var("Str")),
            2 => (arb_ground_type(depth - 1), arb_ground_type(depth - 1))
                .prop_map(|(a, b)| Type::arrow(a, b)),
            1 => prop::collection::vec(arb_ground_type(depth - 1), 1..3)
                .prop_map(|args| Type::App(TVar::gen("List"), args)),
        ]
        .boxed()
    }
}

/// Types that may also mention the alias name `T`
fn arb_type_with_alias(depth: u32) -> BoxedStrategy<Type> {
    if depth == 0 {
        prop_oneof![
            Just(Type::var("Int")),
            Just(Type::var("T")),
        ]
        .boxed()
    } else {
        prop_oneof![
            2 => Just(Type::var("Int")),
            2 => Just(Type::var("T")),
            1 => (arb_type_with_alias(depth - 1), arb_type_with_alias(depth - 1))
                .prop_map(|(a, b)| Type::arrow(a, b)),
        ]
        .boxed()
    }
}

/// Call trees `f(...)` over a single bound variable `x`
fn arb_call_tree(depth: u32) -> BoxedStrategy<ExprI> {
    if depth == 0 {
        Just(var("x")).boxed()
    } else {
        prop_oneof![
            2 => Just(var("x")),
            1 => prop::collection::vec(arb_call_tree(depth - 1), 1..3)
                .prop_map(|children| call("f", children)),
        ]
        .boxed()
    }
}

fn count_applications(e: &ExprI) -> usize {
    match &e.expr {
        morloc::ast::Expr::App { args, .. } => {
            1 + args.iter().map(count_applications).sum::<usize>()
        }
        _ => 0,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn alias_expansion_is_idempotent(ty in arb_type_with_alias(4), body in arb_ground_type(3)) {
        let mut env = AliasEnv::default();
        env.insert("T".to_string(), AliasDef { params: vec![], body }).unwrap();
        let once = expand(&ty, &env).unwrap();
        let twice = expand(&once, &env).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn expansion_leaves_alias_free_types_alone(ty in arb_ground_type(4)) {
        let env = AliasEnv::default();
        prop_assert_eq!(expand(&ty, &env).unwrap(), ty);
    }

    #[test]
    fn equivalence_is_reflexive(ty in arb_ground_type(4)) {
        prop_assert!(equivalent(&ty, &ty));
    }

    #[test]
    fn general_type_merge_is_reflexive(ty in arb_ground_type(4)) {
        let e = EType::new(ty.clone());
        let merged = merge_general(&e, &e).unwrap();
        prop_assert_eq!(merged.ty, ty);
    }

    #[test]
    fn full_import_alias_maps_are_identities(
        names in prop::collection::hash_set("[a-z]{1,8}", 1..8)
    ) {
        let mut lib = ModuleBuilder::new("Lib");
        for name in &names {
            lib = lib.export(name);
        }
        let main = ModuleBuilder::new("Main").import(Import::all("Lib")).build();
        let mut modules = vec![main, lib.build()];
        index(&mut modules);
        let dag = ModuleDag::resolve(modules).unwrap();
        let edges = dag.imports_of(&MVar::new("Main"));
        prop_assert_eq!(edges[0].aliases.len(), names.len());
        for (remote, local) in &edges[0].aliases {
            prop_assert_eq!(remote, local);
        }
    }

    #[test]
    fn manifold_ids_stay_dense_over_arbitrary_trees(tree in arb_call_tree(4)) {
        // wrap the generated tree so the root is always an application
        let body = call("f", vec![tree]);
        let expected = count_applications(&body);
        let main = ModuleBuilder::new("Main")
            .export("go")
            .item(src("py", "lib.py", &[("f_impl", "f")]))
            .item(decl("go", lam(&["x"], body)))
            .build();
        let mut modules = vec![main];
        index(&mut modules);
        let dag = ModuleDag::resolve(modules).unwrap();
        let table = TermTable::build(&dag).unwrap();
        let graph = build_manifolds(&dag, &table).unwrap();
        prop_assert_eq!(graph.manifolds.len(), expected);
        graph.validate().unwrap();
        // exactly one root, and it is the outermost application
        prop_assert_eq!(graph.roots.len(), 1);
        prop_assert_eq!(graph.roots[0], 0);
    }

    #[test]
    fn compilation_of_arbitrary_trees_emits_a_dispatching_pool(tree in arb_call_tree(3)) {
        let body = call("f", vec![tree]);
        let main = ModuleBuilder::new("Main")
            .export("go")
            .items(serialization("py"))
            .item(src("py", "lib.py", &[("f_impl", "f")]))
            .item(decl("go", lam(&["x"], body)))
            .build();
        let artifacts = compile(vec![main], &Config::default()).unwrap();
        let pool = artifacts.pool("pool.py").unwrap();
        prop_assert!(pool.contents.contains("def m0(x):"));
        prop_assert!(pool.contents.contains("if mid == 0:"));
        prop_assert!(artifacts.nexus.contents.contains("\"go\": (0,"));
    }
}
