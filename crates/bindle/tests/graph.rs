mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bindle::utils::{hash16, xor16};
use bindle::{
    bindle, BuildError, External, Plugin, PluginContext, PluginResult, PureExternalModules,
    ResolveDynamicImportArgs, ResolveIdResult, Treeshake, TreeshakeOptions, WarningCode,
};

use common::{fixture, fixture_with, module_id, options_for, TransformCounter, VirtualFs};

#[tokio::test]
async fn two_entries_share_a_pure_helper_without_a_shared_chunk() {
    // S1: the pure helper tree-shakes away, leaving one chunk per entry
    let mut bundler = fixture(
        &[("a", "./a.js"), ("b", "./b.js")],
        &[
            ("a.js", "import \"./shared\";\nexport const x = 1;\n"),
            ("b.js", "import \"./shared\";\nexport const y = 2;\n"),
            ("shared.js", "export const unused = 42;\n"),
        ],
    );
    let output = bundler.build().await.expect("build should succeed");
    assert_eq!(output.chunk_graph.chunks.len(), 2);

    let shared = &bundler.graph.module_by_id[&module_id("shared.js")];
    let mut expected = [0u8; 16];
    xor16(&mut expected, &hash16(module_id("a.js").as_ref()));
    xor16(&mut expected, &hash16(module_id("b.js").as_ref()));
    assert_eq!(shared.entry_points_hash, expected);

    let entry_chunk = output
        .chunk_graph
        .entry_chunk(&module_id("a.js"))
        .expect("entry a has a chunk");
    assert!(entry_chunk
        .exports
        .iter()
        .any(|export| export.exported == bindle::JsWord::from("x")));
}

#[tokio::test]
async fn two_entries_share_an_effectful_helper_in_a_third_chunk() {
    // S1, the other half: a side effect keeps the helper alive
    let mut bundler = fixture(
        &[("a", "./a.js"), ("b", "./b.js")],
        &[
            ("a.js", "import \"./shared\";\nexport const x = 1;\n"),
            ("b.js", "import \"./shared\";\nexport const y = 2;\n"),
            ("shared.js", "console.log(\"boot\");\n"),
        ],
    );
    let output = bundler.build().await.expect("build should succeed");
    assert_eq!(output.chunk_graph.chunks.len(), 3);
    let shared_chunk = output
        .chunk_graph
        .chunk_of(&module_id("shared.js"))
        .expect("shared module has a chunk");
    assert!(shared_chunk.entry_module.is_none());
}

#[tokio::test]
async fn static_cycles_are_reported_once_and_still_ordered() {
    // S2
    let mut bundler = fixture(
        &[("a", "./a.js")],
        &[
            (
                "a.js",
                "import { b } from \"./b\";\nexport const a = 1;\nconsole.log(b);\n",
            ),
            (
                "b.js",
                "import { a } from \"./a\";\nexport const b = 2;\nconsole.log(a);\n",
            ),
        ],
    );
    let output = bundler.build().await.expect("cycles are not fatal");

    assert_eq!(output.cycle_paths.len(), 1);
    let path = &output.cycle_paths[0];
    assert_eq!(path.len(), 3);
    assert_eq!(path.first(), path.last());
    assert!(path.iter().any(|step| step.ends_with("b.js")));

    let circular: Vec<_> = output
        .warnings
        .iter()
        .filter(|warning| warning.code == WarningCode::CircularDependency)
        .collect();
    assert_eq!(circular.len(), 1);

    assert!(output.ordered_modules.contains(&module_id("a.js")));
    assert!(output.ordered_modules.contains(&module_id("b.js")));
}

#[tokio::test]
async fn export_all_flattens_and_only_used_declarations_survive() {
    // S3
    let mut bundler = fixture(
        &[("main", "./main.js")],
        &[
            (
                "main.js",
                "import { foo } from \"./m\";\nconsole.log(foo);\n",
            ),
            ("m.js", "export * from \"./n\";\n"),
            ("n.js", "export const foo = 1;\nexport const bar = 2;\n"),
        ],
    );
    bundler.build().await.expect("build should succeed");

    let m = &bundler.graph.module_by_id[&module_id("m.js")];
    assert_eq!(
        m.exports_all.get(&bindle::JsWord::from("foo")),
        Some(&module_id("n.js"))
    );
    assert_eq!(
        m.exports_all.get(&bindle::JsWord::from("bar")),
        Some(&module_id("n.js"))
    );

    let n = &bundler.graph.module_by_id[&module_id("n.js")];
    let foo_stmt = n
        .statements
        .iter()
        .find(|stmt| stmt.defines.contains(&bindle::JsWord::from("foo")))
        .expect("foo declaration exists");
    let bar_stmt = n
        .statements
        .iter()
        .find(|stmt| stmt.defines.contains(&bindle::JsWord::from("bar")))
        .expect("bar declaration exists");
    assert!(foo_stmt.included);
    assert!(!bar_stmt.included);
}

#[tokio::test]
async fn dynamic_imports_become_their_own_chunk_roots() {
    // S4
    let mut bundler = fixture(
        &[("main", "./main.js")],
        &[
            ("main.js", "const p = import(\"./lazy\");\nconsole.log(p);\n"),
            ("lazy.js", "export const value = 1;\n"),
        ],
    );
    let output = bundler.build().await.expect("build should succeed");

    assert_eq!(output.dynamic_imports, vec![module_id("lazy.js")]);
    assert_eq!(output.dynamic_import_aliases, vec!["lazy".to_string()]);
    assert_eq!(output.chunk_graph.chunks.len(), 2);

    let lazy_chunk = output
        .chunk_graph
        .chunk_of(&module_id("lazy.js"))
        .expect("lazy has a chunk");
    assert_eq!(lazy_chunk.entry_module, Some(module_id("lazy.js")));
    let main_chunk = output
        .chunk_graph
        .chunk_of(&module_id("main.js"))
        .expect("main has a chunk");
    assert_ne!(main_chunk.id, lazy_chunk.id);
}

#[tokio::test]
async fn inline_dynamic_imports_collapses_into_one_chunk() {
    // S5
    let mut options = options_for(&[]);
    options.inline_dynamic_imports = true;
    let mut bundler = fixture_with(
        options,
        &[("main", "./main.js")],
        &[
            ("main.js", "const p = import(\"./lazy\");\nconsole.log(p);\n"),
            ("lazy.js", "export const value = 1;\n"),
        ],
    );
    let output = bundler.build().await.expect("build should succeed");

    assert!(output.dynamic_imports.is_empty());
    assert_eq!(output.chunk_graph.chunks.len(), 1);
    let chunk = &output.chunk_graph.chunks[0];
    assert!(chunk.modules.contains(&module_id("main.js")));
    assert!(chunk.modules.contains(&module_id("lazy.js")));

    // the lazy module's public exports were marked
    let lazy = &bundler.graph.module_by_id[&module_id("lazy.js")];
    assert!(lazy
        .statements
        .iter()
        .any(|stmt| stmt.included && stmt.defines.contains(&bindle::JsWord::from("value"))));
}

#[tokio::test]
async fn missing_exports_are_fatal_unless_shimmed() {
    // S6
    let files = [
        (
            "main.js",
            "import { missing } from \"./m\";\nconsole.log(missing);\n",
        ),
        ("m.js", "export const other = 1;\n"),
    ];

    let mut strict = fixture(&[("main", "./main.js")], &files);
    let err = strict.build().await.expect_err("missing export is fatal");
    match &err {
        BuildError::MissingExport {
            binding,
            importer,
            source,
        } => {
            assert_eq!(binding, "missing");
            assert!(importer.ends_with("main.js"));
            assert!(source.ends_with("m.js"));
        }
        other => panic!("expected MissingExport, got {:?}", other),
    }

    let mut options = options_for(&[]);
    options.shim_missing_exports = true;
    let mut shimmed = fixture_with(options, &[("main", "./main.js")], &files);
    shimmed.build().await.expect("shim makes it build");
    let m = &shimmed.graph.module_by_id[&module_id("m.js")];
    assert!(m.shimmed_exports.contains(&bindle::JsWord::from("missing")));
}

#[tokio::test]
async fn builds_are_deterministic() {
    // property 5
    let build = || async {
        let mut bundler = fixture(
            &[("a", "./a.js"), ("b", "./b.js")],
            &[
                (
                    "a.js",
                    "import { helper } from \"./shared\";\nimport \"pkg\";\nexport const x = helper();\n",
                ),
                (
                    "b.js",
                    "import { helper } from \"./shared\";\nexport const y = helper();\n",
                ),
                ("shared.js", "export function helper() { return 1; }\n"),
            ],
        );
        let output = bundler.build().await.expect("build should succeed");
        let modules = bundler.graph.modules.clone();
        let chunk_ids: Vec<String> = output
            .chunk_graph
            .chunks
            .iter()
            .map(|chunk| chunk.id.clone())
            .collect();
        let warnings: Vec<String> = output
            .warnings
            .iter()
            .map(|warning| warning.to_string())
            .collect();
        (modules, chunk_ids, warnings)
    };
    let first = build().await;
    let second = build().await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn modules_register_in_dfs_pre_order_of_static_imports() {
    let mut bundler = fixture(
        &[("main", "./main.js")],
        &[
            ("main.js", "import \"./a\";\nimport \"./b\";\nconsole.log(1);\n"),
            ("a.js", "import \"./c\";\nconsole.log(2);\n"),
            ("b.js", "console.log(3);\n"),
            ("c.js", "console.log(4);\n"),
        ],
    );
    bundler.build().await.expect("build should succeed");
    assert_eq!(
        bundler.graph.modules,
        vec![
            module_id("main.js"),
            module_id("a.js"),
            module_id("c.js"),
            module_id("b.js"),
        ]
    );
}

#[tokio::test]
async fn topological_order_puts_dependencies_first() {
    // property 2
    let mut bundler = fixture(
        &[("main", "./main.js")],
        &[
            (
                "main.js",
                "import { a } from \"./a\";\nimport { b } from \"./b\";\nconsole.log(a, b);\n",
            ),
            ("a.js", "export const a = 1;\n"),
            ("b.js", "import { a } from \"./a\";\nexport const b = a;\n"),
        ],
    );
    let output = bundler.build().await.expect("build should succeed");
    let position = |id: &bindle::JsWord| {
        output
            .ordered_modules
            .iter()
            .position(|candidate| candidate == id)
            .expect("module ordered")
    };
    assert!(position(&module_id("a.js")) < position(&module_id("main.js")));
    assert!(position(&module_id("a.js")) < position(&module_id("b.js")));
    assert!(position(&module_id("b.js")) < position(&module_id("main.js")));
}

#[tokio::test]
async fn unresolved_bare_imports_warn_and_become_external() {
    let mut bundler = fixture(
        &[("main", "./main.js")],
        &[(
            "main.js",
            "import pkg from \"some-pkg\";\nexport const out = pkg;\n",
        )],
    );
    let output = bundler.build().await.expect("bare imports are not fatal");
    assert!(output
        .warnings
        .iter()
        .any(|warning| warning.code == WarningCode::UnresolvedImport));
    assert!(bundler
        .graph
        .external_modules
        .contains_key(&bindle::JsWord::from("some-pkg")));
}

#[tokio::test]
async fn unused_external_imports_warn() {
    let mut options = options_for(&[]);
    options.external = External::Ids(vec!["pkg".to_string()]);
    let mut bundler = fixture_with(
        options,
        &[("main", "./main.js")],
        &[(
            "main.js",
            "import { used, unused } from \"pkg\";\nexport const out = used;\n",
        )],
    );
    let output = bundler.build().await.expect("build should succeed");
    let unused: Vec<_> = output
        .warnings
        .iter()
        .filter(|warning| warning.code == WarningCode::UnusedExternalImport)
        .collect();
    assert_eq!(unused.len(), 1);
    assert!(unused[0].message.contains("unused"));
}

#[tokio::test]
async fn namespace_conflicts_keep_the_first_binding_and_warn() {
    let mut bundler = fixture(
        &[("main", "./main.js")],
        &[
            (
                "main.js",
                "import { shared } from \"./facade\";\nconsole.log(shared);\n",
            ),
            (
                "facade.js",
                "export * from \"./one\";\nexport * from \"./two\";\n",
            ),
            ("one.js", "export const shared = 1;\n"),
            ("two.js", "export const shared = 2;\n"),
        ],
    );
    let output = bundler.build().await.expect("build should succeed");
    assert!(output
        .warnings
        .iter()
        .any(|warning| warning.code == WarningCode::NamespaceConflict));
    let facade = &bundler.graph.module_by_id[&module_id("facade.js")];
    assert_eq!(
        facade.exports_all.get(&bindle::JsWord::from("shared")),
        Some(&module_id("one.js"))
    );
}

#[tokio::test]
async fn warm_cache_skips_the_transform_chain() {
    // property 6
    let files = [
        ("main.js", "import { a } from \"./a\";\nexport const out = a;\n"),
        ("a.js", "export const a = 1;\n"),
    ];
    let calls = Arc::new(AtomicUsize::new(0));
    let make = |cache, calls: Arc<AtomicUsize>| {
        let mut options = options_for(&[("main", "./main.js")]);
        options.cache = cache;
        bindle(
            options,
            vec![
                Box::new(VirtualFs::new(&files)) as Box<dyn Plugin>,
                Box::new(TransformCounter { calls }),
            ],
        )
    };

    let mut cold = make(None, calls.clone());
    cold.build().await.expect("cold build succeeds");
    let after_cold = calls.load(Ordering::SeqCst);
    assert_eq!(after_cold, 2);

    let cache = cold.get_cache();
    assert_eq!(cache.modules.len(), 2);

    let mut warm = make(Some(cache), calls.clone());
    warm.build().await.expect("warm build succeeds");
    assert_eq!(calls.load(Ordering::SeqCst), after_cold);
}

#[derive(Debug)]
struct DynamicRewriter;

#[async_trait]
impl Plugin for DynamicRewriter {
    fn name(&self) -> &'static str {
        "dynamic-rewriter"
    }

    async fn resolve_dynamic_import(
        &self,
        _ctx: &PluginContext,
        args: ResolveDynamicImportArgs<'_>,
    ) -> PluginResult<Option<ResolveIdResult>> {
        Ok(match args.specifier {
            Some("./lazy") => Some(ResolveIdResult::Id("rewritten-pkg".to_string())),
            _ => None,
        })
    }
}

#[tokio::test]
async fn dynamic_imports_rewritten_to_externals_register_the_external_module() {
    // the replacement id must map to the external module, not the importer
    let mut options = options_for(&[]);
    options.external = External::Ids(vec!["rewritten-pkg".to_string()]);
    let mut bundler = bindle(
        {
            let mut o = options;
            o.input = vec![bindle::InputItem::new("main", "./main.js")];
            o.root = common::ROOT.to_string();
            o
        },
        vec![
            Box::new(VirtualFs::new(&[(
                "main.js",
                "const p = import(\"./lazy\");\nconsole.log(p);\n",
            )])) as Box<dyn Plugin>,
            Box::new(DynamicRewriter),
        ],
    );
    bundler.build().await.expect("build should succeed");

    let replacement = bindle::JsWord::from("rewritten-pkg");
    assert!(!bundler.graph.module_by_id.contains_key(&replacement));
    let external = bundler
        .graph
        .external_modules
        .get(&replacement)
        .expect("external registered under the replacement id");
    assert!(external.exports_namespace);
}

#[tokio::test]
async fn pure_external_side_effect_imports_are_dropped() {
    let files = [("main.js", "import \"polyfill\";\nexport const a = 1;\n")];

    let build = |pure| async move {
        let mut options = options_for(&[]);
        options.external = External::Ids(vec!["polyfill".to_string()]);
        options.treeshake = Treeshake::Enabled(TreeshakeOptions {
            pure_external_modules: PureExternalModules::Bool(pure),
            ..Default::default()
        });
        let mut bundler = fixture_with(options, &[("main", "./main.js")], &files);
        let output = bundler.build().await.expect("build should succeed");
        let chunk = output
            .chunk_graph
            .chunk_of(&module_id("main.js"))
            .expect("main chunk")
            .imports
            .iter()
            .any(|import| {
                matches!(&import.from, bindle::ChunkTarget::External(id) if id.as_ref() == "polyfill")
            });
        chunk
    };

    assert!(build(false).await, "impure externals keep the import");
    assert!(!build(true).await, "pure externals drop the import");
}

#[tokio::test]
async fn configuration_contradictions_are_fatal() {
    let files = [("a.js", "export const a = 1;\n"), ("b.js", "export const b = 2;\n")];

    let mut empty = fixture(&[], &files);
    assert!(matches!(
        empty.build().await,
        Err(BuildError::InvalidOption { .. })
    ));

    let mut options = options_for(&[]);
    options.inline_dynamic_imports = true;
    let mut inline = fixture_with(options, &[("a", "./a.js"), ("b", "./b.js")], &files);
    assert!(matches!(
        inline.build().await,
        Err(BuildError::InvalidOption { .. })
    ));

    let mut duplicate = fixture(&[("a", "./a.js"), ("again", "./a.js")], &files);
    assert!(matches!(
        duplicate.build().await,
        Err(BuildError::DuplicateEntryPoints { .. })
    ));

    let mut options = options_for(&[]);
    options.external = External::Ids(vec!["\0plugin-helper".to_string()]);
    let mut null_external = fixture_with(options, &[("a", "./a.js")], &files);
    assert!(matches!(
        null_external.build().await,
        Err(BuildError::InvalidExternalId { .. })
    ));

    let mut options = options_for(&[]);
    options.external = External::Fn(std::sync::Arc::new(|id, _, _| id.ends_with("a.js")));
    let mut external_entry = fixture_with(options, &[("a", "./a.js")], &files);
    assert!(matches!(
        external_entry.build().await,
        Err(BuildError::UnresolvedEntry { .. })
    ));
}

#[tokio::test]
async fn a_graph_is_single_use() {
    let mut bundler = fixture(&[("a", "./a.js")], &[("a.js", "export const a = 1;\n")]);
    bundler.build().await.expect("first build succeeds");
    assert!(matches!(
        bundler.build().await,
        Err(BuildError::AlreadyBuilt)
    ));
}

#[tokio::test]
async fn treeshaking_disabled_includes_everything() {
    let mut options = options_for(&[]);
    options.treeshake = Treeshake::Disabled;
    let mut bundler = fixture_with(
        options,
        &[("main", "./main.js")],
        &[
            ("main.js", "import { a } from \"./a\";\nexport const out = a;\n"),
            ("a.js", "export const a = 1;\nconst dead = 2;\n"),
        ],
    );
    bundler.build().await.expect("build should succeed");
    let a = &bundler.graph.module_by_id[&module_id("a.js")];
    assert!(a.statements.iter().all(|stmt| stmt.included));
}

#[tokio::test]
async fn namespace_imports_force_all_exports_in() {
    let mut bundler = fixture(
        &[("main", "./main.js")],
        &[
            (
                "main.js",
                "import * as ns from \"./m\";\nconsole.log(ns);\n",
            ),
            ("m.js", "export const a = 1;\nexport const b = 2;\nconst dead = 3;\n"),
        ],
    );
    bundler.build().await.expect("build should succeed");
    let m = &bundler.graph.module_by_id[&module_id("m.js")];
    assert!(m.namespace_needed);
    let included_defines: Vec<_> = m
        .statements
        .iter()
        .filter(|stmt| stmt.included)
        .flat_map(|stmt| stmt.defines.iter().cloned())
        .collect();
    assert!(included_defines.contains(&bindle::JsWord::from("a")));
    assert!(included_defines.contains(&bindle::JsWord::from("b")));
    assert!(!included_defines.contains(&bindle::JsWord::from("dead")));
}
