use std::collections::HashMap as StdHashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashSet;
use hashbrown::{HashMap, HashSet};
use swc_atoms::JsWord;
use swc_common::{sync::Lrc, SourceMap};
use tokio::sync::mpsc;

use crate::utils::{default_resolve, relative_id};
use crate::{
    analyse_module_execution, assign_entry_points_hashes, bind_references, generate_chunks,
    link_dependencies, shake, Asset, BuildCache, BuildError, ChunkGraph, DynamicImportResolution,
    External, ExternalModule, ExternalsById, GlobalScope, InputOptions, JobContext, ModuleById,
    ModuleJob, ModuleJson, Msg, Plugin, PluginDriver, ResolveArgs, ResolveIdResult, ResolvedId,
    Warning, WarningCode, WarningSink,
};

/// Everything one build produces, besides the mutated graph itself.
#[derive(Debug)]
pub struct BuildOutput {
    pub chunk_graph: ChunkGraph,
    pub ordered_modules: Vec<JsWord>,
    pub cycle_paths: Vec<Vec<String>>,
    pub dynamic_imports: Vec<JsWord>,
    pub dynamic_import_aliases: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// Process-wide root of one build. Owns every module, scope and cache; the
/// passes after the fetch phase run sequentially over this single owner.
/// A graph is single-use.
pub struct Graph {
    pub options: Arc<InputOptions>,
    root: Arc<String>,
    plugin_driver: Arc<PluginDriver>,
    pub module_by_id: ModuleById,
    pub external_modules: ExternalsById,
    pub externals_order: Vec<JsWord>,
    /// Non-external module ids in first-registration (DFS pre-) order.
    pub modules: Vec<JsWord>,
    pub entry_modules: Vec<JsWord>,
    pub global_scope: GlobalScope,
    pub watch_files: Arc<DashSet<JsWord>>,
    warm_modules: StdHashMap<String, ModuleJson>,
    entry_aliases: HashMap<JsWord, String>,
    unresolved_warnings: HashSet<(JsWord, JsWord)>,
    cm: Lrc<SourceMap>,
    sink: WarningSink,
    started: bool,
    pub finished: bool,
}

impl Graph {
    pub fn new(options: InputOptions, plugins: Vec<Box<dyn Plugin>>) -> Self {
        let warm_modules: StdHashMap<String, ModuleJson> = options
            .cache
            .as_ref()
            .map(|cache| {
                cache
                    .modules
                    .iter()
                    .map(|module| (module.id.clone(), module.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let plugin_driver = Arc::new(PluginDriver::new(
            plugins,
            options.cache.as_ref().map(|cache| &cache.plugins),
        ));
        let root = Arc::new(options.normalized_root());
        let sink = WarningSink::new(options.on_warn.clone());
        Self {
            options: Arc::new(options),
            root,
            plugin_driver,
            module_by_id: HashMap::new(),
            external_modules: HashMap::new(),
            externals_order: Vec::new(),
            modules: Vec::new(),
            entry_modules: Vec::new(),
            global_scope: GlobalScope::default(),
            watch_files: Arc::new(DashSet::new()),
            warm_modules,
            entry_aliases: HashMap::new(),
            unresolved_warnings: HashSet::new(),
            cm: Default::default(),
            sink,
            started: false,
            finished: false,
        }
    }

    pub async fn build(&mut self) -> Result<BuildOutput, BuildError> {
        if self.started {
            return Err(BuildError::AlreadyBuilt);
        }
        self.started = true;
        self.plugin_driver.build_start();
        let result = self.build_inner().await;
        self.plugin_driver.build_end(result.as_ref().err());
        if result.is_ok() {
            self.finished = true;
        }
        result
    }

    async fn build_inner(&mut self) -> Result<BuildOutput, BuildError> {
        self.validate_options()?;
        self.resolve_entries().await?;
        self.fetch_phase().await?;
        self.finalize_registration_order();
        self.flatten_exports_all();
        self.drain_plugin_warnings();

        let order = self.modules.clone();
        link_dependencies(
            &mut self.module_by_id,
            &mut self.external_modules,
            &order,
            self.options.shim_missing_exports,
        )?;
        let mut late_externals: Vec<JsWord> = self
            .external_modules
            .keys()
            .filter(|external| !self.externals_order.contains(*external))
            .cloned()
            .collect();
        late_externals.sort();
        self.externals_order.extend(late_externals);
        bind_references(
            &mut self.module_by_id,
            &mut self.external_modules,
            &order,
            &mut self.global_scope,
        );

        let analysis = analyse_module_execution(
            &self.module_by_id,
            &self.entry_modules,
            self.options.inline_dynamic_imports,
        );
        for (index, id) in analysis.ordered_modules.iter().enumerate() {
            if let Some(module) = self.module_by_id.get_mut(id) {
                module.exec_order = index;
            }
        }
        for path in &analysis.cycle_paths {
            self.sink.emit(Warning::new(
                WarningCode::CircularDependency,
                format!("Circular dependency: {}", path.join(" -> ")),
            ));
        }
        for (id, alias) in analysis
            .dynamic_imports
            .iter()
            .zip(analysis.dynamic_import_aliases.iter())
        {
            if let Some(module) = self.module_by_id.get_mut(id) {
                if module.chunk_alias.is_none() {
                    module.chunk_alias = Some(alias.clone());
                }
            }
        }

        let mut chunk_roots = self.entry_modules.clone();
        chunk_roots.extend(analysis.dynamic_imports.iter().cloned());
        assign_entry_points_hashes(
            &mut self.module_by_id,
            &chunk_roots,
            self.options.inline_dynamic_imports,
        );

        let mut shake_roots = chunk_roots.clone();
        if self.options.inline_dynamic_imports {
            // inlined dynamic targets still expose their namespace at runtime
            let mut inline_targets = Vec::new();
            for id in &order {
                if let Some(module) = self.module_by_id.get(id) {
                    for target in module.dynamic_depended_module_ids() {
                        if !shake_roots.contains(&target) && !inline_targets.contains(&target) {
                            inline_targets.push(target);
                        }
                    }
                }
            }
            shake_roots.extend(inline_targets);
        }
        shake(
            &mut self.module_by_id,
            &mut self.external_modules,
            &analysis.ordered_modules,
            &shake_roots,
            &self.options.treeshake,
            self.options.shim_missing_exports,
        )?;

        for external_id in &self.externals_order {
            if let Some(external) = self.external_modules.get(external_id) {
                external.warn_unused_imports(&mut self.sink);
            }
        }

        let chunk_graph = generate_chunks(
            &mut self.module_by_id,
            &self.external_modules,
            &analysis.ordered_modules,
            &chunk_roots,
            &self.options,
        )?;

        Ok(BuildOutput {
            chunk_graph,
            ordered_modules: analysis.ordered_modules,
            cycle_paths: analysis.cycle_paths,
            dynamic_imports: analysis.dynamic_imports,
            dynamic_import_aliases: analysis.dynamic_import_aliases,
            warnings: self.sink.warnings().to_vec(),
        })
    }

    fn validate_options(&self) -> Result<(), BuildError> {
        if self.options.input.is_empty() {
            return Err(BuildError::InvalidOption {
                message: "You must supply at least one entry point".to_string(),
            });
        }
        if self.options.inline_dynamic_imports && self.options.input.len() > 1 {
            return Err(BuildError::InvalidOption {
                message: "Multiple entry points are not supported with inlineDynamicImports"
                    .to_string(),
            });
        }
        if let External::Ids(ids) = &self.options.external {
            if let Some(bad) = ids.iter().find(|id| id.starts_with('\0')) {
                return Err(BuildError::InvalidExternalId { id: bad.clone() });
            }
        }
        Ok(())
    }

    async fn resolve_entries(&mut self) -> Result<(), BuildError> {
        let mut seen: HashMap<JsWord, String> = HashMap::new();
        for item in &self.options.input {
            let resolved = self
                .plugin_driver
                .resolve_id(ResolveArgs {
                    specifier: &item.import,
                    importer: None,
                })
                .await?;
            let id: JsWord = match resolved {
                Some(ResolveIdResult::Id(id)) => id.as_str().into(),
                Some(ResolveIdResult::External) => {
                    return Err(BuildError::UnresolvedEntry {
                        unresolved_id: item.import.clone(),
                    })
                }
                None => default_resolve(&item.import, None, &self.root).as_str().into(),
            };
            if self.options.external.is_external(id.as_ref(), None, true) {
                return Err(BuildError::UnresolvedEntry {
                    unresolved_id: item.import.clone(),
                });
            }
            if seen.contains_key(&id) {
                return Err(BuildError::DuplicateEntryPoints {
                    alias: item.name.clone(),
                    id: id.to_string(),
                });
            }
            seen.insert(id.clone(), item.name.clone());
            self.entry_modules.push(id);
        }
        // aliases attach once the modules exist
        self.entry_aliases = seen;
        Ok(())
    }

    async fn fetch_phase(&mut self) -> Result<(), BuildError> {
        let active_task_count = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
        let ctx = JobContext {
            options: self.options.clone(),
            root: self.root.clone(),
            plugin_driver: self.plugin_driver.clone(),
            active_task_count: active_task_count.clone(),
            visited: Arc::new(DashSet::new()),
            watch_files: self.watch_files.clone(),
            warm_modules: Arc::new(self.warm_modules.clone()),
            cm: self.cm.clone(),
        };
        for entry in &self.entry_modules {
            ModuleJob::new(ctx.clone(), entry.clone(), None, tx.clone()).spawn();
        }

        let mut static_resolutions: HashMap<JsWord, HashMap<JsWord, ResolvedId>> = HashMap::new();
        let mut unresolved_warnings: HashSet<(JsWord, JsWord)> = HashSet::new();
        let mut dynamic_resolutions: HashMap<JsWord, Vec<(usize, DynamicImportResolution, bool)>> =
            HashMap::new();

        while active_task_count.load(Ordering::SeqCst) != 0 {
            match rx.recv().await {
                Some(Msg::Loaded(module)) => {
                    active_task_count.fetch_sub(1, Ordering::SeqCst);
                    self.module_by_id.insert(module.id.clone(), *module);
                }
                Some(Msg::Resolved {
                    importer,
                    specifier,
                    resolved,
                    warn_unresolved,
                }) => {
                    if warn_unresolved {
                        unresolved_warnings.insert((importer.clone(), specifier.clone()));
                    }
                    static_resolutions
                        .entry(importer)
                        .or_default()
                        .insert(specifier, resolved);
                }
                Some(Msg::DynamicResolved {
                    importer,
                    index,
                    resolution,
                    warn_unresolved,
                }) => {
                    dynamic_resolutions.entry(importer).or_default().push((
                        index,
                        resolution,
                        warn_unresolved,
                    ));
                }
                Some(Msg::Canceled) => {
                    active_task_count.fetch_sub(1, Ordering::SeqCst);
                }
                Some(Msg::Errored(err)) => {
                    active_task_count.fetch_sub(1, Ordering::SeqCst);
                    return Err(err);
                }
                None => {
                    tracing::trace!("all loader senders dropped");
                    break;
                }
            }
        }
        drop(tx);

        for (importer, resolutions) in static_resolutions {
            if let Some(module) = self.module_by_id.get_mut(&importer) {
                module.resolved_ids = resolutions;
            }
        }
        for (importer, resolutions) in dynamic_resolutions {
            if let Some(module) = self.module_by_id.get_mut(&importer) {
                for (index, resolution, _) in &resolutions {
                    if let Some(dynamic) = module.dynamic_imports.get_mut(*index) {
                        dynamic.resolution = Some(resolution.clone());
                    }
                }
            }
        }
        self.unresolved_warnings = unresolved_warnings;
        Ok(())
    }

    /// Rebuild `modules[]` as the deterministic DFS pre-order of static
    /// imports from the first entry, materialize external modules in that
    /// same order, and emit the deferred resolution warnings.
    fn finalize_registration_order(&mut self) {
        for (id, alias) in self.entry_aliases.clone() {
            if let Some(module) = self.module_by_id.get_mut(&id) {
                module.is_entry_point = true;
                module.chunk_alias = Some(alias);
            }
        }

        let mut order: Vec<JsWord> = Vec::new();
        let mut visited: HashSet<JsWord> = HashSet::new();
        let mut dynamic_candidates: Vec<JsWord> = Vec::new();

        let entries = self.entry_modules.clone();
        for entry in &entries {
            self.walk_pre_order(entry, &mut order, &mut visited, &mut dynamic_candidates);
        }
        let mut index = 0;
        while index < dynamic_candidates.len() {
            let candidate = dynamic_candidates[index].clone();
            index += 1;
            self.walk_pre_order(&candidate, &mut order, &mut visited, &mut dynamic_candidates);
        }
        self.modules = order;
    }

    fn walk_pre_order(
        &mut self,
        id: &JsWord,
        order: &mut Vec<JsWord>,
        visited: &mut HashSet<JsWord>,
        dynamic_candidates: &mut Vec<JsWord>,
    ) {
        if !visited.insert(id.clone()) {
            return;
        }
        if !self.module_by_id.contains_key(id) {
            return;
        }
        order.push(id.clone());

        let (sources, resolved_ids, dynamic_resolutions) = {
            let module = &self.module_by_id[id];
            (
                module.sources.clone(),
                module.resolved_ids.clone(),
                module
                    .dynamic_imports
                    .iter()
                    .filter_map(|dynamic| dynamic.resolution.clone())
                    .collect::<Vec<_>>(),
            )
        };

        let mut children: Vec<JsWord> = Vec::new();
        for specifier in &sources {
            let resolved = match resolved_ids.get(specifier) {
                Some(resolved) => resolved,
                None => continue,
            };
            if self
                .unresolved_warnings
                .contains(&(id.clone(), specifier.clone()))
            {
                self.sink.emit(
                    Warning::new(
                        WarningCode::UnresolvedImport,
                        format!(
                            "'{}' is imported by {}, but could not be resolved - treating it as an external dependency",
                            specifier,
                            relative_id(id.as_ref()),
                        ),
                    )
                    .with_id(id.to_string()),
                );
            }
            if resolved.external {
                self.materialize_external(&resolved.id, false);
            } else {
                children.push(resolved.id.clone());
            }
        }
        for child in children {
            self.walk_pre_order(&child, order, visited, dynamic_candidates);
        }

        for resolution in dynamic_resolutions {
            match resolution {
                DynamicImportResolution::Module(resolved) => {
                    if resolved.external {
                        // a dynamically imported external exposes a namespace
                        self.materialize_external(&resolved.id, true);
                    } else if !dynamic_candidates.contains(&resolved.id) {
                        dynamic_candidates.push(resolved.id.clone());
                    }
                }
                DynamicImportResolution::Replacement(_) => {}
            }
        }
    }

    fn materialize_external(&mut self, id: &JsWord, exports_namespace: bool) {
        let external = self
            .external_modules
            .entry(id.clone())
            .or_insert_with(|| ExternalModule::new(id.clone()));
        if exports_namespace {
            external.exports_namespace = true;
        }
        if !self.externals_order.contains(id) {
            self.externals_order.push(id.clone());
        }
    }

    /// Merge `export *` sources into each module's flattened export map in
    /// dependency order; duplicate names keep the first-seen origin and warn.
    fn flatten_exports_all(&mut self) {
        let order = self.modules.clone();
        let mut done: HashSet<JsWord> = HashSet::new();
        for id in &order {
            self.flatten_one(id, &mut done, &mut HashSet::new());
        }
    }

    fn flatten_one(
        &mut self,
        id: &JsWord,
        done: &mut HashSet<JsWord>,
        in_progress: &mut HashSet<JsWord>,
    ) {
        if done.contains(id) || !in_progress.insert(id.clone()) {
            return;
        }
        if !self.module_by_id.contains_key(id) {
            return;
        }
        self.module_by_id.get_mut(id).expect("exists").seed_exports_all();

        let export_all_targets: Vec<JsWord> = {
            let module = &self.module_by_id[id];
            module
                .export_all_sources
                .iter()
                .filter_map(|source| module.resolved_ids.get(source))
                .filter(|resolved| !resolved.external)
                .map(|resolved| resolved.id.clone())
                .collect()
        };
        for target in &export_all_targets {
            self.flatten_one(target, done, in_progress);
        }
        for target in &export_all_targets {
            let mut merged: Vec<(JsWord, JsWord)> = self
                .module_by_id
                .get(target)
                .map(|module| {
                    module
                        .exports_all
                        .iter()
                        .map(|(name, origin)| (name.clone(), origin.clone()))
                        .collect()
                })
                .unwrap_or_default();
            merged.sort();
            for (name, origin) in merged {
                if &*name == "default" {
                    continue;
                }
                let existing = self
                    .module_by_id
                    .get(id)
                    .and_then(|module| module.exports_all.get(&name).cloned());
                match existing {
                    Some(existing) if existing != origin => {
                        let message = format!(
                            "Conflicting namespaces: {} re-exports '{}' from both {} and {} (will be ignored)",
                            relative_id(id.as_ref()),
                            name,
                            relative_id(existing.as_ref()),
                            relative_id(origin.as_ref()),
                        );
                        self.sink.emit(
                            Warning::new(WarningCode::NamespaceConflict, message)
                                .with_id(id.to_string()),
                        );
                    }
                    Some(_) => {}
                    None => {
                        self.module_by_id
                            .get_mut(id)
                            .expect("exists")
                            .exports_all
                            .insert(name, origin);
                    }
                }
            }
        }
        in_progress.remove(id);
        done.insert(id.clone());
    }

    fn drain_plugin_warnings(&mut self) {
        let mut warnings = self.plugin_driver.take_warnings();
        // hook invocations race; key the sequence on content instead
        warnings.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        for warning in warnings {
            self.sink.emit(warning);
        }
    }

    /// Assets emitted through `emit_asset`, keyed by content id.
    pub fn assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self
            .plugin_driver
            .shared
            .assets
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        assets
    }

    /// Snapshot the persistable warm-start state. Plugin-cache entries whose
    /// counter reached the expiry are evicted here.
    pub fn get_cache(&self) -> BuildCache {
        let mut modules = Vec::new();
        for id in &self.modules {
            let module = match self.module_by_id.get(id) {
                Some(module) => module,
                None => continue,
            };
            modules.push(ModuleJson {
                id: module.id.to_string(),
                original_code: module.original_code.clone(),
                code: module.source.clone(),
                original_sourcemap: None,
                dependencies: {
                    let mut dependencies: Vec<String> = module
                        .resolved_ids
                        .values()
                        .map(|resolved| resolved.id.to_string())
                        .collect();
                    dependencies.sort();
                    dependencies
                },
                transform_dependencies: module.transform_dependencies.clone(),
                transform_assets: module.transform_assets.clone(),
                resolved_ids: module
                    .resolved_ids
                    .iter()
                    .map(|(specifier, resolved)| {
                        (
                            specifier.to_string(),
                            (resolved.id.to_string(), resolved.external),
                        )
                    })
                    .collect(),
                custom_transform_cache: module.custom_transform_cache,
            });
        }
        BuildCache {
            modules,
            plugins: self.plugin_driver.get_cache(self.options.cache_expiry()),
        }
    }

    /// Notify plugins of a change and drop the stale warm-cache entry. The
    /// watcher event source lives outside the core.
    pub fn watch_change(&mut self, id: &str) {
        self.plugin_driver.watch_change(id);
        self.warm_modules.remove(id);
    }

    pub fn warnings(&self) -> &[Warning] {
        self.sink.warnings()
    }
}
