use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashSet;
use swc_atoms::JsWord;
use swc_common::{sync::Lrc, SourceMap};
use tokio::sync::mpsc::UnboundedSender;

use crate::utils::{default_resolve, is_relative_specifier, parse_file};
use crate::{
    BuildError, DynamicImportExpression, DynamicImportResolution, InputOptions, LoadArgs,
    LoadOutput, Module, ModuleJson, PluginDriver, ResolveArgs, ResolveDynamicImportArgs,
    ResolveIdResult, ResolvedId,
};

/// Messages the fetch fan-out reports back to the graph loop.
#[derive(Debug)]
pub enum Msg {
    Loaded(Box<Module>),
    Resolved {
        importer: JsWord,
        specifier: JsWord,
        resolved: ResolvedId,
        /// Bare specifier nobody resolved; warn and treat as external.
        warn_unresolved: bool,
    },
    DynamicResolved {
        importer: JsWord,
        index: usize,
        resolution: DynamicImportResolution,
        warn_unresolved: bool,
    },
    Canceled,
    Errored(BuildError),
}

/// Everything a fetch job needs, cheap to clone into forks.
#[derive(Clone)]
pub struct JobContext {
    pub options: Arc<InputOptions>,
    pub root: Arc<String>,
    pub plugin_driver: Arc<PluginDriver>,
    pub active_task_count: Arc<AtomicUsize>,
    pub visited: Arc<DashSet<JsWord>>,
    pub watch_files: Arc<DashSet<JsWord>>,
    pub warm_modules: Arc<HashMap<String, ModuleJson>>,
    pub cm: Lrc<SourceMap>,
}

/// One module fetch: register, load, transform (or reuse the warm cache),
/// parse, scan, then fork the static and dynamic dependency fan-out.
pub struct ModuleJob {
    ctx: JobContext,
    id: JsWord,
    importer: Option<JsWord>,
    tx: UnboundedSender<Msg>,
}

impl ModuleJob {
    pub fn new(ctx: JobContext, id: JsWord, importer: Option<JsWord>, tx: UnboundedSender<Msg>) -> Self {
        ctx.active_task_count.fetch_add(1, Ordering::SeqCst);
        Self {
            ctx,
            id,
            importer,
            tx,
        }
    }

    pub fn spawn(self) {
        tokio::spawn(async move { self.run().await });
    }

    pub async fn run(self) {
        match self.load_module().await {
            Ok(Some(module)) => self.send(Msg::Loaded(Box::new(module))),
            Ok(None) => self.send(Msg::Canceled),
            Err(err) => self.send(Msg::Errored(err)),
        }
    }

    fn send(&self, msg: Msg) {
        if let Err(err) = self.tx.send(msg) {
            // the receiver is gone when the build was canceled or failed
            tracing::trace!("failed to send loader message: {:?}", err);
        }
    }

    fn fork(&self, id: JsWord) {
        if self.ctx.visited.contains(&id) {
            return;
        }
        let job = ModuleJob::new(
            self.ctx.clone(),
            id,
            Some(self.id.clone()),
            self.tx.clone(),
        );
        job.spawn();
    }

    async fn load_module(&self) -> Result<Option<Module>, BuildError> {
        // first registration wins; everyone else short-circuits, which also
        // breaks import cycles
        if !self.ctx.visited.insert(self.id.clone()) {
            return Ok(None);
        }
        self.ctx.watch_files.insert(self.id.clone());
        tracing::trace!("fetching module {:?}", self.id);

        let loaded = self.load_source().await?;
        let original_code = loaded.code;

        let warm = self
            .ctx
            .warm_modules
            .get(self.id.as_ref())
            .filter(|cached| {
                cached.original_code == original_code && !cached.custom_transform_cache
            });
        let (code, transform_dependencies, transform_assets, custom_cache, cached_resolutions) =
            match warm {
                Some(cached) => {
                    // unchanged since the previous build: skip the transform
                    // chain and re-emit its assets
                    for asset in &cached.transform_assets {
                        self.ctx
                            .plugin_driver
                            .shared
                            .assets
                            .insert(asset.id.clone(), asset.clone());
                    }
                    let resolutions: HashMap<JsWord, ResolvedId> = cached
                        .resolved_ids
                        .iter()
                        .map(|(specifier, (id, external))| {
                            (
                                JsWord::from(specifier.as_str()),
                                ResolvedId::new(id.as_str(), *external),
                            )
                        })
                        .collect();
                    (
                        cached.code.clone(),
                        cached.transform_dependencies.clone(),
                        cached.transform_assets.clone(),
                        cached.custom_transform_cache,
                        Some(resolutions),
                    )
                }
                None => {
                    let output = self
                        .ctx
                        .plugin_driver
                        .transform(self.id.as_ref(), original_code.clone())
                        .await?;
                    (
                        output.code,
                        output.dependencies,
                        output.assets,
                        output.custom_cache,
                        None,
                    )
                }
            };
        for dependency in &transform_dependencies {
            self.ctx.watch_files.insert(dependency.as_str().into());
        }

        let parsed = parse_file(
            code.clone(),
            self.id.as_ref(),
            &self.ctx.cm,
            &self.ctx.options.parse,
        )
        .map_err(|message| BuildError::ParseError {
            id: self.id.to_string(),
            importer: self.importer.as_ref().map(|importer| importer.to_string()),
            message,
        })?;

        let context = self
            .ctx
            .options
            .module_context
            .context_for(self.id.as_ref())
            .unwrap_or_else(|| {
                if self.ctx.options.context.is_empty() {
                    "undefined".to_string()
                } else {
                    self.ctx.options.context.clone()
                }
            });
        let mut module = Module::new(
            self.id.clone(),
            original_code,
            code,
            parsed.body,
            context,
        );
        module.transform_dependencies = transform_dependencies;
        module.transform_assets = transform_assets;
        module.custom_transform_cache = custom_cache;

        if !self.ctx.options.parse.experimental_top_level_await
            && module
                .statements
                .iter()
                .any(|stmt| stmt.effects.top_level_await)
        {
            return Err(BuildError::ParseError {
                id: self.id.to_string(),
                importer: self.importer.as_ref().map(|importer| importer.to_string()),
                message: "top-level await is not enabled".to_string(),
            });
        }

        // both fan-outs fork concurrent jobs; the graph loop joins on the
        // shared task counter
        self.fetch_static_dependencies(&module, cached_resolutions.as_ref())
            .await?;
        self.fetch_dynamic_dependencies(&module).await?;

        Ok(Some(module))
    }

    async fn load_source(&self) -> Result<LoadOutput, BuildError> {
        let hook_output = self
            .ctx
            .plugin_driver
            .load(LoadArgs {
                id: self.id.as_ref(),
            })
            .await
            .map_err(|err| BuildError::CouldNotLoad {
                id: self.id.to_string(),
                importer: self.importer.as_ref().map(|importer| importer.to_string()),
                source: anyhow::Error::new(err),
            })?;
        if let Some(output) = hook_output {
            return Ok(output);
        }
        match tokio::fs::read(self.id.as_ref()).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(LoadOutput::from)
                .map_err(|_| BuildError::BadLoader {
                    id: self.id.to_string(),
                }),
            Err(err) => Err(BuildError::CouldNotLoad {
                id: self.id.to_string(),
                importer: self.importer.as_ref().map(|importer| importer.to_string()),
                source: err.into(),
            }),
        }
    }

    async fn fetch_static_dependencies(
        &self,
        module: &Module,
        cached_resolutions: Option<&HashMap<JsWord, ResolvedId>>,
    ) -> Result<(), BuildError> {
        for specifier in &module.sources {
            let (resolved, warn_unresolved) = self
                .resolve_specifier(specifier, cached_resolutions)
                .await?;
            if !resolved.external {
                self.fork(resolved.id.clone());
            }
            self.send(Msg::Resolved {
                importer: self.id.clone(),
                specifier: specifier.clone(),
                resolved,
                warn_unresolved,
            });
        }
        Ok(())
    }

    /// Resolution precedence: pre-populated ids from the warm cache, the
    /// `external` predicate, then the plugin chain, then the path-based
    /// default. Unresolvable bare specifiers degrade to externals with a
    /// warning; unresolvable relative specifiers are fatal.
    async fn resolve_specifier(
        &self,
        specifier: &JsWord,
        cached_resolutions: Option<&HashMap<JsWord, ResolvedId>>,
    ) -> Result<(ResolvedId, bool), BuildError> {
        if let Some(resolved) = cached_resolutions.and_then(|cached| cached.get(specifier)) {
            return Ok((resolved.clone(), false));
        }
        let importer = self.id.as_ref();
        if self
            .ctx
            .options
            .external
            .is_external(specifier.as_ref(), Some(importer), false)
        {
            return Ok((
                ResolvedId::new(self.external_id(specifier), true),
                false,
            ));
        }
        let hook_output = self
            .ctx
            .plugin_driver
            .resolve_id(ResolveArgs {
                specifier: specifier.as_ref(),
                importer: Some(importer),
            })
            .await?;
        match hook_output {
            Some(ResolveIdResult::Id(id)) => {
                let external = self
                    .ctx
                    .options
                    .external
                    .is_external(&id, Some(importer), true);
                Ok((ResolvedId::new(id.as_str(), external), false))
            }
            Some(ResolveIdResult::External) => {
                Ok((ResolvedId::new(self.external_id(specifier), true), false))
            }
            None => {
                if is_relative_specifier(specifier.as_ref())
                    || std::path::Path::new(specifier.as_ref()).is_absolute()
                {
                    let id = default_resolve(specifier.as_ref(), Some(importer), &self.ctx.root);
                    if id.is_empty() {
                        return Err(BuildError::UnresolvedImport {
                            specifier: specifier.to_string(),
                            importer: importer.to_string(),
                        });
                    }
                    let external =
                        self.ctx.options.external.is_external(&id, Some(importer), true);
                    Ok((ResolvedId::new(id.as_str(), external), false))
                } else {
                    // bare import nobody handled: external, with a warning
                    Ok((ResolvedId::new(specifier.clone(), true), true))
                }
            }
        }
    }

    fn external_id(&self, specifier: &JsWord) -> String {
        if is_relative_specifier(specifier.as_ref()) {
            default_resolve(specifier.as_ref(), Some(self.id.as_ref()), &self.ctx.root)
        } else {
            specifier.to_string()
        }
    }

    async fn fetch_dynamic_dependencies(&self, module: &Module) -> Result<(), BuildError> {
        for (index, dynamic) in module.dynamic_imports.iter().enumerate() {
            let literal = match &dynamic.expression {
                DynamicImportExpression::Literal(specifier) => Some(specifier.clone()),
                DynamicImportExpression::Expression => None,
            };
            let hook_output = self
                .ctx
                .plugin_driver
                .resolve_dynamic_import(ResolveDynamicImportArgs {
                    specifier: literal.as_deref(),
                    importer: self.id.as_ref(),
                })
                .await?;

            let (resolution, warn_unresolved) = match (hook_output, literal) {
                // a plugin replaced a non-literal argument; record as-is
                (Some(ResolveIdResult::Id(replacement)), None) => {
                    (Some(DynamicImportResolution::Replacement(replacement)), false)
                }
                (Some(ResolveIdResult::Id(id)), Some(_)) => {
                    let external =
                        self.ctx
                            .options
                            .external
                            .is_external(&id, Some(self.id.as_ref()), true);
                    (
                        Some(DynamicImportResolution::Module(ResolvedId::new(
                            id.as_str(),
                            external,
                        ))),
                        false,
                    )
                }
                (Some(ResolveIdResult::External), Some(specifier)) => (
                    Some(DynamicImportResolution::Module(ResolvedId::new(
                        self.external_id(&specifier),
                        true,
                    ))),
                    false,
                ),
                (None, Some(specifier)) => {
                    let (resolved, warn) = self.resolve_specifier(&specifier, None).await?;
                    (Some(DynamicImportResolution::Module(resolved)), warn)
                }
                // an unhandled non-literal import stays as it is
                (Some(ResolveIdResult::External), None) | (None, None) => (None, false),
            };

            if let Some(resolution) = resolution {
                if let DynamicImportResolution::Module(resolved) = &resolution {
                    if !resolved.external {
                        self.fork(resolved.id.clone());
                    }
                }
                self.send(Msg::DynamicResolved {
                    importer: self.id.clone(),
                    index,
                    resolution,
                    warn_unresolved,
                });
            }
        }
        Ok(())
    }
}
