use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    Asset, BuildError, LoadArgs, LoadOutput, Plugin, PluginCacheBucket, PluginContext,
    PluginShared, ResolveArgs, ResolveDynamicImportArgs, ResolveIdResult, TransformArgs, Warning,
};

/// Everything one run of the transform chain produced for a module.
#[derive(Debug)]
pub struct TransformChainOutput {
    pub code: String,
    pub dependencies: Vec<String>,
    pub assets: Vec<Asset>,
    pub custom_cache: bool,
}

/// Invokes plugin hooks in registration order. Resolution and loading are
/// first-non-nullish; transforms chain, each plugin seeing the previous
/// plugin's output.
#[derive(Debug)]
pub struct PluginDriver {
    pub plugins: Vec<Box<dyn Plugin>>,
    pub shared: Arc<PluginShared>,
}

impl PluginDriver {
    pub fn new(
        plugins: Vec<Box<dyn Plugin>>,
        warm_cache: Option<&HashMap<String, PluginCacheBucket>>,
    ) -> Self {
        let shared = Arc::new(PluginShared::default());
        if let Some(warm) = warm_cache {
            for (plugin, bucket) in warm {
                let mut seeded = bucket.clone();
                // age every pre-existing entry so untouched ones expire
                for entry in seeded.values_mut() {
                    entry.0 += 1;
                }
                shared.caches.insert(plugin.clone(), seeded);
            }
        }
        Self { plugins, shared }
    }

    fn ctx(&self, plugin: &dyn Plugin) -> PluginContext {
        PluginContext::new(plugin.name(), self.shared.clone())
    }

    fn hook_error(plugin: &dyn Plugin, hook: &'static str, source: anyhow::Error) -> BuildError {
        BuildError::PluginHook {
            plugin: plugin.name().to_string(),
            hook,
            source,
        }
    }

    pub async fn resolve_id(
        &self,
        args: ResolveArgs<'_>,
    ) -> Result<Option<ResolveIdResult>, BuildError> {
        for plugin in &self.plugins {
            let output = plugin
                .resolve_id(&self.ctx(plugin.as_ref()), args.clone())
                .await
                .map_err(|err| Self::hook_error(plugin.as_ref(), "resolveId", err))?;
            if output.is_some() {
                return Ok(output);
            }
        }
        Ok(None)
    }

    pub async fn load(&self, args: LoadArgs<'_>) -> Result<Option<LoadOutput>, BuildError> {
        for plugin in &self.plugins {
            let output = plugin
                .load(&self.ctx(plugin.as_ref()), args.clone())
                .await
                .map_err(|err| Self::hook_error(plugin.as_ref(), "load", err))?;
            if output.is_some() {
                return Ok(output);
            }
        }
        Ok(None)
    }

    /// Run the transform chain over loaded code. Returns the final code, the
    /// declared transform dependencies, the assets emitted along the way and
    /// whether any plugin used its own cache while transforming.
    pub async fn transform(&self, id: &str, code: String) -> Result<TransformChainOutput, BuildError> {
        let mut code = code;
        let mut dependencies = Vec::new();
        let mut custom_cache = false;
        let collector = Arc::new(std::sync::Mutex::new(Vec::new()));
        for plugin in &self.plugins {
            self.shared.reset_custom_cache_flag();
            let ctx = self.ctx(plugin.as_ref()).with_collector(collector.clone());
            let output = plugin
                .transform(
                    &ctx,
                    TransformArgs {
                        code: code.clone(),
                        id,
                    },
                )
                .await
                .map_err(|err| Self::hook_error(plugin.as_ref(), "transform", err))?;
            if self.shared.custom_cache_used() {
                custom_cache = true;
            }
            if let Some(output) = output {
                code = output.code;
                dependencies.extend(output.dependencies);
            }
        }
        let assets = std::mem::take(
            &mut *collector.lock().expect("asset collector lock poisoned"),
        );
        Ok(TransformChainOutput {
            code,
            dependencies,
            assets,
            custom_cache,
        })
    }

    pub async fn resolve_dynamic_import(
        &self,
        args: ResolveDynamicImportArgs<'_>,
    ) -> Result<Option<ResolveIdResult>, BuildError> {
        for plugin in &self.plugins {
            let output = plugin
                .resolve_dynamic_import(&self.ctx(plugin.as_ref()), args.clone())
                .await
                .map_err(|err| Self::hook_error(plugin.as_ref(), "resolveDynamicImport", err))?;
            if output.is_some() {
                return Ok(output);
            }
        }
        Ok(None)
    }

    pub fn build_start(&self) {
        for plugin in &self.plugins {
            plugin.build_start(&self.ctx(plugin.as_ref()));
        }
    }

    pub fn build_end(&self, error: Option<&BuildError>) {
        for plugin in &self.plugins {
            plugin.build_end(&self.ctx(plugin.as_ref()), error);
        }
    }

    /// Synchronous in-order change notification.
    pub fn watch_change(&self, id: &str) {
        for plugin in &self.plugins {
            plugin.watch_change(id);
        }
    }

    pub(crate) fn take_warnings(&self) -> Vec<Warning> {
        self.shared.take_warnings()
    }

    /// Snapshot the plugin caches for persistence, evicting entries whose
    /// counter reached the expiry and dropping empty buckets.
    pub fn get_cache(&self, cache_expiry: usize) -> HashMap<String, PluginCacheBucket> {
        let mut out = HashMap::new();
        for entry in self.shared.caches.iter() {
            let bucket: PluginCacheBucket = entry
                .value()
                .iter()
                .filter(|(_, (counter, _))| *counter < cache_expiry)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if !bucket.is_empty() {
                out.insert(entry.key().clone(), bucket);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::PluginResult;

    #[derive(Debug)]
    struct Named(&'static str, Option<&'static str>);

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn resolve_id(
            &self,
            _ctx: &PluginContext,
            _args: ResolveArgs<'_>,
        ) -> PluginResult<Option<ResolveIdResult>> {
            Ok(self.1.map(|id| ResolveIdResult::Id(id.to_string())))
        }
    }

    #[tokio::test]
    async fn first_non_nullish_resolution_wins() {
        let driver = PluginDriver::new(
            vec![
                Box::new(Named("a", None)),
                Box::new(Named("b", Some("/from-b.js"))),
                Box::new(Named("c", Some("/from-c.js"))),
            ],
            None,
        );
        let resolved = driver
            .resolve_id(ResolveArgs {
                specifier: "./x",
                importer: None,
            })
            .await
            .unwrap();
        assert_eq!(resolved, Some(ResolveIdResult::Id("/from-b.js".to_string())));
    }

    #[test]
    fn cache_eviction_drops_stale_entries_and_empty_buckets() {
        let mut warm = HashMap::new();
        let mut bucket = PluginCacheBucket::new();
        bucket.insert("fresh".to_string(), (0, serde_json::json!(1)));
        bucket.insert("stale".to_string(), (9, serde_json::json!(2)));
        warm.insert("plugin-a".to_string(), bucket);
        let mut dead = PluginCacheBucket::new();
        dead.insert("gone".to_string(), (9, serde_json::json!(3)));
        warm.insert("plugin-b".to_string(), dead);

        // construction ages every entry by one
        let driver = PluginDriver::new(Vec::new(), Some(&warm));
        let cache = driver.get_cache(10);
        assert_eq!(cache["plugin-a"].len(), 1);
        assert!(cache["plugin-a"].contains_key("fresh"));
        assert!(!cache.contains_key("plugin-b"));
    }
}
