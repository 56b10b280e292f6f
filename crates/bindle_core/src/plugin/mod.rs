mod plugin_driver;
pub use plugin_driver::*;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::utils::{hash16, hex16};
use crate::{BuildError, Warning};

pub type PluginResult<T> = anyhow::Result<T>;

/// Explicit three-valued resolution result; `None` from the hook means
/// "unhandled, ask the next plugin".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveIdResult {
    Id(String),
    /// The specifier is external and keeps its own name as id.
    External,
}

#[derive(Debug, Clone)]
pub struct LoadOutput {
    pub code: String,
    pub map: Option<serde_json::Value>,
}

impl From<String> for LoadOutput {
    fn from(code: String) -> Self {
        Self { code, map: None }
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub map: Option<serde_json::Value>,
    /// Extra files the transform result depends on; they join the watch set.
    pub dependencies: Vec<String>,
}

impl From<String> for TransformOutput {
    fn from(code: String) -> Self {
        Self {
            code,
            map: None,
            dependencies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolveArgs<'a> {
    pub specifier: &'a str,
    pub importer: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct LoadArgs<'a> {
    pub id: &'a str,
}

#[derive(Debug, Clone)]
pub struct TransformArgs<'a> {
    pub code: String,
    pub id: &'a str,
}

#[derive(Debug, Clone)]
pub struct ResolveDynamicImportArgs<'a> {
    /// `None` when the import argument is not a string literal.
    pub specifier: Option<&'a str>,
    pub importer: &'a str,
}

#[async_trait]
pub trait Plugin: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve_id(
        &self,
        _ctx: &PluginContext,
        _args: ResolveArgs<'_>,
    ) -> PluginResult<Option<ResolveIdResult>> {
        Ok(None)
    }

    async fn load(&self, _ctx: &PluginContext, _args: LoadArgs<'_>) -> PluginResult<Option<LoadOutput>> {
        Ok(None)
    }

    async fn transform(
        &self,
        _ctx: &PluginContext,
        _args: TransformArgs<'_>,
    ) -> PluginResult<Option<TransformOutput>> {
        Ok(None)
    }

    async fn resolve_dynamic_import(
        &self,
        _ctx: &PluginContext,
        _args: ResolveDynamicImportArgs<'_>,
    ) -> PluginResult<Option<ResolveIdResult>> {
        Ok(None)
    }

    fn build_start(&self, _ctx: &PluginContext) {}

    fn build_end(&self, _ctx: &PluginContext, _error: Option<&BuildError>) {}

    fn watch_change(&self, _id: &str) {}
}

/// A non-JS artifact registered through `emit_asset`, keyed by a digest of
/// its content.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub source: String,
}

pub type PluginCacheBucket = HashMap<String, (usize, serde_json::Value)>;

/// State shared by every hook invocation of one build.
#[derive(Debug, Default)]
pub struct PluginShared {
    pub assets: DashMap<String, Asset>,
    pub caches: DashMap<String, PluginCacheBucket>,
    custom_cache_used: AtomicBool,
    warnings: Mutex<Vec<Warning>>,
}

impl PluginShared {
    pub(crate) fn reset_custom_cache_flag(&self) {
        self.custom_cache_used.store(false, Ordering::SeqCst);
    }

    pub(crate) fn custom_cache_used(&self) -> bool {
        self.custom_cache_used.load(Ordering::SeqCst)
    }

    pub(crate) fn take_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings.lock().expect("warning lock poisoned"))
    }
}

/// Per-plugin view handed to every hook.
#[derive(Debug, Clone)]
pub struct PluginContext {
    plugin: String,
    shared: Arc<PluginShared>,
    /// Captures assets emitted during one transform invocation so they can
    /// round-trip through the module cache.
    emitted: Option<Arc<Mutex<Vec<Asset>>>>,
}

impl PluginContext {
    pub(crate) fn new(plugin: &str, shared: Arc<PluginShared>) -> Self {
        Self {
            plugin: plugin.to_string(),
            shared,
            emitted: None,
        }
    }

    pub(crate) fn with_collector(mut self, collector: Arc<Mutex<Vec<Asset>>>) -> Self {
        self.emitted = Some(collector);
        self
    }

    /// Register an asset; the id derives from the content so identical
    /// sources collapse onto one artifact.
    pub fn emit_asset(&self, name: impl Into<String>, source: impl Into<String>) -> String {
        let source = source.into();
        let id = hex16(&hash16(&source));
        let asset = Asset {
            id: id.clone(),
            name: name.into(),
            source,
        };
        if let Some(collector) = &self.emitted {
            collector
                .lock()
                .expect("asset collector lock poisoned")
                .push(asset.clone());
        }
        self.shared.assets.insert(id.clone(), asset);
        id
    }

    pub fn cache_set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.shared.custom_cache_used.store(true, Ordering::SeqCst);
        self.shared
            .caches
            .entry(self.plugin.clone())
            .or_default()
            .insert(key.into(), (0, value));
    }

    /// Reading resets the entry's eviction counter.
    pub fn cache_get(&self, key: &str) -> Option<serde_json::Value> {
        self.shared.custom_cache_used.store(true, Ordering::SeqCst);
        let mut bucket = self.shared.caches.get_mut(&self.plugin)?;
        let entry = bucket.get_mut(key)?;
        entry.0 = 0;
        Some(entry.1.clone())
    }

    pub fn warn(&self, warning: Warning) {
        let warning = warning.with_plugin(self.plugin.clone());
        self.shared
            .warnings
            .lock()
            .expect("warning lock poisoned")
            .push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_asset_derives_the_id_from_content() {
        let shared = Arc::new(PluginShared::default());
        let ctx = PluginContext::new("test", shared.clone());
        let first = ctx.emit_asset("style.css", "body {}");
        let second = ctx.emit_asset("other.css", "body {}");
        assert_eq!(first, second);
        assert_eq!(shared.assets.len(), 1);
        let distinct = ctx.emit_asset("style.css", "html {}");
        assert_ne!(first, distinct);
    }

    #[test]
    fn cache_access_marks_custom_transform_cache() {
        let shared = Arc::new(PluginShared::default());
        let ctx = PluginContext::new("test", shared.clone());
        assert!(!shared.custom_cache_used());
        ctx.cache_set("key", serde_json::json!(1));
        assert!(shared.custom_cache_used());
        shared.reset_custom_cache_flag();
        assert_eq!(ctx.cache_get("key"), Some(serde_json::json!(1)));
        assert!(shared.custom_cache_used());
    }
}
