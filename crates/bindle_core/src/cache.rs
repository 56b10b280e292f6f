use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Asset, PluginCacheBucket};

/// Serializable snapshot of one loaded module, enough to skip the transform
/// chain on a warm start when the freshly loaded code is unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleJson {
    pub id: String,
    pub original_code: String,
    /// Code after the transform chain; reparsed on reuse.
    pub code: String,
    pub original_sourcemap: Option<serde_json::Value>,
    pub dependencies: Vec<String>,
    pub transform_dependencies: Vec<String>,
    pub transform_assets: Vec<Asset>,
    /// specifier -> (resolved id, external), pre-populating resolution.
    pub resolved_ids: HashMap<String, (String, bool)>,
    pub custom_transform_cache: bool,
}

/// The persistable warm-start state: `{ modules, plugins }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildCache {
    pub modules: Vec<ModuleJson>,
    pub plugins: HashMap<String, PluginCacheBucket>,
}

impl BuildCache {
    pub fn module(&self, id: &str) -> Option<&ModuleJson> {
        self.modules.iter().find(|module| module.id == id)
    }

    /// Drop a module's cached state, e.g. after a watch change event.
    pub fn invalidate(&mut self, id: &str) {
        self.modules.retain(|module| module.id != id);
    }
}
