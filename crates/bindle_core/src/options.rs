use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::{BuildCache, Warning};

/// One entry point. The alias becomes the chunk name of the entry's chunk.
#[derive(Debug, Clone)]
pub struct InputItem {
    pub name: String,
    pub import: String,
}

impl InputItem {
    pub fn new<N: Into<String>, I: Into<String>>(name: N, import: I) -> Self {
        Self {
            name: name.into(),
            import: import.into(),
        }
    }
}

impl From<&str> for InputItem {
    fn from(import: &str) -> Self {
        let name = std::path::Path::new(import)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("main")
            .to_string();
        Self {
            name,
            import: import.to_string(),
        }
    }
}

pub type ExternalFn = dyn Fn(&str, Option<&str>, bool) -> bool + Send + Sync;

/// Which ids are kept out of the bundle. Ids beginning with `\0` belong to
/// plugins and are never external.
#[derive(Clone, Default)]
pub enum External {
    #[default]
    None,
    Ids(Vec<String>),
    Fn(Arc<ExternalFn>),
}

impl External {
    pub fn is_external(&self, id: &str, importer: Option<&str>, is_resolved: bool) -> bool {
        if id.starts_with('\0') {
            return false;
        }
        match self {
            External::None => false,
            External::Ids(ids) => ids.iter().any(|candidate| candidate == id),
            External::Fn(f) => f(id, importer, is_resolved),
        }
    }
}

impl fmt::Debug for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            External::None => f.write_str("External::None"),
            External::Ids(ids) => f.debug_tuple("External::Ids").field(ids).finish(),
            External::Fn(_) => f.write_str("External::Fn(..)"),
        }
    }
}

pub type PureExternalFn = dyn Fn(&str) -> bool + Send + Sync;

/// Whether an external module may be assumed free of side effects when it is
/// imported purely for its bindings.
#[derive(Clone)]
pub enum PureExternalModules {
    Bool(bool),
    Ids(Vec<String>),
    Fn(Arc<PureExternalFn>),
}

impl Default for PureExternalModules {
    fn default() -> Self {
        PureExternalModules::Bool(false)
    }
}

impl PureExternalModules {
    pub fn is_pure(&self, id: &str) -> bool {
        match self {
            PureExternalModules::Bool(pure) => *pure,
            PureExternalModules::Ids(ids) => ids.iter().any(|candidate| candidate == id),
            PureExternalModules::Fn(f) => f(id),
        }
    }
}

impl fmt::Debug for PureExternalModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PureExternalModules::Bool(b) => write!(f, "PureExternalModules::Bool({})", b),
            PureExternalModules::Ids(ids) => {
                f.debug_tuple("PureExternalModules::Ids").field(ids).finish()
            }
            PureExternalModules::Fn(_) => f.write_str("PureExternalModules::Fn(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeshakeOptions {
    /// When false, a bare property read such as `x.y` is inert.
    pub property_read_side_effects: bool,
    pub pure_external_modules: PureExternalModules,
}

impl Default for TreeshakeOptions {
    fn default() -> Self {
        Self {
            property_read_side_effects: true,
            pure_external_modules: PureExternalModules::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Treeshake {
    Disabled,
    Enabled(TreeshakeOptions),
}

impl Default for Treeshake {
    fn default() -> Self {
        Treeshake::Enabled(TreeshakeOptions::default())
    }
}

impl Treeshake {
    pub fn options(&self) -> Option<&TreeshakeOptions> {
        match self {
            Treeshake::Disabled => None,
            Treeshake::Enabled(options) => Some(options),
        }
    }
}

pub type ModuleContextFn = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Per-module override for the top-level `this` value.
#[derive(Clone, Default)]
pub enum ModuleContext {
    #[default]
    None,
    Map(HashMap<String, String>),
    Fn(Arc<ModuleContextFn>),
}

impl ModuleContext {
    pub fn context_for(&self, id: &str) -> Option<String> {
        match self {
            ModuleContext::None => None,
            ModuleContext::Map(map) => map.get(id).cloned(),
            ModuleContext::Fn(f) => f(id),
        }
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleContext::None => f.write_str("ModuleContext::None"),
            ModuleContext::Map(map) => f.debug_tuple("ModuleContext::Map").field(map).finish(),
            ModuleContext::Fn(_) => f.write_str("ModuleContext::Fn(..)"),
        }
    }
}

/// Parser configuration forwarded to the swc lexer.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub jsx: bool,
    /// `await` at module top level is a parse error unless enabled.
    pub experimental_top_level_await: bool,
}

pub type OnWarn = Arc<dyn Fn(&Warning) + Send + Sync>;

#[derive(Clone, Default)]
pub struct InputOptions {
    pub input: Vec<InputItem>,
    pub root: String,
    pub external: External,
    pub treeshake: Treeshake,
    pub cache: Option<BuildCache>,
    pub experimental_cache_expiry: Option<usize>,
    /// Default top-level `this` value of every module.
    pub context: String,
    pub module_context: ModuleContext,
    pub shim_missing_exports: bool,
    pub prefer_const: bool,
    pub preserve_modules: bool,
    pub inline_dynamic_imports: bool,
    /// alias -> module ids forced into one chunk.
    pub manual_chunks: Vec<(String, Vec<String>)>,
    pub parse: ParseOptions,
    pub on_warn: Option<OnWarn>,
}

impl InputOptions {
    pub fn cache_expiry(&self) -> usize {
        self.experimental_cache_expiry.unwrap_or(10)
    }

    pub fn var_or_const(&self) -> &'static str {
        if self.prefer_const {
            "const"
        } else {
            "var"
        }
    }

    pub(crate) fn normalized_root(&self) -> String {
        if self.root.is_empty() {
            std::env::current_dir()
                .map(|dir| dir.to_string_lossy().to_string())
                .unwrap_or_else(|_| ".".to_string())
        } else {
            self.root.clone()
        }
    }
}

impl fmt::Debug for InputOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputOptions")
            .field("input", &self.input)
            .field("root", &self.root)
            .field("external", &self.external)
            .field("treeshake", &self.treeshake)
            .field("shim_missing_exports", &self.shim_missing_exports)
            .field("prefer_const", &self.prefer_const)
            .field("preserve_modules", &self.preserve_modules)
            .field("inline_dynamic_imports", &self.inline_dynamic_imports)
            .field("manual_chunks", &self.manual_chunks)
            .field("parse", &self.parse)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_prefixed_ids_are_never_external() {
        let external = External::Ids(vec!["\0virtual".to_string()]);
        assert!(!external.is_external("\0virtual", None, true));
        let external = External::Fn(Arc::new(|_, _, _| true));
        assert!(!external.is_external("\0virtual", None, true));
        assert!(external.is_external("lodash", None, false));
    }

    #[test]
    fn input_item_derives_alias_from_file_stem() {
        let item = InputItem::from("./src/main.js");
        assert_eq!(item.name, "main");
        assert_eq!(item.import, "./src/main.js");
    }

    #[test]
    fn var_or_const_follows_prefer_const() {
        let mut options = InputOptions::default();
        assert_eq!(options.var_or_const(), "var");
        options.prefer_const = true;
        assert_eq!(options.var_or_const(), "const");
    }
}
