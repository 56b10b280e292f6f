mod options;
pub use options::*;
mod error;
pub use error::*;
mod warning;
pub use warning::*;
mod graph;
pub use graph::*;
mod module;
pub use module::*;
mod external_module;
pub use external_module::*;
mod module_loader;
pub use module_loader::*;
mod statement;
pub use statement::*;
mod scope;
pub use scope::*;
mod link;
pub use link::*;
mod execution_order;
pub use execution_order::*;
mod treeshake;
pub use treeshake::*;
mod chunk;
pub use chunk::*;
mod cache;
pub use cache::*;
mod plugin;
pub use plugin::*;
pub mod utils;
pub use utils::side_effect::*;

use hashbrown::HashMap;
pub use swc_atoms::JsWord;

pub type ModuleById = HashMap<JsWord, Module>;

/// Outcome of resolving an import specifier against the resolver chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    pub id: JsWord,
    pub external: bool,
}

impl ResolvedId {
    pub fn new<T: Into<JsWord>>(id: T, external: bool) -> Self {
        Self {
            id: id.into(),
            external,
        }
    }
}
