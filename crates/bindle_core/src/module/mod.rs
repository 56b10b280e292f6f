pub mod analyse;

pub use analyse::*;

use hashbrown::{HashMap, HashSet};
use swc_atoms::JsWord;

use ast::{ModuleDecl, ModuleItem};

use crate::{
    Demand, RefBinding, ResolvedExport, ResolvedId, Statement, TreeshakeOptions,
};

/// A loaded, parsed and scanned source file. Identity is the resolved id;
/// the loader creates it, the link/order/shake passes mutate it in turn.
#[derive(Debug)]
pub struct Module {
    pub id: JsWord,
    /// Code as returned by the loader, before transforms; cache key.
    pub original_code: String,
    /// Code after the transform chain, the text that was parsed.
    pub source: String,
    pub statements: Vec<Statement>,

    /// Static import specifiers in source order; parallel to `resolved_ids`.
    pub sources: Vec<JsWord>,
    pub resolved_ids: HashMap<JsWord, ResolvedId>,
    pub imports: HashMap<JsWord, ImportDesc>,
    pub exports: HashMap<JsWord, ExportDesc>,
    pub re_exports: HashMap<JsWord, ReExportDesc>,
    pub export_names: Vec<JsWord>,
    pub export_all_sources: Vec<JsWord>,
    /// Exported name -> originating module id, flattened across
    /// `export *` chains once all dependencies are known.
    pub exports_all: HashMap<JsWord, JsWord>,
    pub dynamic_imports: Vec<DynamicImportDesc>,

    /// Top-level binding name -> declaring statement index.
    pub definitions: HashMap<JsWord, usize>,
    /// Import local name -> linked binding (link pass 1).
    pub resolved_imports: HashMap<JsWord, RefBinding>,

    pub is_entry_point: bool,
    pub chunk_alias: Option<String>,
    pub entry_points_hash: [u8; 16],
    pub chunk: Option<usize>,
    pub exec_order: usize,
    /// Top-level `this` value for this module.
    pub context: String,

    /// Bindings demanded by included statements; grows monotonically.
    pub needed: HashSet<JsWord>,
    /// All exports demanded, e.g. through a namespace import.
    pub namespace_needed: bool,
    pub shimmed_exports: HashSet<JsWord>,

    pub transform_dependencies: Vec<String>,
    pub transform_assets: Vec<crate::Asset>,
    pub custom_transform_cache: bool,
}

impl Module {
    pub fn new(
        id: JsWord,
        original_code: String,
        source: String,
        body: Vec<ModuleItem>,
        context: String,
    ) -> Self {
        let analysis = analyse(&body);
        let statements: Vec<Statement> = body
            .into_iter()
            .enumerate()
            .map(|(index, item)| Statement::new(item, index))
            .collect();
        let mut definitions = HashMap::new();
        for stmt in &statements {
            for name in &stmt.defines {
                definitions.entry(name.clone()).or_insert(stmt.index);
            }
        }
        Self {
            id,
            original_code,
            source,
            statements,
            sources: analysis.sources,
            resolved_ids: HashMap::new(),
            imports: analysis.imports,
            exports: analysis.exports,
            re_exports: analysis.re_exports,
            export_names: analysis.export_names,
            export_all_sources: analysis.export_all_sources,
            exports_all: HashMap::new(),
            dynamic_imports: analysis.dynamic_imports,
            definitions,
            resolved_imports: HashMap::new(),
            is_entry_point: false,
            chunk_alias: None,
            entry_points_hash: [0u8; 16],
            chunk: None,
            exec_order: usize::MAX,
            context,
            needed: HashSet::new(),
            namespace_needed: false,
            shimmed_exports: HashSet::new(),
            transform_dependencies: Vec::new(),
            transform_assets: Vec::new(),
            custom_transform_cache: false,
        }
    }

    /// Resolved ids of static internal dependencies in source order.
    pub fn depended_module_ids(&self) -> Vec<JsWord> {
        self.sources
            .iter()
            .filter_map(|source| self.resolved_ids.get(source))
            .filter(|resolved| !resolved.external)
            .map(|resolved| resolved.id.clone())
            .collect()
    }

    /// Resolved ids of dynamically imported internal modules, in source order.
    pub fn dynamic_depended_module_ids(&self) -> Vec<JsWord> {
        self.dynamic_imports
            .iter()
            .filter_map(|dynamic| match &dynamic.resolution {
                Some(DynamicImportResolution::Module(resolved)) if !resolved.external => {
                    Some(resolved.id.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Seed `exports_all` with the names this module itself exposes. The
    /// graph merges `export *` sources on top in dependency order.
    pub fn seed_exports_all(&mut self) {
        for name in &self.export_names {
            self.exports_all.insert(name.clone(), self.id.clone());
        }
    }

    pub fn mark_needed(&mut self, name: &JsWord) -> bool {
        self.needed.insert(name.clone())
    }

    /// One inclusion sweep. Returns whether any statement or binding demand
    /// changed, plus the cross-module demands discovered along the way.
    pub fn include(
        &mut self,
        options: &TreeshakeOptions,
        keep_import_from: &dyn Fn(&ResolvedId) -> bool,
    ) -> (bool, Vec<Demand>) {
        let mut changed = false;
        let mut demands = Vec::new();
        for index in 0..self.statements.len() {
            if self.statements[index].included {
                continue;
            }
            let wanted = {
                let stmt = &self.statements[index];
                if stmt.is_import_declaration {
                    import_decl_source(&stmt.node)
                        .and_then(|source| self.resolved_ids.get(&source))
                        .map(keep_import_from)
                        .unwrap_or(false)
                } else if stmt.is_structural() {
                    false
                } else {
                    stmt.effects.has_effects(options)
                        || stmt.defines.iter().any(|name| self.needed.contains(name))
                }
            };
            if !wanted {
                continue;
            }
            changed = true;
            self.statements[index].included = true;
            let refs = self.statements[index].resolved_refs.clone();
            for (_, binding) in refs {
                match binding {
                    RefBinding::Local(local) => {
                        if self.needed.insert(local) {
                            changed = true;
                        }
                    }
                    RefBinding::Export(resolved) => {
                        if let Some(demand) = Demand::from_resolved(&resolved) {
                            demands.push(demand);
                        }
                    }
                    RefBinding::Global(_) => {}
                }
            }
        }
        (changed, demands)
    }

    /// Tree-shaking disabled: everything survives.
    pub fn include_all_in_bundle(&mut self) -> Vec<Demand> {
        let mut demands = Vec::new();
        for stmt in &mut self.statements {
            stmt.included = true;
            for (_, binding) in &stmt.resolved_refs {
                match binding {
                    RefBinding::Local(local) => {
                        self.needed.insert(local.clone());
                    }
                    RefBinding::Export(resolved) => {
                        if let Some(demand) = Demand::from_resolved(resolved) {
                            demands.push(demand);
                        }
                    }
                    RefBinding::Global(_) => {}
                }
            }
        }
        for name in self.definitions.keys() {
            self.needed.insert(name.clone());
        }
        self.namespace_needed = true;
        demands
    }

    /// Whether tree-shaking left anything in this module.
    pub fn has_included_statements(&self) -> bool {
        self.statements.iter().any(|stmt| stmt.included)
    }
}

pub(crate) fn import_decl_source(node: &ModuleItem) -> Option<JsWord> {
    match node {
        ModuleItem::ModuleDecl(ModuleDecl::Import(import_decl)) => {
            Some(import_decl.src.value.clone())
        }
        _ => None,
    }
}

impl Demand {
    pub(crate) fn from_resolved(resolved: &ResolvedExport) -> Option<Demand> {
        match resolved {
            ResolvedExport::Binding { module, local } => Some(Demand::Binding {
                module: module.clone(),
                name: local.clone(),
            }),
            ResolvedExport::Namespace { module } => Some(Demand::Namespace {
                module: module.clone(),
            }),
            ResolvedExport::External { .. } | ResolvedExport::Shim { .. } => None,
        }
    }
}
