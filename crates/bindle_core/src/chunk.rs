use hashbrown::{HashMap, HashSet};
use petgraph::graphmap::DiGraphMap;
use swc_atoms::JsWord;

use crate::utils::{hash16, hex16, uri_to_chunk_name};
use crate::{
    resolve_export, BuildError, EntityPathTracker, ExternalsById, InputOptions, ModuleById,
    RefBinding, ResolvedExport,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChunkTarget {
    Chunk(usize),
    External(JsWord),
}

/// Names a chunk pulls in from another chunk or an external module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkImport {
    pub from: ChunkTarget,
    /// Imported binding names; `*` stands for a namespace object. Empty for
    /// a pure side-effect dependency.
    pub names: Vec<JsWord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkExport {
    pub exported: JsWord,
    pub module: JsWord,
    pub local: JsWord,
}

/// An ordered set of modules sharing one entry-reachability color, emitted
/// as one output file.
#[derive(Debug)]
pub struct Chunk {
    pub id: String,
    /// Module ids in execution order.
    pub modules: Vec<JsWord>,
    pub entry_module: Option<JsWord>,
    pub is_entry_module_facade: bool,
    pub is_manual_chunk: bool,
    pub imports: Vec<ChunkImport>,
    pub exports: Vec<ChunkExport>,
}

impl Chunk {
    fn new(id: String) -> Self {
        Self {
            id,
            modules: Vec::new(),
            entry_module: None,
            is_entry_module_facade: false,
            is_manual_chunk: false,
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    fn add_import(&mut self, from: ChunkTarget, name: Option<JsWord>) {
        if let Some(existing) = self.imports.iter_mut().find(|import| import.from == from) {
            if let Some(name) = name {
                if !existing.names.contains(&name) {
                    existing.names.push(name);
                }
            }
            return;
        }
        self.imports.push(ChunkImport {
            from,
            names: name.into_iter().collect(),
        });
    }
}

/// The partitioned build: chunks plus the cross-chunk dependency relation.
#[derive(Debug)]
pub struct ChunkGraph {
    pub chunks: Vec<Chunk>,
    pub relations: DiGraphMap<usize, ()>,
}

impl ChunkGraph {
    pub fn chunk_of(&self, module: &JsWord) -> Option<&Chunk> {
        self.chunks
            .iter()
            .find(|chunk| chunk.modules.contains(module))
    }

    pub fn entry_chunk(&self, entry: &JsWord) -> Option<&Chunk> {
        self.chunks
            .iter()
            .find(|chunk| chunk.entry_module.as_ref() == Some(entry))
    }
}

/// Partition included modules into chunks by entry-reachability color,
/// attach entries, build facades, and resolve cross-chunk bindings.
pub fn generate_chunks(
    modules: &mut ModuleById,
    externals: &ExternalsById,
    ordered: &[JsWord],
    roots: &[JsWord],
    options: &InputOptions,
) -> Result<ChunkGraph, BuildError> {
    let manual_alias_by_module: HashMap<&str, &str> = options
        .manual_chunks
        .iter()
        .flat_map(|(alias, ids)| ids.iter().map(move |id| (id.as_str(), alias.as_str())))
        .collect();

    let root_set: HashSet<&JsWord> = roots.iter().collect();
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut chunk_index_by_key: HashMap<String, usize> = HashMap::new();

    for id in ordered {
        let module = match modules.get(id) {
            Some(module) => module,
            None => continue,
        };
        let participates = module.has_included_statements() || root_set.contains(id);
        if !participates {
            continue;
        }
        let key = if options.preserve_modules {
            format!("module:{}", id)
        } else if let Some(alias) = manual_alias_by_module.get(id.as_ref()) {
            format!("manual:{}", alias)
        } else {
            hex16(&module.entry_points_hash)
        };
        let index = *chunk_index_by_key.entry(key.clone()).or_insert_with(|| {
            let mut chunk = Chunk::new(key.clone());
            chunk.is_manual_chunk = key.starts_with("manual:");
            chunks.push(chunk);
            chunks.len() - 1
        });
        chunks[index].modules.push(id.clone());
    }

    // entries claim their home chunk; a chunk is the entry's facade when the
    // entry alone colors it
    for root in roots {
        let module = match modules.get(root) {
            Some(module) => module,
            None => continue,
        };
        let own_color = hash16(root.as_ref());
        let chunk = chunks
            .iter_mut()
            .find(|chunk| chunk.modules.contains(root));
        if let Some(chunk) = chunk {
            if chunk.entry_module.is_none() {
                chunk.entry_module = Some(root.clone());
                chunk.is_entry_module_facade = options.preserve_modules
                    || options.inline_dynamic_imports
                    || module.entry_points_hash == own_color;
            }
        }
    }

    if options.preserve_modules {
        // every surviving module fronts its own chunk
        for chunk in chunks.iter_mut() {
            if chunk.entry_module.is_some() {
                continue;
            }
            let non_empty = chunk.modules.iter().any(|id| {
                modules
                    .get(id)
                    .map(|module| module.has_included_statements())
                    .unwrap_or(false)
            });
            if non_empty {
                chunk.entry_module = chunk.modules.first().cloned();
                chunk.is_entry_module_facade = true;
            }
        }
    }

    // drop chunks tree-shaking emptied, unless an entry lives there or the
    // user pinned them
    let mut kept = Vec::new();
    for chunk in chunks {
        let has_content = chunk.modules.iter().any(|id| {
            modules
                .get(id)
                .map(|module| module.has_included_statements())
                .unwrap_or(false)
        });
        if has_content || chunk.entry_module.is_some() || chunk.is_manual_chunk {
            kept.push(chunk);
        }
    }
    let mut chunks = kept;

    for (index, chunk) in chunks.iter().enumerate() {
        for id in &chunk.modules {
            if let Some(module) = modules.get_mut(id) {
                module.chunk = Some(index);
            }
        }
    }

    // facades keep coalesced entries' public APIs addressable
    let mut facades: Vec<Chunk> = Vec::new();
    for root in roots {
        let needs_facade = match chunks
            .iter()
            .find(|chunk| chunk.modules.contains(root))
        {
            Some(home) => !(home.entry_module.as_ref() == Some(root) && home.is_entry_module_facade),
            None => continue,
        };
        if needs_facade {
            let alias = modules
                .get(root)
                .and_then(|module| module.chunk_alias.clone())
                .unwrap_or_else(|| uri_to_chunk_name(&options.normalized_root(), root.as_ref()));
            let mut facade = Chunk::new(alias);
            facade.entry_module = Some(root.clone());
            facade.is_entry_module_facade = true;
            facades.push(facade);
        }
    }
    chunks.extend(facades);

    name_chunks(&mut chunks, modules, options);
    let relations = link_chunks(&mut chunks, modules, externals, options)?;
    Ok(ChunkGraph { chunks, relations })
}

fn name_chunks(chunks: &mut [Chunk], modules: &ModuleById, options: &InputOptions) {
    let root = options.normalized_root();
    for chunk in chunks.iter_mut() {
        if let Some(alias) = chunk.id.strip_prefix("manual:") {
            chunk.id = alias.to_string();
            continue;
        }
        if let Some(entry) = &chunk.entry_module {
            if let Some(alias) = modules.get(entry).and_then(|module| module.chunk_alias.clone()) {
                chunk.id = alias;
                continue;
            }
            chunk.id = uri_to_chunk_name(&root, entry.as_ref());
            continue;
        }
        if let Some(stripped) = chunk.id.strip_prefix("module:") {
            chunk.id = uri_to_chunk_name(&root, stripped);
            continue;
        }
        let color = chunk.id.clone();
        chunk.id = format!("chunk-{}", &color[..color.len().min(8)]);
    }
}

fn link_chunks(
    chunks: &mut Vec<Chunk>,
    modules: &mut ModuleById,
    externals: &ExternalsById,
    options: &InputOptions,
) -> Result<DiGraphMap<usize, ()>, BuildError> {
    let mut relations = DiGraphMap::new();
    let chunk_count = chunks.len();
    for index in 0..chunk_count {
        relations.add_node(index);
        let module_ids = chunks[index].modules.clone();
        for module_id in &module_ids {
            // execution-order edges: a chunk depends on every chunk its
            // modules statically import, bindings or not
            let static_deps = modules
                .get(module_id)
                .map(|module| module.depended_module_ids())
                .unwrap_or_default();
            for dep in static_deps {
                if let Some(target) = modules.get(&dep).and_then(|m| m.chunk) {
                    if target != index {
                        chunks[index].add_import(ChunkTarget::Chunk(target), None);
                        relations.add_edge(index, target, ());
                    }
                }
            }
            let bindings: Vec<(RefBinding, bool)> = {
                let module = &modules[module_id];
                let mut out = Vec::new();
                for stmt in &module.statements {
                    if !stmt.included {
                        continue;
                    }
                    for (_, binding) in &stmt.resolved_refs {
                        out.push((binding.clone(), false));
                    }
                    if stmt.is_import_declaration {
                        if let Some(source) = crate::import_decl_source(&stmt.node) {
                            if let Some(resolved) = module.resolved_ids.get(&source) {
                                if resolved.external {
                                    out.push((
                                        RefBinding::Export(ResolvedExport::External {
                                            module: resolved.id.clone(),
                                            name: "".into(),
                                        }),
                                        true,
                                    ));
                                }
                            }
                        }
                    }
                }
                out
            };
            for (binding, side_effect_only) in bindings {
                match binding {
                    RefBinding::Export(ResolvedExport::Binding { module, local }) => {
                        let target_chunk = modules.get(&module).and_then(|m| m.chunk);
                        if let Some(target) = target_chunk {
                            if target != index {
                                chunks[index]
                                    .add_import(ChunkTarget::Chunk(target), Some(local.clone()));
                                relations.add_edge(index, target, ());
                                let export = ChunkExport {
                                    exported: local.clone(),
                                    module,
                                    local,
                                };
                                if !chunks[target].exports.contains(&export) {
                                    chunks[target].exports.push(export);
                                }
                            }
                        }
                    }
                    RefBinding::Export(ResolvedExport::Namespace { module }) => {
                        let target_chunk = modules.get(&module).and_then(|m| m.chunk);
                        match target_chunk {
                            Some(target) if target != index => {
                                chunks[index]
                                    .add_import(ChunkTarget::Chunk(target), Some("*".into()));
                                relations.add_edge(index, target, ());
                            }
                            Some(_) => {}
                            None => {
                                if externals.contains_key(&module) {
                                    chunks[index]
                                        .add_import(ChunkTarget::External(module), Some("*".into()));
                                }
                            }
                        }
                    }
                    RefBinding::Export(ResolvedExport::External { module, name }) => {
                        let name = if side_effect_only || name.is_empty() {
                            None
                        } else {
                            Some(name)
                        };
                        chunks[index].add_import(ChunkTarget::External(module), name);
                    }
                    RefBinding::Export(ResolvedExport::Shim { .. })
                    | RefBinding::Local(_)
                    | RefBinding::Global(_) => {}
                }
            }
        }
    }

    // populate entry-chunk exports, and wire facades to their home chunks
    for index in 0..chunk_count {
        let entry = match chunks[index].entry_module.clone() {
            Some(entry) => entry,
            None => continue,
        };
        let mut names: Vec<JsWord> = modules
            .get(&entry)
            .map(|module| module.export_names.clone())
            .unwrap_or_default();
        let mut extra: Vec<JsWord> = modules
            .get(&entry)
            .map(|module| {
                module
                    .exports_all
                    .keys()
                    .filter(|name| !names.contains(*name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        extra.sort();
        names.extend(extra);

        for name in names {
            let mut tracker = EntityPathTracker::default();
            let resolved = resolve_export(
                modules,
                externals,
                &entry,
                &name,
                &entry,
                options.shim_missing_exports,
                &mut tracker,
            )?;
            match resolved {
                ResolvedExport::Binding { module, local } => {
                    let export = ChunkExport {
                        exported: name.clone(),
                        module: module.clone(),
                        local: local.clone(),
                    };
                    if !chunks[index].exports.contains(&export) {
                        chunks[index].exports.push(export);
                    }
                    // a facade chunk re-imports what it re-exports
                    if let Some(target) = modules.get(&module).and_then(|m| m.chunk) {
                        if target != index {
                            chunks[index].add_import(ChunkTarget::Chunk(target), Some(local));
                            relations.add_edge(index, target, ());
                        }
                    }
                }
                ResolvedExport::External { module, name: imported } => {
                    chunks[index].add_import(ChunkTarget::External(module), Some(imported));
                }
                ResolvedExport::Namespace { module } => {
                    if let Some(target) = modules.get(&module).and_then(|m| m.chunk) {
                        if target != index {
                            chunks[index].add_import(ChunkTarget::Chunk(target), Some("*".into()));
                            relations.add_edge(index, target, ());
                        }
                    }
                }
                ResolvedExport::Shim { .. } => {}
            }
        }
    }

    Ok(relations)
}
