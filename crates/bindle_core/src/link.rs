use hashbrown::{HashMap, HashSet};
use swc_atoms::JsWord;

use crate::{BuildError, ExternalModule, GlobalScope, ImportDesc, ModuleById};

pub type ExternalsById = HashMap<JsWord, ExternalModule>;

/// Where an exported name ultimately lives after walking re-export chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedExport {
    Binding { module: JsWord, local: JsWord },
    Namespace { module: JsWord },
    External { module: JsWord, name: JsWord },
    /// Missing export backed by the `_missingExportShim` sentinel.
    Shim { module: JsWord, name: JsWord },
}

/// Guards re-export and namespace traversal against cycles and repeat work:
/// an (entity, path) pair is only ever walked once per traversal chain.
#[derive(Debug, Default)]
pub struct EntityPathTracker {
    entered: HashSet<(JsWord, JsWord)>,
}

impl EntityPathTracker {
    pub fn enter(&mut self, entity: &JsWord, path: &JsWord) -> bool {
        self.entered.insert((entity.clone(), path.clone()))
    }

    pub fn leave(&mut self, entity: &JsWord, path: &JsWord) {
        self.entered.remove(&(entity.clone(), path.clone()));
    }
}

/// Resolve the binding behind `name` as exported by `from`, walking named
/// re-exports and flattened `export *` chains.
pub fn resolve_export(
    modules: &ModuleById,
    externals: &ExternalsById,
    from: &JsWord,
    name: &JsWord,
    importer: &JsWord,
    shim_missing_exports: bool,
    tracker: &mut EntityPathTracker,
) -> Result<ResolvedExport, BuildError> {
    if externals.contains_key(from) {
        return Ok(ResolvedExport::External {
            module: from.clone(),
            name: name.clone(),
        });
    }
    let module = match modules.get(from) {
        Some(module) => module,
        None => {
            return Ok(ResolvedExport::External {
                module: from.clone(),
                name: name.clone(),
            })
        }
    };
    if !tracker.enter(from, name) {
        // re-export cycle, treat as missing
        return missing_export(from, name, importer, shim_missing_exports);
    }
    let resolved = (|| {
        if let Some(desc) = module.exports.get(name) {
            return Ok(ResolvedExport::Binding {
                module: from.clone(),
                local: desc.local.clone(),
            });
        }
        if let Some(re_export) = module.re_exports.get(name) {
            let target = match module.resolved_ids.get(&re_export.source) {
                Some(target) => target,
                None => return missing_export(from, name, importer, shim_missing_exports),
            };
            if target.external {
                return Ok(ResolvedExport::External {
                    module: target.id.clone(),
                    name: re_export.imported.clone(),
                });
            }
            if &*re_export.imported == "*" {
                return Ok(ResolvedExport::Namespace {
                    module: target.id.clone(),
                });
            }
            return resolve_export(
                modules,
                externals,
                &target.id,
                &re_export.imported,
                importer,
                shim_missing_exports,
                tracker,
            );
        }
        if let Some(origin) = module.exports_all.get(name) {
            if origin != from {
                return resolve_export(
                    modules,
                    externals,
                    origin,
                    name,
                    importer,
                    shim_missing_exports,
                    tracker,
                );
            }
        }
        missing_export(from, name, importer, shim_missing_exports)
    })();
    tracker.leave(from, name);
    resolved
}

fn missing_export(
    from: &JsWord,
    name: &JsWord,
    importer: &JsWord,
    shim_missing_exports: bool,
) -> Result<ResolvedExport, BuildError> {
    if shim_missing_exports {
        Ok(ResolvedExport::Shim {
            module: from.clone(),
            name: name.clone(),
        })
    } else {
        Err(BuildError::MissingExport {
            binding: name.to_string(),
            importer: importer.to_string(),
            source: from.to_string(),
        })
    }
}

pub(crate) fn record_shim(modules: &mut ModuleById, resolved: &ResolvedExport) {
    if let ResolvedExport::Shim { module, name } = resolved {
        if let Some(module) = modules.get_mut(module) {
            module.shimmed_exports.insert(name.clone());
        }
    }
}

/// Pass 1: resolve every import declaration to a concrete binding in the
/// exporting module. External declarations are registered on their
/// [`ExternalModule`] for the unused-import warnings later on.
pub fn link_dependencies(
    modules: &mut ModuleById,
    externals: &mut ExternalsById,
    order: &[JsWord],
    shim_missing_exports: bool,
) -> Result<(), BuildError> {
    for id in order {
        let mut imports: Vec<ImportDesc> = modules
            .get(id)
            .map(|module| module.imports.values().cloned().collect())
            .unwrap_or_default();
        imports.sort_by(|a, b| a.local.cmp(&b.local));

        let mut linked: Vec<(JsWord, RefBinding)> = Vec::with_capacity(imports.len());
        for desc in imports {
            let target = {
                let module = &modules[id];
                match module.resolved_ids.get(&desc.source) {
                    Some(target) => target.clone(),
                    None => {
                        return Err(BuildError::UnresolvedImport {
                            specifier: desc.source.to_string(),
                            importer: id.to_string(),
                        })
                    }
                }
            };
            let binding = if target.external {
                let external = externals
                    .entry(target.id.clone())
                    .or_insert_with(|| ExternalModule::new(target.id.clone()));
                external.add_declaration(id.clone(), desc.local.clone(), desc.imported.clone());
                if &*desc.imported == "*" {
                    external.exports_namespace = true;
                }
                RefBinding::Export(ResolvedExport::External {
                    module: target.id.clone(),
                    name: desc.imported.clone(),
                })
            } else if &*desc.imported == "*" {
                RefBinding::Export(ResolvedExport::Namespace {
                    module: target.id.clone(),
                })
            } else {
                let mut tracker = EntityPathTracker::default();
                let resolved = resolve_export(
                    modules,
                    externals,
                    &target.id,
                    &desc.imported,
                    id,
                    shim_missing_exports,
                    &mut tracker,
                )?;
                record_shim(modules, &resolved);
                RefBinding::Export(resolved)
            };
            linked.push((desc.local, binding));
        }
        let module = modules.get_mut(id).expect("module registered");
        for (local, binding) in linked {
            module.resolved_imports.insert(local, binding);
        }
    }
    Ok(())
}

/// Pass 2: bind every free variable of every statement to its declaring
/// binding: an import, a top-level local, or a global sentinel.
pub fn bind_references(
    modules: &mut ModuleById,
    externals: &mut ExternalsById,
    order: &[JsWord],
    global_scope: &mut GlobalScope,
) {
    for id in order {
        let statement_count = modules.get(id).map(|m| m.statements.len()).unwrap_or(0);
        for index in 0..statement_count {
            let depends_on = modules[id].statements[index].depends_on.clone();
            let mut refs = Vec::with_capacity(depends_on.len());
            for name in depends_on {
                let binding = if let Some(binding) = modules[id].resolved_imports.get(&name) {
                    let binding = binding.clone();
                    if let RefBinding::Export(ResolvedExport::External { module, .. }) = &binding {
                        let external_id = module.clone();
                        if let Some(external) = externals.get_mut(&external_id) {
                            external.mark_used(id, &name);
                        }
                    }
                    binding
                } else if modules[id].definitions.contains_key(&name) {
                    RefBinding::Local(name.clone())
                } else {
                    global_scope.find_variable(&name);
                    RefBinding::Global(name.clone())
                };
                refs.push((name, binding));
            }
            modules.get_mut(id).expect("module registered").statements[index].resolved_refs =
                refs;
        }
    }
}

/// How one identifier reference resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefBinding {
    /// A top-level binding of the same module.
    Local(JsWord),
    /// An imported binding, fully resolved through re-export chains.
    Export(ResolvedExport),
    /// Nothing declares it; resolved against the global scope.
    Global(JsWord),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_detects_reentry() {
        let mut tracker = EntityPathTracker::default();
        let module: JsWord = "/a.js".into();
        let name: JsWord = "foo".into();
        assert!(tracker.enter(&module, &name));
        assert!(!tracker.enter(&module, &name));
        tracker.leave(&module, &name);
        assert!(tracker.enter(&module, &name));
    }
}
