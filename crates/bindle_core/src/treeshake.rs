use swc_atoms::JsWord;

use crate::{
    record_shim, resolve_export, BuildError, EntityPathTracker, ExternalsById, ModuleById,
    ResolvedExport, ResolvedId, Treeshake, TreeshakeOptions,
};

/// A cross-module inclusion request discovered while marking statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Demand {
    Binding { module: JsWord, name: JsWord },
    Namespace { module: JsWord },
}

/// Mark the public exports of an entry (or dynamic-import root) as the roots
/// of the inclusion fixed point.
pub fn mark_public_exports(
    modules: &mut ModuleById,
    externals: &mut ExternalsById,
    entry: &JsWord,
    shim_missing_exports: bool,
) -> Result<Vec<Demand>, BuildError> {
    let mut names: Vec<JsWord> = match modules.get(entry) {
        Some(module) => module.export_names.clone(),
        None => return Ok(Vec::new()),
    };
    let mut extra: Vec<JsWord> = modules[entry]
        .exports_all
        .keys()
        .filter(|name| !names.contains(*name))
        .cloned()
        .collect();
    extra.sort();
    names.extend(extra);

    let mut demands = Vec::new();
    for name in names {
        let mut tracker = EntityPathTracker::default();
        let resolved = resolve_export(
            modules,
            externals,
            entry,
            &name,
            entry,
            shim_missing_exports,
            &mut tracker,
        )?;
        record_shim(modules, &resolved);
        match &resolved {
            ResolvedExport::External { module, .. } => {
                if let Some(external) = externals.get_mut(module) {
                    external.mark_used(entry, &name);
                }
            }
            _ => {
                if let Some(demand) = Demand::from_resolved(&resolved) {
                    demands.push(demand);
                }
            }
        }
    }
    Ok(demands)
}

/// Apply one demand, expanding namespace demands into per-binding demands.
/// Returns whether anything new was marked.
fn apply_demand(
    modules: &mut ModuleById,
    externals: &mut ExternalsById,
    demand: Demand,
    queue: &mut Vec<Demand>,
    shim_missing_exports: bool,
) -> Result<bool, BuildError> {
    match demand {
        Demand::Binding { module, name } => Ok(modules
            .get_mut(&module)
            .map(|module| module.mark_needed(&name))
            .unwrap_or(false)),
        Demand::Namespace { module } => {
            if let Some(external) = externals.get_mut(&module) {
                let changed = !external.exports_namespace;
                external.exports_namespace = true;
                return Ok(changed);
            }
            let already = match modules.get_mut(&module) {
                Some(target) => {
                    let already = target.namespace_needed;
                    target.namespace_needed = true;
                    already
                }
                None => return Ok(false),
            };
            if already {
                return Ok(false);
            }
            // a namespace object exposes every export
            let mut names: Vec<JsWord> = modules[&module].export_names.clone();
            let mut extra: Vec<JsWord> = modules[&module]
                .exports_all
                .keys()
                .filter(|name| !names.contains(*name))
                .cloned()
                .collect();
            extra.sort();
            names.extend(extra);
            for name in names {
                let mut tracker = EntityPathTracker::default();
                let resolved = resolve_export(
                    modules,
                    externals,
                    &module,
                    &name,
                    &module,
                    shim_missing_exports,
                    &mut tracker,
                )?;
                record_shim(modules, &resolved);
                if let Some(demand) = Demand::from_resolved(&resolved) {
                    queue.push(demand);
                }
            }
            Ok(true)
        }
    }
}

fn drain_demands(
    modules: &mut ModuleById,
    externals: &mut ExternalsById,
    mut queue: Vec<Demand>,
    shim_missing_exports: bool,
) -> Result<bool, BuildError> {
    let mut changed = false;
    while let Some(demand) = queue.pop() {
        if apply_demand(modules, externals, demand, &mut queue, shim_missing_exports)? {
            changed = true;
        }
    }
    Ok(changed)
}

/// The inclusion fixed point: seed from every root's public exports, then
/// sweep `module.include()` over the execution order until nothing changes.
/// Inclusion only ever grows, so the loop terminates.
pub fn shake(
    modules: &mut ModuleById,
    externals: &mut ExternalsById,
    ordered: &[JsWord],
    roots: &[JsWord],
    treeshake: &Treeshake,
    shim_missing_exports: bool,
) -> Result<(), BuildError> {
    for root in roots {
        let demands = mark_public_exports(modules, externals, root, shim_missing_exports)?;
        drain_demands(modules, externals, demands, shim_missing_exports)?;
    }

    let options = match treeshake.options() {
        Some(options) => options.clone(),
        None => {
            for id in ordered {
                let demands = match modules.get_mut(id) {
                    Some(module) => module.include_all_in_bundle(),
                    None => continue,
                };
                drain_demands(modules, externals, demands, shim_missing_exports)?;
            }
            return Ok(());
        }
    };

    let keep_import_from = make_import_filter(&options);
    loop {
        let mut changed = false;
        for id in ordered {
            let (module_changed, demands) = match modules.get_mut(id) {
                Some(module) => module.include(&options, keep_import_from.as_ref()),
                None => continue,
            };
            if module_changed {
                changed = true;
            }
            if drain_demands(modules, externals, demands, shim_missing_exports)? {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    Ok(())
}

fn make_import_filter(options: &TreeshakeOptions) -> Box<dyn Fn(&ResolvedId) -> bool> {
    let pure = options.pure_external_modules.clone();
    Box::new(move |resolved: &ResolvedId| resolved.external && !pure.is_pure(resolved.id.as_ref()))
}
