use hashbrown::{HashMap, HashSet};
use swc_atoms::JsWord;

use crate::utils::{hash16, relative_id, xor16};
use crate::ModuleById;

/// Result of the execution-order pass: a topological order over the static
/// dependency DAG, the back-edge cycle paths, and the dynamic-import
/// frontier that seeds additional chunk roots.
#[derive(Debug, Default)]
pub struct ExecutionAnalysis {
    pub ordered_modules: Vec<JsWord>,
    pub cycle_paths: Vec<Vec<String>>,
    pub dynamic_imports: Vec<JsWord>,
    pub dynamic_import_aliases: Vec<String>,
}

struct AnalysisState {
    ordered: Vec<JsWord>,
    cycle_paths: Vec<Vec<String>>,
    analysed: HashSet<JsWord>,
    parents: HashMap<JsWord, Option<JsWord>>,
    dynamic_candidates: Vec<JsWord>,
    inline_dynamic_imports: bool,
}

fn analyse_module(id: &JsWord, modules: &ModuleById, state: &mut AnalysisState) {
    let module = match modules.get(id) {
        Some(module) => module,
        None => return,
    };
    let mut dependencies = module.depended_module_ids();
    if state.inline_dynamic_imports {
        dependencies.extend(module.dynamic_depended_module_ids());
    } else {
        for dynamic in module.dynamic_depended_module_ids() {
            if !state.dynamic_candidates.contains(&dynamic) {
                state.dynamic_candidates.push(dynamic);
            }
        }
    }
    for dependency in dependencies {
        if state.parents.contains_key(&dependency) {
            if !state.analysed.contains(&dependency) {
                state
                    .cycle_paths
                    .push(get_cycle_path(&dependency, id, &state.parents));
            }
            continue;
        }
        state.parents.insert(dependency.clone(), Some(id.clone()));
        analyse_module(&dependency, modules, state);
    }
    state.ordered.push(id.clone());
    state.analysed.insert(id.clone());
}

fn get_cycle_path(
    module: &JsWord,
    parent: &JsWord,
    parents: &HashMap<JsWord, Option<JsWord>>,
) -> Vec<String> {
    let mut path = vec![relative_id(module)];
    let mut next_module = Some(parent.clone());
    while let Some(current) = next_module {
        if current == *module {
            break;
        }
        path.push(relative_id(&current));
        next_module = parents.get(&current).cloned().flatten();
    }
    path.push(relative_id(module));
    path.reverse();
    path
}

/// Walk the graph from the entries in configured order. Ties in the
/// topological order break towards the first visit from the lowest-indexed
/// entry; dynamic-import targets form their own frontier afterwards unless
/// they are inlined into the static traversal.
pub fn analyse_module_execution(
    modules: &ModuleById,
    entry_modules: &[JsWord],
    inline_dynamic_imports: bool,
) -> ExecutionAnalysis {
    let mut state = AnalysisState {
        ordered: Vec::new(),
        cycle_paths: Vec::new(),
        analysed: HashSet::new(),
        parents: HashMap::new(),
        dynamic_candidates: Vec::new(),
        inline_dynamic_imports,
    };

    for entry in entry_modules {
        if !state.parents.contains_key(entry) {
            state.parents.insert(entry.clone(), None);
            analyse_module(entry, modules, &mut state);
        }
    }

    let mut dynamic_imports = Vec::new();
    let mut index = 0;
    while index < state.dynamic_candidates.len() {
        let candidate = state.dynamic_candidates[index].clone();
        index += 1;
        if state.parents.contains_key(&candidate) {
            continue;
        }
        state.parents.insert(candidate.clone(), None);
        analyse_module(&candidate, modules, &mut state);
        dynamic_imports.push(candidate);
    }

    let dynamic_import_aliases = dynamic_imports
        .iter()
        .map(|id| {
            std::path::Path::new(id.as_ref())
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("chunk")
                .to_string()
        })
        .collect();

    ExecutionAnalysis {
        ordered_modules: state.ordered,
        cycle_paths: state.cycle_paths,
        dynamic_imports,
        dynamic_import_aliases,
    }
}

/// XOR the 128-bit hash of every reaching root into each module it reaches
/// over static edges; dynamic import boundaries cut the traversal unless
/// they are inlined. The resulting digest is the chunk color.
pub fn assign_entry_points_hashes(
    modules: &mut ModuleById,
    roots: &[JsWord],
    inline_dynamic_imports: bool,
) {
    for module in modules.values_mut() {
        module.entry_points_hash = [0u8; 16];
    }
    for root in roots {
        let root_hash = hash16(root.as_ref());
        let mut stack = vec![root.clone()];
        let mut visited: HashSet<JsWord> = HashSet::new();
        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let module = match modules.get_mut(&id) {
                Some(module) => module,
                None => continue,
            };
            xor16(&mut module.entry_points_hash, &root_hash);
            let mut next = module.depended_module_ids();
            if inline_dynamic_imports {
                next.extend(module.dynamic_depended_module_ids());
            }
            for dependency in next {
                if !visited.contains(&dependency) {
                    stack.push(dependency);
                }
            }
        }
    }
}
