use hashbrown::HashSet;
use swc_atoms::JsWord;

use crate::{Warning, WarningCode, WarningSink};

/// An import binding pointing into an external module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBinding {
    pub importer: JsWord,
    pub local: JsWord,
    pub imported: JsWord,
}

/// Stands in for an id the host declared external. Only the import/export
/// shape is tracked; an external module never has an AST.
#[derive(Debug)]
pub struct ExternalModule {
    pub id: JsWord,
    /// A namespace object for this module is observable from the bundle.
    pub exports_namespace: bool,
    pub declarations: Vec<ExternalBinding>,
    used: HashSet<(JsWord, JsWord)>,
}

impl ExternalModule {
    pub fn new(id: JsWord) -> Self {
        Self {
            id,
            exports_namespace: false,
            declarations: Vec::new(),
            used: HashSet::new(),
        }
    }

    pub fn add_declaration(&mut self, importer: JsWord, local: JsWord, imported: JsWord) {
        let binding = ExternalBinding {
            importer,
            local,
            imported,
        };
        if !self.declarations.contains(&binding) {
            self.declarations.push(binding);
        }
    }

    pub fn mark_used(&mut self, importer: &JsWord, local: &JsWord) {
        self.used.insert((importer.clone(), local.clone()));
    }

    pub fn is_used(&self) -> bool {
        !self.used.is_empty() || self.exports_namespace
    }

    /// Emit `UNUSED_EXTERNAL_IMPORT` for every declared binding that never
    /// resolved to a reference.
    pub fn warn_unused_imports(&self, sink: &mut WarningSink) {
        for binding in &self.declarations {
            if &*binding.imported == "*" {
                continue;
            }
            if self
                .used
                .contains(&(binding.importer.clone(), binding.local.clone()))
            {
                continue;
            }
            sink.emit(
                Warning::new(
                    WarningCode::UnusedExternalImport,
                    format!(
                        "'{}' is imported from external module '{}' but never used",
                        binding.imported, self.id
                    ),
                )
                .with_id(binding.importer.to_string()),
            );
        }
    }
}
