use std::collections::HashSet;
use std::fmt;

use crate::OnWarn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    UnresolvedImport,
    CircularDependency,
    NamespaceConflict,
    UnusedExternalImport,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::UnresolvedImport => "UNRESOLVED_IMPORT",
            WarningCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            WarningCode::NamespaceConflict => "NAMESPACE_CONFLICT",
            WarningCode::UnusedExternalImport => "UNUSED_EXTERNAL_IMPORT",
        }
    }
}

/// A non-fatal structured diagnostic. Renders as
/// `(plugin) file (L:C) message`, with every prefix optional.
#[derive(Debug, Clone)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    pub plugin: Option<String>,
    pub id: Option<String>,
    pub loc: Option<(usize, usize)>,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            plugin: None,
            id: None,
            loc: None,
        }
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_loc(mut self, line: usize, column: usize) -> Self {
        self.loc = Some((line, column));
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(plugin) = &self.plugin {
            write!(f, "({}) ", plugin)?;
        }
        if let Some(id) = &self.id {
            write!(f, "{} ", id)?;
            if let Some((line, column)) = self.loc {
                write!(f, "({}:{}) ", line, column)?;
            }
        }
        f.write_str(&self.message)
    }
}

/// Accumulates the warning sequence of one build and forwards each record to
/// the configured handler. The default handler deduplicates by the rendered
/// string and logs to standard error.
pub struct WarningSink {
    handler: Option<OnWarn>,
    seen: HashSet<String>,
    collected: Vec<Warning>,
}

impl WarningSink {
    pub fn new(handler: Option<OnWarn>) -> Self {
        Self {
            handler,
            seen: HashSet::new(),
            collected: Vec::new(),
        }
    }

    pub fn emit(&mut self, warning: Warning) {
        match &self.handler {
            Some(handler) => handler(&warning),
            None => {
                if self.seen.insert(warning.to_string()) {
                    tracing::warn!(code = warning.code.as_str(), "{}", warning);
                }
            }
        }
        self.collected.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.collected
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.collected)
    }
}
