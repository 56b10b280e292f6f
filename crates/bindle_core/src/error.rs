use thiserror::Error;

/// Fatal build failures. Every variant carries the diagnostic code the
/// reporting layer keys on; warnings live in [`crate::Warning`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Could not resolve entry ({unresolved_id})")]
    UnresolvedEntry { unresolved_id: String },

    #[error("Duplicate entry points detected: alias {alias} points to {id} which is already an entry")]
    DuplicateEntryPoints { alias: String, id: String },

    #[error("Error loading {id}: the loader did not return usable source text")]
    BadLoader { id: String },

    #[error("Could not load {id}{}: {source}", fmt_importer(.importer))]
    CouldNotLoad {
        id: String,
        importer: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Could not resolve '{specifier}' from {importer}")]
    UnresolvedImport { specifier: String, importer: String },

    #[error("'{binding}' is not exported by {source}, imported by {importer}")]
    MissingExport {
        binding: String,
        importer: String,
        source: String,
    },

    #[error("Parse error in {id}{}: {message}", fmt_importer(.importer))]
    ParseError {
        id: String,
        importer: Option<String>,
        message: String,
    },

    #[error("'{id}' is imported as an external by a plugin, but plugin ids must not be external")]
    InvalidExternalId { id: String },

    #[error("{message}")]
    InvalidOption { message: String },

    #[error("Graph has already been built; a graph is single-use")]
    AlreadyBuilt,

    #[error("Error in plugin '{plugin}' (hook '{hook}'): {source}")]
    PluginHook {
        plugin: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

fn fmt_importer(importer: &Option<String>) -> String {
    importer
        .as_ref()
        .map(|importer| format!(" (imported by {})", importer))
        .unwrap_or_default()
}

impl BuildError {
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::UnresolvedEntry { .. } => "UNRESOLVED_ENTRY",
            BuildError::DuplicateEntryPoints { .. } => "DUPLICATE_ENTRY_POINTS",
            BuildError::BadLoader { .. } => "BAD_LOADER",
            BuildError::CouldNotLoad { .. } => "COULD_NOT_LOAD",
            BuildError::UnresolvedImport { .. } => "UNRESOLVED_IMPORT",
            BuildError::MissingExport { .. } => "MISSING_EXPORT",
            BuildError::ParseError { .. } => "PARSE_ERROR",
            BuildError::InvalidExternalId { .. } => "INVALID_EXTERNAL_ID",
            BuildError::InvalidOption { .. } => "INVALID_OPTION",
            BuildError::AlreadyBuilt => "ALREADY_BUILT",
            BuildError::PluginHook { .. } => "PLUGIN_ERROR",
        }
    }

    /// Name of the plugin a hook failure originated in, if any.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            BuildError::PluginHook { plugin, .. } => Some(plugin),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn could_not_load_mentions_the_importer() {
        let err = BuildError::CouldNotLoad {
            id: "./missing.js".to_string(),
            importer: Some("main.js".to_string()),
            source: anyhow::anyhow!("file not found"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("Could not load ./missing.js"));
        assert!(rendered.contains("(imported by main.js)"));
        assert!(rendered.contains("file not found"));
    }

    #[test]
    fn codes_are_stable() {
        let err = BuildError::UnresolvedEntry {
            unresolved_id: "x".into(),
        };
        assert_eq!(err.code(), "UNRESOLVED_ENTRY");
        let err = BuildError::PluginHook {
            plugin: "virtual".into(),
            hook: "load",
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.code(), "PLUGIN_ERROR");
        assert_eq!(err.plugin(), Some("virtual"));
    }
}
