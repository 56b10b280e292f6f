pub mod log;
pub mod side_effect;

use std::hash::{BuildHasher, Hash, Hasher};
use std::path::Path;

use ahash::RandomState;
use once_cell::sync::Lazy;
use sugar_path::PathSugar;
use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_parser::{lexer::Lexer, EsConfig, Parser, StringInput, Syntax};

use crate::ParseOptions;

/// Resolve a specifier the way the default resolver does: relative to the
/// importer's directory, or to the build root for entries. A `.js` extension
/// is appended when the specifier has none.
pub fn default_resolve(specifier: &str, importer: Option<&str>, root: &str) -> String {
    let base_dir = importer
        .and_then(|importer| Path::new(importer).parent())
        .unwrap_or_else(|| Path::new(root));
    let mut path = base_dir.join(Path::new(specifier)).resolve();
    if path.extension().is_none() {
        path.set_extension("js");
    }
    path.to_string_lossy().to_string()
}

/// Render an id relative to the current working directory for diagnostics.
pub fn relative_id(id: &str) -> String {
    let path = Path::new(id);
    if !path.is_absolute() {
        return id.to_string();
    }
    let cwd = std::env::current_dir().unwrap_or_default();
    path.relative(&cwd).to_string_lossy().to_string()
}

pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".."
}

pub fn parse_file(
    source_code: String,
    filename: &str,
    cm: &Lrc<SourceMap>,
    options: &ParseOptions,
) -> Result<ast::Module, String> {
    let fm = cm.new_source_file(FileName::Custom(filename.to_string()), source_code);
    let syntax = Syntax::Es(EsConfig {
        jsx: options.jsx,
        import_assertions: true,
        export_default_from: true,
        private_in_object: true,
        ..Default::default()
    });
    let lexer = Lexer::new(
        syntax,
        ast::EsVersion::Es2022,
        StringInput::from(fm.as_ref()),
        None,
    );
    let mut parser = Parser::new_from(lexer);
    let module = parser
        .parse_module()
        .map_err(|err| err.into_kind().msg().to_string())?;
    if let Some(err) = parser.take_errors().into_iter().next() {
        return Err(err.into_kind().msg().to_string());
    }
    Ok(module)
}

static STATE_LO: Lazy<RandomState> = Lazy::new(|| {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
});

static STATE_HI: Lazy<RandomState> = Lazy::new(|| {
    RandomState::with_seeds(
        0x4528_21e6_38d0_1377,
        0xbe54_66cf_34e9_0c6c,
        0xc0ac_29b7_c97c_50dd,
        0x3f84_d5b5_b547_0917,
    )
});

/// Deterministic 128-bit digest of a string; two independently seeded
/// 64-bit halves. Stable across runs and platforms of the same build.
pub fn hash16(value: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let mut lo = STATE_LO.build_hasher();
    value.hash(&mut lo);
    out[..8].copy_from_slice(&lo.finish().to_le_bytes());
    let mut hi = STATE_HI.build_hasher();
    value.hash(&mut hi);
    out[8..].copy_from_slice(&hi.finish().to_le_bytes());
    out
}

pub fn xor16(acc: &mut [u8; 16], other: &[u8; 16]) {
    for (byte, with) in acc.iter_mut().zip(other.iter()) {
        *byte ^= with;
    }
}

pub fn hex16(digest: &[u8; 16]) -> String {
    use std::fmt::Write;
    digest.iter().fold(String::with_capacity(32), |mut acc, byte| {
        let _ = write!(acc, "{:02x}", byte);
        acc
    })
}

/// Derive the name of a chunk from the uri of its entry module.
pub fn uri_to_chunk_name(root: &str, uri: &str) -> String {
    let mut relatived = Path::new(uri).relative(root);
    relatived.set_extension("");
    let mut segments = relatived
        .components()
        .filter(|component| matches!(component, std::path::Component::Normal(_)))
        .filter_map(|segment| segment.as_os_str().to_str())
        .collect::<Vec<_>>();
    if segments.is_empty() {
        segments.push("chunk");
    }
    segments.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_of_two_entry_hashes_is_commutative() {
        let a = hash16("/src/a.js");
        let b = hash16("/src/b.js");
        let mut left = [0u8; 16];
        xor16(&mut left, &a);
        xor16(&mut left, &b);
        let mut right = [0u8; 16];
        xor16(&mut right, &b);
        xor16(&mut right, &a);
        assert_eq!(left, right);
        assert_ne!(left, [0u8; 16]);
    }

    #[test]
    fn hash16_is_deterministic_and_distinguishes_ids() {
        assert_eq!(hash16("/src/a.js"), hash16("/src/a.js"));
        assert_ne!(hash16("/src/a.js"), hash16("/src/b.js"));
    }

    #[test]
    fn default_resolve_is_relative_to_the_importer() {
        let resolved = default_resolve("./dep", Some("/proj/src/main.js"), "/proj");
        assert_eq!(resolved, "/proj/src/dep.js");
        let entry = default_resolve("./src/main.js", None, "/proj");
        assert_eq!(entry, "/proj/src/main.js");
    }

    #[test]
    fn hex_encoding_is_lowercase_and_stable() {
        let digest = [0u8, 1, 0xab, 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10];
        assert_eq!(hex16(&digest), "0001abff000000000000000000000010");
    }
}
