//! Keyboard layout files.
//!
//! A layout file maps two-digit hex scan codes to a key code, or to an
//! unshifted and a shifted key code separated by a space.  Three formats are
//! read, chosen by extension:
//!
//! ```text
//! fr-azerty.json         { "04": "q Q", "14": "a A" }
//! fr-azerty.yaml/.yml    04: q Q
//! fr-azerty.properties   04=q Q
//! ```
//!
//! The layout is named after the file stem.  The built-in generic layout is
//! always present, so a `generic.*` file in the layout directory is skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hid_handler_core::keymap::GENERIC_LAYOUT;
use hid_handler_core::{LayoutDefinition, LayoutRegistry};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::LayoutSettings;

/// Error type for layout file operations.
#[derive(Debug, Error)]
pub enum LayoutFileError {
    #[error("I/O error reading layout {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON layout {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML layout {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The top level of the file is not a mapping.
    #[error("layout {0} is not a mapping")]
    NotAMapping(PathBuf),

    #[error("unsupported layout file {0}")]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Properties,
}

fn format_of(path: &Path) -> Option<Format> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "json" => Some(Format::Json),
        "yaml" | "yml" => Some(Format::Yaml),
        "properties" => Some(Format::Properties),
        _ => None,
    }
}

/// Reads one layout file.
///
/// # Errors
///
/// [`LayoutFileError`] if the file cannot be read or parsed, or has an
/// unsupported extension.
pub fn load_layout_file(path: &Path) -> Result<LayoutDefinition, LayoutFileError> {
    let format =
        format_of(path).ok_or_else(|| LayoutFileError::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|source| LayoutFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value = match format {
        Format::Json => parse_json(path, &content)?,
        Format::Yaml => parse_yaml(path, &content)?,
        Format::Properties => parse_properties(&content),
    };
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned);
    Ok(LayoutDefinition { name, value })
}

fn parse_json(path: &Path, content: &str) -> Result<BTreeMap<String, String>, LayoutFileError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|source| LayoutFileError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    let serde_json::Value::Object(map) = value else {
        return Err(LayoutFileError::NotAMapping(path.to_path_buf()));
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| {
            let code = match value {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Array(items) => join_tokens(items.iter().map(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })),
                _ => None,
            };
            keep(path, key, code)
        })
        .collect())
}

fn parse_yaml(path: &Path, content: &str) -> Result<BTreeMap<String, String>, LayoutFileError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|source| LayoutFileError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    let serde_yaml::Value::Mapping(map) = value else {
        return Err(LayoutFileError::NotAMapping(path.to_path_buf()));
    };
    Ok(map
        .iter()
        .filter_map(|(key, value)| {
            // Unquoted keys such as `59` come back as numbers.
            let key = yaml_scalar(key)?;
            let code = match value {
                serde_yaml::Value::Sequence(items) => join_tokens(items.iter().map(yaml_scalar)),
                other => yaml_scalar(other),
            };
            keep(path, key, code)
        })
        .collect())
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `key=value` lines; `#` and `!` start comments.
fn parse_properties(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// An `[unshifted, shifted]` list becomes `"unshifted shifted"`.
fn join_tokens(tokens: impl Iterator<Item = Option<String>>) -> Option<String> {
    let tokens: Option<Vec<String>> = tokens.collect();
    tokens.filter(|t| !t.is_empty()).map(|t| t.join(" "))
}

fn keep(path: &Path, key: String, code: Option<String>) -> Option<(String, String)> {
    match code {
        Some(code) => Some((key, code)),
        None => {
            warn!("{}: ignoring non-scalar value for \"{key}\"", path.display());
            None
        }
    }
}

/// Builds the layout registry: the generic layout, every layout file found
/// in `settings.dir`, then `settings.extra`.
///
/// Files that cannot be read are logged and skipped; a missing directory
/// only yields a warning.
pub fn load_layouts(settings: &LayoutSettings) -> LayoutRegistry {
    let mut registry = LayoutRegistry::new();

    if let Some(dir) = &settings.dir {
        for path in layout_files(dir) {
            match load_layout_file(&path) {
                Ok(definition) => {
                    debug!("loaded layout file {}", path.display());
                    registry.register_layout(definition);
                }
                Err(e) => warn!("skipping layout file: {e}"),
            }
        }
    }
    for definition in &settings.extra {
        registry.register_layout(definition.clone());
    }

    info!("{} layout(s) available", registry.len());
    registry
}

/// Supported layout files of `dir`, sorted by path, generic excluded.
fn layout_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot read layout directory {}: {e}", dir.display());
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && format_of(path).is_some())
        .filter(|path| path.file_stem().and_then(|s| s.to_str()) != Some(GENERIC_LAYOUT))
        .collect();
    files.sort();
    files
}

// ── Tests ─────────────────────────────────────────────────────────────────────
