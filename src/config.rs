//! Prerender configuration module.
//!
//! Handles loading, validating, and merging `prerender.toml`. Stock defaults
//! are serialized to a TOML table and the user file is merged on top, so a
//! config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output_root = "html"             # Where pages are written
//! page_filename = "index.html"     # File written inside each route directory
//! not_found_filename = "404.html"  # Written directly under output_root
//! routes = ["/"]                   # Seed routes
//! # max_concurrent_renders = 4     # Omit for unbounded
//! template = "html/index.html"     # Page template
//! data_dir = "static/data"         # Bootstrap documents, one per route
//! not_found_message = "not found"  # Omit for no not-found page
//!
//! [[copy]]
//! from = "static/media"
//! to = "html/media"
//! message = "collecting media files..."
//!
//! [[copy]]
//! from = "static/data"
//! to = "html/data"
//! transform = "minify-json"
//! ```
//!
//! ## Partial Configuration
//!
//! Override just the values you want:
//!
//! ```toml
//! max_concurrent_renders = 2
//! routes = ["/", "/about"]
//! ```
//!
//! Setting `copy` replaces the whole list; arrays are not merged.
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::prerender::PrerenderOptions;
use crate::render::{RenderError, TemplateRenderer};
use crate::replicate::{CopySpec, MinifyJson};
use crate::route::Route;
use crate::scheduler::Concurrency;

/// Name of the config file looked up by [`load_config_from`].
pub const CONFIG_FILENAME: &str = "prerender.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Prerender configuration loaded from `prerender.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrerenderConfig {
    /// Root directory pages are written under.
    pub output_root: PathBuf,
    pub page_filename: String,
    pub not_found_filename: String,
    /// Seed routes for `build`.
    pub routes: Vec<String>,
    /// Maximum renders in flight. Absent means unbounded.
    pub max_concurrent_renders: Option<usize>,
    /// HTML template with `$title`, `"$bootstrap"` and `<div id="root"></div>`.
    pub template: PathBuf,
    /// Directory holding `{route}/index.json` bootstrap documents.
    pub data_dir: PathBuf,
    /// Content of the not-found page. Absent means no page is written.
    pub not_found_message: Option<String>,
    /// Directory trees copied alongside rendering.
    pub copy: Vec<CopyEntry>,
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("html"),
            page_filename: "index.html".to_string(),
            not_found_filename: "404.html".to_string(),
            routes: vec!["/".to_string()],
            max_concurrent_renders: None,
            template: PathBuf::from("html/index.html"),
            data_dir: PathBuf::from("static/data"),
            not_found_message: Some("not found".to_string()),
            copy: vec![
                CopyEntry {
                    from: PathBuf::from("static/media"),
                    to: PathBuf::from("html/media"),
                    message: Some("collecting media files...".to_string()),
                    transform: None,
                },
                CopyEntry {
                    from: PathBuf::from("static/data"),
                    to: PathBuf::from("html/data"),
                    message: Some("collecting data files...".to_string()),
                    transform: Some(CopyTransform::MinifyJson),
                },
            ],
        }
    }
}

/// One `[[copy]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyEntry {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Progress line printed when the copy starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<CopyTransform>,
}

/// Per-file rewrite applied while copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyTransform {
    /// Re-serialize `.json` files without whitespace.
    MinifyJson,
}

impl CopyEntry {
    pub fn to_spec(&self) -> CopySpec {
        let mut spec = CopySpec::new(&self.from, &self.to);
        if let Some(message) = &self.message {
            spec = spec.with_message(message.clone());
        }
        match self.transform {
            Some(CopyTransform::MinifyJson) => spec.with_override(MinifyJson),
            None => spec,
        }
    }
}

impl PrerenderConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_renders == Some(0) {
            return Err(ConfigError::Validation(
                "max_concurrent_renders must be at least 1".into(),
            ));
        }
        for (key, name) in [
            ("page_filename", &self.page_filename),
            ("not_found_filename", &self.not_found_filename),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
            if name.contains(['/', '\\']) {
                return Err(ConfigError::Validation(format!(
                    "{key} must be a bare filename, got {name:?}"
                )));
            }
        }
        for route in &self.routes {
            Route::parse(route)
                .map_err(|e| ConfigError::Validation(format!("routes: {e}")))?;
        }
        for (i, entry) in self.copy.iter().enumerate() {
            if entry.from.as_os_str().is_empty() || entry.to.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "copy[{i}] needs both `from` and `to`"
                )));
            }
        }
        Ok(())
    }

    /// Move the output to `root`. Copy destinations under the old root move
    /// with it; destinations elsewhere are left alone.
    pub fn rebase_output_root(&mut self, root: PathBuf) {
        for entry in &mut self.copy {
            if let Ok(rest) = entry.to.strip_prefix(&self.output_root) {
                entry.to = root.join(rest);
            }
        }
        self.output_root = root;
    }

    pub fn concurrency(&self) -> Concurrency {
        Concurrency::from_limit(self.max_concurrent_renders.and_then(NonZeroUsize::new))
    }

    pub fn copy_specs(&self) -> Vec<CopySpec> {
        self.copy.iter().map(CopyEntry::to_spec).collect()
    }

    pub fn prerender_options(&self) -> PrerenderOptions {
        PrerenderOptions {
            output_root: self.output_root.clone(),
            concurrency: self.concurrency(),
            page_filename: self.page_filename.clone(),
            not_found_filename: self.not_found_filename.clone(),
            copy: self.copy_specs(),
        }
    }

    /// Load the configured template into a renderer.
    pub fn template_renderer(&self) -> Result<TemplateRenderer, RenderError> {
        Ok(TemplateRenderer::load(&self.template, &self.data_dir)?
            .with_not_found(self.not_found_message.clone()))
    }

    /// Check that every input the run reads from exists, without writing anything.
    ///
    /// Returns one message per problem found.
    pub fn check_inputs(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.template.is_file() {
            problems.push(format!("template not found: {}", self.template.display()));
        }
        if !self.data_dir.is_dir() {
            problems.push(format!(
                "data directory not found: {}",
                self.data_dir.display()
            ));
        }
        for entry in &self.copy {
            if !entry.from.is_dir() {
                problems.push(format!(
                    "copy source not found: {}",
                    entry.from.display()
                ));
            }
        }
        problems
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PrerenderConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay, arrays included, replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PrerenderConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PrerenderConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`.
///
/// A missing file yields the stock defaults. Otherwise user values are
/// merged on top of the defaults, unknown keys are rejected and the result
/// is validated.
pub fn load_config(path: &Path) -> Result<PrerenderConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Load `prerender.toml` from the given directory.
pub fn load_config_from(dir: &Path) -> Result<PrerenderConfig, ConfigError> {
    load_config(&dir.join(CONFIG_FILENAME))
}

/// Returns a fully-commented stock `prerender.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Prerender Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Root directory pages are written under.
output_root = "html"

# File written inside each route directory: /about -> html/about/index.html
page_filename = "index.html"

# Not-found page, written directly under output_root.
not_found_filename = "404.html"

# Seed routes. Pages may discover more routes while rendering.
routes = ["/"]

# Maximum number of renders in flight at once.
# Omit or comment out for unbounded concurrency.
# max_concurrent_renders = 4

# ---------------------------------------------------------------------------
# Template rendering
# ---------------------------------------------------------------------------
# HTML template. Placeholders:
#   $title                 -> bootstrap "title" (or "Page")
#   "$bootstrap"           -> the bootstrap document as JSON
#   <div id="root"></div>  -> rendered bootstrap "content"
template = "html/index.html"

# Bootstrap documents, read from {data_dir}/{route}/index.json.
# Every route listed in a document's "links" array is rendered too.
data_dir = "static/data"

# Content of the not-found page. Omit for no not-found page.
not_found_message = "not found"

# ---------------------------------------------------------------------------
# Copied trees
# ---------------------------------------------------------------------------
# Copied in parallel with rendering. A missing source fails the run.
# transform = "minify-json" rewrites .json files without whitespace.

[[copy]]
from = "static/media"
to = "html/media"
message = "collecting media files..."

[[copy]]
from = "static/data"
to = "html/data"
message = "collecting data files..."
transform = "minify-json"
"##
}
