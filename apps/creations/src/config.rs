use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "creations.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub output_language: String,
    pub example_urls: Vec<String>,
    /// Display names for bundled examples, keyed by their shipped name.
    pub example_names: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            api_key: None,
            model: "gemini-2.5-flash".into(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            output_language: "English".into(),
            example_urls: Vec::new(),
            example_names: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    database_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    output_language: Option<String>,
    example_urls: Option<Vec<String>>,
    #[serde(default)]
    example_names: HashMap<String, String>,
}

fn default_database_url() -> String {
    match dirs::data_local_dir() {
        Some(dir) => {
            let path = dir.join("creation_studio").join("studio.sqlite3");
            format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
        }
        None => "sqlite://./data/studio.sqlite3".into(),
    }
}

/// Reads `creations.toml` (or the explicit `path`) and then applies
/// environment overrides. A missing default file is not an error; a missing
/// explicit file is.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let file_cfg = toml::from_str::<FileSettings>(&raw)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
            apply_file_settings(&mut settings, file_cfg);
        }
        Err(err) if required => {
            bail!("failed to read config '{}': {err}", path.display());
        }
        Err(_) => {}
    }

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.api_key {
        settings.api_key = Some(v);
    }
    if let Some(v) = file_cfg.model {
        settings.model = v;
    }
    if let Some(v) = file_cfg.endpoint {
        settings.endpoint = v;
    }
    if let Some(v) = file_cfg.output_language {
        settings.output_language = v;
    }
    if let Some(v) = file_cfg.example_urls {
        settings.example_urls = v;
    }
    settings.example_names.extend(file_cfg.example_names);
}

fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("GEMINI_API_KEY") {
        settings.api_key = Some(v);
    }
    if let Some(v) = var("APP__API_KEY") {
        settings.api_key = Some(v);
    }
    settings.api_key = settings
        .api_key
        .take()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("APP__MODEL") {
        settings.model = v;
    }
    if let Some(v) = var("APP__ENDPOINT") {
        settings.endpoint = v;
    }
    if let Some(v) = var("APP__OUTPUT_LANGUAGE") {
        settings.output_language = v;
    }

    if let Some(v) = var("APP__EXAMPLE_URLS") {
        settings.example_urls = v
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
    }
}

/// Turns a plain path or `sqlite:` path into a `sqlite://` URL. The store
/// creates any missing parent directory when it opens the database.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return default_database_url();
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
