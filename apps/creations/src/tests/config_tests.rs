use super::*;

use std::collections::HashMap;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn defaults_point_at_public_endpoint() {
    let settings = Settings::default();
    assert_eq!(settings.model, "gemini-2.5-flash");
    assert_eq!(settings.output_language, "English");
    assert!(settings.endpoint.ends_with("/v1beta"));
    assert!(settings.database_url.starts_with("sqlite://"));
    assert!(settings.api_key.is_none());
    assert!(settings.example_urls.is_empty());
}

#[test]
fn explicit_config_file_is_applied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("creations.toml");
    fs::write(
        &path,
        r#"
database_url = "./data/custom.db"
model = "gemini-2.0-flash"
output_language = "German"
example_urls = ["https://example.invalid/a.json", "https://example.invalid/b.json"]

[example_names]
"Piano" = "Klavier"
"#,
    )
    .expect("write config");

    let mut settings = Settings::default();
    let raw = fs::read_to_string(&path).expect("read");
    apply_file_settings(&mut settings, toml::from_str(&raw).expect("parse"));

    assert_eq!(settings.database_url, "./data/custom.db");
    assert_eq!(settings.model, "gemini-2.0-flash");
    assert_eq!(settings.output_language, "German");
    assert_eq!(settings.example_urls.len(), 2);
    assert_eq!(
        settings.example_names.get("Piano").map(String::as_str),
        Some("Klavier")
    );
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope.toml");
    assert!(load_settings(Some(&missing)).is_err());
}

#[test]
fn malformed_config_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    fs::write(&path, "model = [").expect("write");
    assert!(load_settings(Some(&path)).is_err());
}

#[test]
fn environment_overrides_file_values() {
    let mut settings = Settings {
        model: "from-file".into(),
        ..Settings::default()
    };
    apply_env_overrides(
        &mut settings,
        env_from(&[
            ("GEMINI_API_KEY", "  AIza-env  "),
            ("APP__MODEL", "from-env"),
            ("APP__OUTPUT_LANGUAGE", "Spanish"),
            ("APP__DATABASE_URL", "sqlite::memory:"),
            ("APP__EXAMPLE_URLS", "http://a/1.json, ,http://a/2.json"),
        ]),
    );

    assert_eq!(settings.api_key.as_deref(), Some("AIza-env"));
    assert_eq!(settings.model, "from-env");
    assert_eq!(settings.output_language, "Spanish");
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(
        settings.example_urls,
        vec!["http://a/1.json".to_string(), "http://a/2.json".to_string()]
    );
}

#[test]
fn blank_api_key_counts_as_absent() {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings, env_from(&[("GEMINI_API_KEY", "   ")]));
    assert!(settings.api_key.is_none());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite:./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn blank_database_url_falls_back_to_default() {
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
}

#[test]
fn normalizing_does_not_touch_the_filesystem() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("studio.sqlite3");

    let url = normalize_database_url(db_path.to_string_lossy().as_ref());
    assert!(url.starts_with("sqlite://"));
    assert!(url.ends_with("nested/studio.sqlite3"));
    assert!(!dir.path().join("nested").exists());
}
