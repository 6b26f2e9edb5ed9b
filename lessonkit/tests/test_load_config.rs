use lessonkit::load_config::{load_settings, Credentials};
use lessonkit_core::config::{ProviderKind, Settings, MIB};
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A partial file overrides only what it names; everything else keeps its default.
#[test]
fn partial_config_merges_with_defaults() {
    let config_yaml = r#"
storage:
  output_dir: ./tmp/exports
limits:
  max_file_size: 1048576
ai:
  providers: [anthropic]
  attempt_timeout_secs: 60
  anthropic:
    model: claude-test
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let settings = load_settings(Some(config_file.path())).expect("Config should load");

    assert_eq!(settings.storage.output_dir, PathBuf::from("./tmp/exports"));
    assert_eq!(settings.storage.upload_dir, PathBuf::from("uploads"));
    assert_eq!(settings.limits.max_file_size, MIB);
    assert_eq!(settings.limits.pages_per_part, 50);
    assert_eq!(settings.ai.providers, vec![ProviderKind::Anthropic]);
    assert_eq!(settings.ai.attempt_timeout_secs, Some(60));
    assert_eq!(settings.ai.retries, 0);
    assert_eq!(settings.ai.anthropic.model, "claude-test");
    assert_eq!(settings.ai.anthropic.max_tokens, 2000);
}

#[test]
fn no_path_and_empty_file_give_defaults() {
    assert_eq!(load_settings(None).unwrap(), Settings::default());

    let empty = NamedTempFile::new().expect("temp file");
    assert_eq!(load_settings(Some(empty.path())).unwrap(), Settings::default());
}

#[test]
fn missing_file_names_the_failing_step() {
    let err = load_settings(Some(std::path::Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn malformed_yaml_and_bad_values_are_rejected() {
    let config_file = NamedTempFile::new().expect("temp file");

    write(config_file.path(), "limits: [not, a, map]").unwrap();
    let err = load_settings(Some(config_file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));

    write(config_file.path(), "ai:\n  providers: [cohere]\n").unwrap();
    assert!(load_settings(Some(config_file.path())).is_err());

    write(config_file.path(), "limits:\n  pages_per_part: 0\n").unwrap();
    let err = load_settings(Some(config_file.path())).unwrap_err();
    assert!(err.to_string().contains("pages_per_part"));
}

#[test]
#[serial]
fn credentials_come_from_environment_and_ignore_blank_values() {
    env::set_var("OPENAI_API_KEY", "sk-test");
    env::set_var("ANTHROPIC_API_KEY", "   ");

    let credentials = Credentials::from_env();

    assert_eq!(credentials.key(ProviderKind::OpenAi), Some("sk-test"));
    assert_eq!(credentials.key(ProviderKind::Anthropic), None);
    assert!(!format!("{credentials:?}").contains("sk-test"));

    env::remove_var("OPENAI_API_KEY");
    env::remove_var("ANTHROPIC_API_KEY");
}
