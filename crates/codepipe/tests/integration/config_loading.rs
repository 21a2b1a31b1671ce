use codepipe::config::Config;
use codepipe::{ConfigError, Language};

use super::FIXTURES_PATH;

fn config_fixture(name: &str) -> String {
    format!("{FIXTURES_PATH}/configs/{name}")
}

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(config_fixture("valid_full.toml")).expect("Failed to load config");

    assert_eq!(config.listen, "0.0.0.0:4500");
    assert_eq!(config.channel_capacity, 32);
    assert!(config.languages.contains_key("javascript"));
    assert!(config.languages.contains_key("python"));

    let node = config.launch_config(Language::JavaScript).unwrap();
    assert_eq!(
        node.command_for("/w/code_x.js"),
        vec!["node", "--no-warnings", "/w/code_x.js"]
    );
    assert_eq!(config.languages["python"].env.len(), 1);
}

#[test]
fn test_load_minimal_config() {
    let config = Config::from_file(config_fixture("valid_minimal.toml")).expect("Failed to load config");

    assert!(config.languages.contains_key("python"));
    assert!(matches!(
        config.launch_config(Language::JavaScript),
        Err(ConfigError::LanguageNotFound(Language::JavaScript))
    ));
    assert_eq!(config.channel_capacity, 100);
}

#[test]
fn test_load_layers_fixture_over_defaults() {
    let path = config_fixture("valid_minimal.toml");
    let config = Config::load(Some(std::path::Path::new(&path))).expect("Failed to load config");

    // The fixture's python entry replaces the default one
    assert_eq!(config.languages["python"].name, "Python");
    assert!(config.languages.contains_key("javascript"));
}

#[test]
fn test_load_invalid_empty_name() {
    assert!(Config::from_file(config_fixture("invalid_empty_name.toml")).is_err());
}

#[test]
fn test_load_invalid_empty_extension() {
    assert!(Config::from_file(config_fixture("invalid_empty_extension.toml")).is_err());
}

#[test]
fn test_load_invalid_empty_command() {
    assert!(Config::from_file(config_fixture("invalid_empty_command.toml")).is_err());
}

#[test]
fn test_load_invalid_missing_placeholder() {
    assert!(Config::from_file(config_fixture("invalid_missing_placeholder.toml")).is_err());
}

#[test]
fn test_load_invalid_unknown_language() {
    match Config::from_file(config_fixture("invalid_unknown_language.toml")) {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("ruby")),
        other => panic!("expected Invalid error, got {other:?}"),
    }
}

#[test]
fn test_load_invalid_syntax() {
    assert!(matches!(
        Config::from_file(config_fixture("invalid_syntax.toml")),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_load_missing_file() {
    assert!(Config::from_file(config_fixture("does_not_exist.toml")).is_err());
}
