// tests/error_handling.rs

use std::io::Write;

use confdep::config::{ConfigFile, load_and_validate, load_or_default};
use confdep::errors::ConfdepError;
use confdep::types::HandoffMode;
use tempfile::NamedTempFile;

#[test]
fn test_unknown_key_is_a_toml_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[paths]
manifest_dir = "/tmp/deps"
manifest_directory = "/tmp/typo"
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(ConfdepError::TomlError(e)) => {
            assert!(e.to_string().contains("manifest_directory"), "{e}");
        }
        Err(e) => panic!("Expected TomlError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_platform_path_returns_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[manifest]
platform = "../etc/passwd"
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(ConfdepError::ConfigError(msg)) => {
            assert!(msg.contains("platform"));
            assert!(msg.contains("../etc/passwd"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_invalid_handoff_mode_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[session]
handoff = "remote"
"#
    )
    .unwrap();

    assert!(matches!(
        load_and_validate(file.path()),
        Err(ConfdepError::TomlError(_))
    ));
}

#[test]
fn test_full_config_round_trips_into_validated_form() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[paths]
manifest_dir = "/opt/deps"
subsystem_dir = "/opt/conf_mode"

[manifest]
platform = "router"

[session]
handoff = "daemon"
"#
    )
    .unwrap();

    let cfg: ConfigFile = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.paths.manifest_dir.to_str(), Some("/opt/deps"));
    assert_eq!(cfg.paths.subsystem_dir.to_str(), Some("/opt/conf_mode"));
    assert_eq!(cfg.manifest.platform, "router");
    assert_eq!(cfg.session.handoff, HandoffMode::Daemon);
    assert!(cfg.hands_off());
}

#[test]
fn test_missing_default_file_falls_back_but_explicit_file_does_not() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("Confdep.toml");

    let cfg = load_or_default(&missing).unwrap();
    assert_eq!(cfg.manifest.platform, "vyos-1x");
    assert!(!cfg.hands_off());

    assert!(matches!(
        load_and_validate(&missing),
        Err(ConfdepError::IoError(_))
    ));
}
