use std::{env, fs};

use duplex_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("duplex.toml");

    let toml_content = r#"
[sync]
database = "prod"
kind = "SecurityGroup"
channel_capacity = 32
handler_timeout_ms = 5000
max_in_flight = 8
serialize_per_record = false

[logging]
level = "debug"

[[clusters]]
name = "east"
endpoint = "https://east.example:6443"
region = "us-east-1"

[[clusters]]
name = "west"
endpoint = "https://west.example:6443"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses, unset fields fall back to defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.sync.database, "prod");
    assert_eq!(cfg.sync.channel_capacity, 32);
    assert_eq!(cfg.sync.max_in_flight, 8);
    assert!(!cfg.sync.serialize_per_record);
    assert!(cfg.sync.resync_on_start);
    assert_eq!(cfg.sync.retry_delay_ms, 5_000);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.clusters.len(), 2);
    assert_eq!(cfg.clusters[0].region, "us-east-1");
    assert_eq!(cfg.clusters[1].region, "");

    let options = cfg.sync.to_options();
    assert_eq!(options.handler_timeout, std::time::Duration::from_secs(5));
    assert!(!options.serialize_per_record);

    // 2) Env override should win over file
    unsafe {
        env::set_var("DUPLEX__SYNC__MAX_IN_FLIGHT", "3");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.sync.max_in_flight, 3);
    unsafe {
        env::remove_var("DUPLEX__SYNC__MAX_IN_FLIGHT");
    }

    // 3) Duplicate cluster names are rejected
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[[clusters]]
name = "east"

[[clusters]]
name = "east"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("duplicate cluster name"));

    // 4) Unknown log level is rejected
    let bad_level = dir.path().join("bad_level.toml");
    fs::write(&bad_level, "[logging]\nlevel = \"loud\"\n").expect("write toml");
    let err = load_config(bad_level.to_str()).expect_err("expected validation error");
    assert!(err.contains("logging.level"));
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults should validate");
    assert_eq!(cfg.sync.database, "duplex");
    assert_eq!(cfg.sync.kind, "SecurityGroup");
    assert!(cfg.clusters.is_empty());
}
