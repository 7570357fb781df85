use std::time::Duration;
use std::{env, fs};

use puzzlequota_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("puzzlequota.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 1024

[logging]
level = "debug"

[identity]
issuer = "https://tenant.logto.app"
client_id = "m2m"
client_secret = "s3cret"
principal_cache_ttl = "15m"

[quota]
ttl = "7days"

[reconcile]
max_retries = 5
initial_backoff = "250ms"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.identity.issuer, "https://tenant.logto.app");
    assert_eq!(cfg.identity.principal_cache_ttl, Duration::from_secs(900));
    assert_eq!(cfg.identity.scope, "all");
    assert_eq!(cfg.quota.ttl, Duration::from_secs(7 * 24 * 3600));
    assert_eq!(cfg.quota.default_count, 1);
    assert_eq!(cfg.reconcile.max_retries, 5);
    assert_eq!(cfg.reconcile.initial_backoff, Duration::from_millis(250));

    // 2) Env override should win over file
    unsafe {
        env::set_var("PUZZLEQUOTA__SERVER__PORT", "9091");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9091);
    // cleanup env var
    unsafe {
        env::remove_var("PUZZLEQUOTA__SERVER__PORT");
    }

    // 3) Validation errors are surfaced
    let bad_path = dir.path().join("bad.toml");
    fs::write(
        &bad_path,
        r#"
[identity]
issuer = "https://tenant.logto.app"
client_id = "m2m"
"#,
    )
    .expect("write bad toml");
    let err = load_config(bad_path.to_str()).unwrap_err();
    assert!(err.contains("client_secret"), "{err}");
}
