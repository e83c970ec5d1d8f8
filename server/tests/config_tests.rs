//! Configuration loading: file parsing and environment overrides.

use serial_test::serial;

use server::config::GameConfig;

#[test]
fn defaults_are_sane() {
    let config = GameConfig::default();
    assert_eq!(config.http.port, 8080);
    assert_eq!(config.gateway.port, 8081);
    assert_eq!(config.auth.token_ttl_hours, 24);
    assert_eq!(config.ticks.walker_secs, 1);
    assert_eq!(config.ticks.territory_secs, 15);
    assert_eq!(config.ticks.flush_secs, 5);
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    std::env::remove_var("CONFIG_PATH");
    std::env::set_var("DATABASE_URL", "postgres://elsewhere:5432/game");
    std::env::set_var("REDIS_URL", "redis://elsewhere:6379/");
    std::env::set_var("SERVER_PORT", "9999");

    let config = GameConfig::load().expect("load must succeed");
    assert_eq!(config.database.url, "postgres://elsewhere:5432/game");
    assert_eq!(config.cache.url, "redis://elsewhere:6379/");
    assert_eq!(config.http.port, 9999);

    std::env::remove_var("DATABASE_URL");
    std::env::remove_var("REDIS_URL");
    std::env::remove_var("SERVER_PORT");
}

#[test]
#[serial]
fn bad_port_override_is_a_config_error() {
    std::env::remove_var("CONFIG_PATH");
    std::env::set_var("SERVER_PORT", "not-a-port");

    let result = GameConfig::load();
    assert!(result.is_err());

    std::env::remove_var("SERVER_PORT");
}

#[test]
#[serial]
fn missing_config_file_is_an_error() {
    std::env::set_var("CONFIG_PATH", "/definitely/not/here.toml");

    let result = GameConfig::load();
    assert!(result.is_err());

    std::env::remove_var("CONFIG_PATH");
}
