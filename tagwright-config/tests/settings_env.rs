use std::fs;

use parking_lot::Mutex;
use tagwright_config::settings::{
    CONFIG_JSON_VAR, CONFIG_PATH_VAR, POOL_THREADS_VAR, REFRESH_DELAY_VAR, SEARCH_DELAY_VAR,
    SINGLE_THREADED_VAR,
};
use tagwright_config::{Settings, SettingsSource};
use tempfile::tempdir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        CONFIG_PATH_VAR,
        CONFIG_JSON_VAR,
        POOL_THREADS_VAR,
        SINGLE_THREADED_VAR,
        SEARCH_DELAY_VAR,
        REFRESH_DELAY_VAR,
    ] {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn config_path_wins_over_inline_json() {
    let _guard = ENV_LOCK.lock();
    clear_env();

    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("tagwright.toml");
    fs::write(&path, "[scheduler]\npool_threads = 3\n").expect("write config");

    unsafe {
        std::env::set_var(CONFIG_PATH_VAR, &path);
        std::env::set_var(CONFIG_JSON_VAR, r#"{"scheduler": {"pool_threads": 9}}"#);
    }

    let (settings, source) = Settings::load_from_env().expect("load settings");
    assert_eq!(settings.scheduler.pool_threads, 3);
    assert_eq!(source, SettingsSource::EnvPath(path));

    clear_env();
}

#[test]
fn inline_json_is_used_without_a_path() {
    let _guard = ENV_LOCK.lock();
    clear_env();

    unsafe {
        std::env::set_var(
            CONFIG_JSON_VAR,
            r#"{"search": {"delay_ms": 120}, "scheduler": {"retire_policy": "after_teardown"}}"#,
        );
    }

    let (settings, source) = Settings::load_from_env().expect("load settings");
    assert_eq!(source, SettingsSource::EnvInline);
    assert_eq!(settings.search.delay_ms, 120);

    clear_env();
}

#[test]
fn broken_file_is_an_error() {
    let _guard = ENV_LOCK.lock();
    clear_env();

    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("tagwright.json");
    fs::write(&path, "{ not json").expect("write config");
    unsafe { std::env::set_var(CONFIG_PATH_VAR, &path) };

    let err = Settings::load_from_env().unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains(CONFIG_PATH_VAR));
    assert!(message.contains("invalid tagwright settings"));

    clear_env();
}

#[test]
fn env_overrides_apply_and_report_bad_values() {
    let _guard = ENV_LOCK.lock();
    clear_env();

    unsafe {
        std::env::set_var(POOL_THREADS_VAR, "4");
        std::env::set_var(SINGLE_THREADED_VAR, "yes");
        std::env::set_var(SEARCH_DELAY_VAR, "300ms");
        std::env::set_var(REFRESH_DELAY_VAR, "soon");
    }

    let mut settings = Settings::default();
    let warnings = settings.apply_env_overrides();

    assert_eq!(settings.scheduler.pool_threads, 4);
    assert!(settings.scheduler.single_threaded);
    assert_eq!(settings.search.delay_ms, 300);
    assert_eq!(settings.tree_refresh.delay_ms, 250);
    assert_eq!(warnings.len(), 1);
    assert!(warnings.items[0].message.contains(REFRESH_DELAY_VAR));

    clear_env();
}

#[test]
fn load_validates_after_overrides() {
    let _guard = ENV_LOCK.lock();
    clear_env();

    unsafe {
        std::env::set_var(
            CONFIG_JSON_VAR,
            r#"{"scheduler": {"exit_poll_interval_ms": 0}}"#,
        );
        std::env::set_var(POOL_THREADS_VAR, "500");
    }

    let load = Settings::load().expect("load settings");
    assert_eq!(load.source, SettingsSource::EnvInline);
    assert_eq!(load.settings.scheduler.exit_poll_interval_ms, 1);
    assert_eq!(load.settings.scheduler.pool_threads, 64);
    assert_eq!(load.warnings.len(), 2);

    clear_env();
}
