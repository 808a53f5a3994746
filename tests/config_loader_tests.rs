use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};

use storecomms::config::{ConfigError, ConfigLoader};
use tempfile::TempDir;

const VARS: &[&str] = &[
    "STORECOMMS_PROFILE",
    "STORECOMMS_API_BIND_ADDR",
    "STORECOMMS_LOG_LEVEL",
    "STORECOMMS_PLATFORM_BASE_URL",
    "STORECOMMS_PLATFORM_TOKEN",
    "STORECOMMS_SPACE_ID",
    "STORECOMMS_FIXED_OPS_IDS",
    "STORECOMMS_OPS_GROUP_ID",
    "STORECOMMS_DIRECTORY_TTL_SECONDS",
    "STORECOMMS_GATE_MAX_ATTEMPTS",
    "STORECOMMS_DISTRIBUTION_BATCH_SIZE",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for var in VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let cfg = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .expect("local profile loads without platform settings");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:3000");
    assert_eq!(cfg.platform.hidden_attribute_key, "storeid");
    assert_eq!(cfg.directory.ttl_seconds, 900);
    assert_eq!(cfg.distribution.batch_size, 5);
    cfg.bind_addr().expect("default bind addr parses");
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "STORECOMMS_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "STORECOMMS_API_BIND_ADDR=192.168.0.10:5000\nSTORECOMMS_DIRECTORY_TTL_SECONDS=60\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "STORECOMMS_API_BIND_ADDR=10.0.0.5:6000\n",
    );
    // Profile is selected in .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "STORECOMMS_PROFILE=test\nSTORECOMMS_API_BIND_ADDR=127.0.0.1:4000\n",
    );

    let cfg = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .expect("config loads with layered env");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.directory.ttl_seconds, 60);
}

#[test]
fn process_env_overrides_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "STORECOMMS_SPACE_ID=space-from-file\nSTORECOMMS_FIXED_OPS_IDS=a, b ,,c\n",
    );
    unsafe {
        env::set_var("STORECOMMS_SPACE_ID", "space-from-env");
    }

    let cfg = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(cfg.platform.space_id, "space-from-env");
    assert_eq!(cfg.platform.fixed_ops_ids, vec!["a", "b", "c"]);
    clear_env();
}

#[test]
fn non_local_profile_requires_platform_settings() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "STORECOMMS_PROFILE=prod\nSTORECOMMS_PLATFORM_BASE_URL=https://app.example.com/api/\n",
    );

    let err = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingPlatformToken));

    write_env_file(
        &temp_dir,
        ".env.prod",
        "STORECOMMS_PLATFORM_TOKEN=secret\nSTORECOMMS_SPACE_ID=space-9\n",
    );
    let cfg = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .expect("prod config complete");
    assert_eq!(cfg.platform.base_url, "https://app.example.com/api");
    assert_eq!(
        cfg.platform.studio_base().as_deref(),
        Some("https://app.example.com")
    );

    let redacted = cfg.redacted_json().unwrap();
    assert!(!redacted.contains("secret"));
    assert!(redacted.contains("[REDACTED]"));
}

#[test]
fn invalid_numbers_and_ranges_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("STORECOMMS_DIRECTORY_TTL_SECONDS", "soon");
    }
    let err = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    clear_env();

    unsafe {
        env::set_var("STORECOMMS_DISTRIBUTION_BATCH_SIZE", "0");
    }
    let err = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBatchSize { value: 0 }));
    clear_env();
}
