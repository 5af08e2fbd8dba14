use std::env;
use std::fs;
use std::path::PathBuf;

use serial_test::serial;
use uuid::Uuid;

use lumen::config::LumenConfig;
use lumen::tenants::parse_tenant_ids;
use lumen::NoticeKind;

const LUMEN_VARS: [&str; 6] = [
    "LUMEN_CAMPAIGN_ID",
    "LUMEN_DAYS_BEFORE_EXPIRATION",
    "LUMEN_MAX_CONCURRENT_SENDS",
    "LUMEN_DATABASE_URL",
    "LUMEN_LOG_JSON",
    "LUMEN_JOB_TENANTS",
];

fn clear_env() {
    for var in LUMEN_VARS {
        env::remove_var(var);
    }
}

fn write_config(contents: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("lumen-config-{}.toml", Uuid::new_v4()));
    fs::write(&path, contents).expect("failed to write temp config");
    path
}

#[test]
#[serial]
fn file_values_override_defaults() {
    clear_env();
    let path = write_config(
        r#"
        [reminders]
        campaign_id = "camp-file"
        days_before_expiration = 14
        max_concurrent_sends = 3

        [braze]
        api_key = "file-key"

        [jobs]
        tenants = "550e8400-e29b-41d4-a716-446655440000"
        "#,
    );

    let config = LumenConfig::load_from(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(config.reminders.campaign_id, "camp-file");
    assert_eq!(config.reminders.days_before_expiration, 14);
    assert_eq!(config.reminders.max_concurrent_sends, 3);
    assert_eq!(config.braze.api_key, "file-key");

    // Untouched keys keep their defaults
    assert_eq!(config.reminders.days_since_expiration, 7);
    assert_eq!(config.reminders.alias_label, "Enterprise");
    assert_eq!(config.database.db_type, "sqlite");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn env_overrides_file() {
    clear_env();
    let path = write_config(
        r#"
        [reminders]
        campaign_id = "camp-file"
        days_before_expiration = 14
        "#,
    );

    env::set_var("LUMEN_CAMPAIGN_ID", "camp-env");
    env::set_var("LUMEN_DAYS_BEFORE_EXPIRATION", "45");
    env::set_var("LUMEN_DATABASE_URL", "sqlite://override.db");
    env::set_var("LUMEN_LOG_JSON", "true");

    let config = LumenConfig::load_from(&path).unwrap();
    fs::remove_file(&path).ok();
    clear_env();

    assert_eq!(config.reminders.campaign_id, "camp-env");
    assert_eq!(config.reminders.days_before_expiration, 45);
    assert_eq!(config.database.sqlite_url, "sqlite://override.db");
    assert!(config.logging.json);
    assert_eq!(
        config.reminders.campaign_for(NoticeKind::ExpirationReminder).unwrap(),
        "camp-env"
    );
}

#[test]
#[serial]
fn unparsable_env_number_is_ignored() {
    clear_env();
    let path = write_config("[reminders]\nmax_concurrent_sends = 2\n");
    env::set_var("LUMEN_MAX_CONCURRENT_SENDS", "many");

    let config = LumenConfig::load_from(&path).unwrap();
    fs::remove_file(&path).ok();
    clear_env();

    assert_eq!(config.reminders.max_concurrent_sends, 2);
}

#[test]
#[serial]
fn missing_explicit_file_is_a_config_error() {
    clear_env();
    let path = env::temp_dir().join(format!("lumen-missing-{}.toml", Uuid::new_v4()));

    let err = LumenConfig::load_from(&path).unwrap_err();
    assert!(err.is_config());
}

#[test]
#[serial]
fn validate_rejects_zero_concurrency() {
    clear_env();
    let path = write_config("[reminders]\nmax_concurrent_sends = 0\n");

    let config = LumenConfig::load_from(&path).unwrap();
    fs::remove_file(&path).ok();

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("max_concurrent_sends"));
}

#[test]
#[serial]
fn job_tenants_come_from_env() {
    clear_env();
    let path = write_config("");
    env::set_var(
        "LUMEN_JOB_TENANTS",
        "550e8400-e29b-41d4-a716-446655440000 6ba7b810-9dad-11d1-80b4-00c04fd430c8",
    );

    let config = LumenConfig::load_from(&path).unwrap();
    fs::remove_file(&path).ok();
    clear_env();

    assert_eq!(parse_tenant_ids(&config.jobs.tenants).unwrap().len(), 2);
}
