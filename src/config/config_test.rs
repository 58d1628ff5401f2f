use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Plan;

fn cleanup_all_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("TIDEMARK__") {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let settings = Settings::default();

    assert_eq!(settings.feed.channel_capacity, 256);
    assert_eq!(settings.cache.capacity, 10_000);
    assert_eq!(settings.billing.signature_tolerance_secs, 300);
    assert_eq!(settings.billing.default_paid_plan, Plan::Pro);
    assert_eq!(settings.billing.store, BillingStoreKind::Memory);
    assert_eq!(settings.server.listen_port, 8080);
    assert_eq!(settings.retry.feed_connect.max_retries, 0);
    assert!(!settings.monitoring.prometheus_enabled);
}

#[test]
#[serial]
fn load_should_merge_environment_overrides() {
    cleanup_all_env_vars();
    with_vars(
        vec![
            ("TIDEMARK__SERVER__LISTEN_PORT", Some("9595")),
            ("TIDEMARK__BILLING__WEBHOOK_SECRET", Some("whsec_env")),
        ],
        || {
            let settings = Settings::load(None).unwrap();

            assert_eq!(settings.server.listen_port, 9595);
            assert_eq!(settings.billing.webhook_secret, "whsec_env");
        },
    );
}

#[test]
#[serial]
fn explicit_config_file_should_override_defaults() {
    cleanup_all_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("deploy.toml");

    std::fs::write(
        &config_path,
        r#"
        [billing]
        webhook_secret = "whsec_file"
        signature_tolerance_secs = 600

        [billing.price_plans]
        price_pro_monthly = "pro"
        price_biz_monthly = "business"

        [billing.customer_workspaces]
        cus_100 = "ws_garnet"

        [retry.feed_connect]
        max_retries = 7
        base_delay_ms = 50
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let settings = Settings::load(config_path.to_str()).unwrap();

        assert_eq!(settings.billing.webhook_secret, "whsec_file");
        assert_eq!(settings.billing.signature_tolerance_secs, 600);
        assert_eq!(
            settings.billing.price_plans.get("price_pro_monthly"),
            Some(&Plan::Pro)
        );
        assert_eq!(
            settings.billing.price_plans.get("price_biz_monthly"),
            Some(&Plan::Business)
        );
        assert_eq!(
            settings.billing.customer_workspaces.get("cus_100").map(String::as_str),
            Some("ws_garnet")
        );
        assert_eq!(settings.retry.feed_connect.max_retries, 7);
        assert_eq!(settings.retry.feed_connect.base_delay_ms, 50);
        // untouched sections keep their defaults
        assert_eq!(settings.server.listen_port, 8080);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("deploy.toml");
    std::fs::write(
        &config_path,
        r#"
        [server]
        listen_port = 7070
        "#,
    )
    .unwrap();

    with_vars(
        vec![("TIDEMARK__SERVER__LISTEN_PORT", Some("7171"))],
        || {
            let settings = Settings::load(config_path.to_str()).unwrap();

            assert_eq!(settings.server.listen_port, 7171);
        },
    );
}

#[test]
fn validation_should_reject_free_default_paid_plan() {
    let mut settings = Settings::default();
    settings.billing.default_paid_plan = Plan::Free;

    assert!(settings.validate().is_err());
}

#[test]
fn validation_should_reject_zero_listen_port() {
    let mut settings = Settings::default();
    settings.server.listen_port = 0;

    assert!(settings.validate().is_err());
}

#[test]
fn validation_should_reject_privileged_prometheus_port() {
    let mut settings = Settings::default();
    settings.monitoring.prometheus_enabled = true;
    settings.monitoring.prometheus_port = 80;

    assert!(settings.validate().is_err());
}

#[test]
#[serial]
fn sled_store_kind_should_deserialize_with_path() {
    cleanup_all_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("deploy.toml");
    std::fs::write(
        &config_path,
        r#"
        [billing]
        store = "sled"
        store_path = "/var/lib/tidemark/billing"
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let settings = Settings::load(config_path.to_str()).unwrap();

        assert_eq!(settings.billing.store, BillingStoreKind::Sled);
        assert_eq!(
            settings.billing.store_path.as_os_str().to_str(),
            Some("/var/lib/tidemark/billing")
        );
    });
}
