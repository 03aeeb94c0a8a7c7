use gwr_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

/// scenario_unused_keys_warn_or_fail
///
/// Validates:
/// 1) Unknown top-level sections are reported in WARN mode without error.
/// 2) They fail the load in FAIL mode.
/// 3) Entity sections are never flagged.
/// 4) Unused pointers come out sorted.

const YAML: &str = r#"
services:
  - name: billing
    host: billing.internal
workspaces:
  zeta: 1
  alpha: 2
"#;

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/workspaces/alpha".to_string(), "/workspaces/zeta".to_string()]
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn entity_sections_are_consumed() {
    let loaded = load_layered_yaml_from_strings(&[r#"
_format_version: "3.0"
services: [{name: a}]
routes: [{name: r, service: a}]
upstreams: [{name: u}]
targets: [{target: "10.0.0.1:80", upstream: u}]
consumers: [{username: alice}]
plugins: [{name: cors}]
"#])
    .unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
