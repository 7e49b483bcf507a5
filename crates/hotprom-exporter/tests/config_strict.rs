#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::path::PathBuf;

use hotprom_exporter::config::{self, OnRemove, RefreshPolicy};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
plugins:
  dir: "./metrics"
  timeout: 100 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.server.port, 3000);
    assert_eq!(cfg.plugins.dir, PathBuf::from("./metrics"));
    assert_eq!(cfg.plugins.extension, "rhai");
    assert_eq!(cfg.plugins.on_remove, OnRemove::Retain);
    assert_eq!(cfg.refresh.policy, RefreshPolicy::Interval);
    assert_eq!(cfg.refresh.interval_ms, 10000);
}

#[test]
fn full_config() {
    let cfg = config::load_from_str(
        r#"
version: 1
server:
  listen: "127.0.0.1"
  port: 9100
  default_metrics: false
plugins:
  dir: "/etc/hotprom/plugins"
  extension: "rhai"
  timeout_ms: 2000
  on_remove: deregister
refresh:
  policy: on_request
"#,
    )
    .expect("must parse");
    assert_eq!(cfg.listen_addr().unwrap().to_string(), "127.0.0.1:9100");
    assert!(!cfg.server.default_metrics);
    assert_eq!(cfg.plugins.on_remove, OnRemove::Deregister);
    assert_eq!(cfg.refresh.policy, RefreshPolicy::OnRequest);
}

#[test]
fn wrong_version_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn out_of_range_values_rejected() {
    for bad in [
        "version: 1\nrefresh: { interval_ms: 5 }\n",
        "version: 1\nplugins: { timeout_ms: 0 }\n",
        "version: 1\nplugins: { extension: \".rhai\" }\n",
        "version: 1\nplugins: { extension: \"prom.rhai\" }\n",
        "version: 1\nserver: { listen: \"localhost\" }\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.kind().as_str(), "CONFIG", "{bad}");
    }
}

#[test]
fn port_override() {
    let mut cfg = config::load_from_str("version: 1\n").unwrap();
    cfg.apply_port_override("8081").unwrap();
    assert_eq!(cfg.server.port, 8081);
    assert!(cfg.apply_port_override("http").is_err());
}
