//! Supervisor integration tests: real child processes, launched through the
//! host and priced through the engine.

#![cfg(unix)]

use chrono::{Duration as ChronoDuration, Utc};
use cloudcost_core::adapter::TimeRange;
use cloudcost_core::engine::{Confidence, CostEngine, ErrorKind, SpecLookup, SpecPrice};
use cloudcost_core::plugin::protocol::WireResource;
use cloudcost_core::plugin::{CompatState, PluginHost};
use cloudcost_core::resource::ResourceDescriptor;
use cloudcost_core::Config;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FLATRATE: &str = env!("CARGO_BIN_EXE_cloudcost-plugin-flatrate");

fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.plugins.bind_timeout = Duration::from_millis(400);
    config.plugins.bind_poll_interval = Duration::from_millis(20);
    config.plugins.shutdown_timeout = Duration::from_secs(2);
    config
        .plugins
        .bind_timeout_overrides
        .insert("flatrate".into(), Duration::from_secs(10));
    config
}

fn ec2(id: &str) -> ResourceDescriptor {
    ResourceDescriptor::new("aws:ec2/instance:Instance", id, "aws")
        .with_property("instanceType", "t3.micro")
        .with_property("region", "us-east-1")
}

/// Local pricing spec with one rate for everything.
struct FlatSpec(f64);

impl SpecLookup for FlatSpec {
    fn lookup(&self, _resource: &WireResource) -> Option<SpecPrice> {
        Some(SpecPrice {
            monthly_cost: self.0,
            currency: "USD".into(),
            notes: "local spec".into(),
        })
    }
}

#[tokio::test]
async fn test_never_binding_plugin_is_one_launch_failure() {
    let dir = TempDir::new().unwrap();
    let sleepy = script(&dir, "cloudcost-plugin-sleepy", "sleep 30");
    let config = fast_config();
    let cancel = CancellationToken::new();

    let report = PluginHost::launch_all(&[sleepy], &config, &cancel).await;
    assert!(report.registry.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].plugin, "sleepy");
    assert!(report.failures[0].error.to_string().contains("out of date"));

    let engine = CostEngine::from_launch(&report, &config, cancel.clone());
    let batch = engine.projected_cost(&[ec2("web"), ec2("api")]).await.unwrap();
    assert_eq!(batch.results.len(), 2);
    assert!(batch.results.iter().all(|r| r.notes.starts_with("NO DATA: ")));
    assert_eq!(batch.errors.len(), 1);
    assert_eq!(batch.errors[0].kind, ErrorKind::Launch);

    report.host.shutdown_all().await;
}

#[tokio::test]
async fn test_failed_plugin_falls_through_to_estimator() {
    let dir = TempDir::new().unwrap();
    let sleepy = script(&dir, "cloudcost-plugin-sleepy", "sleep 30");
    let config = fast_config();
    let cancel = CancellationToken::new();
    let report = PluginHost::launch_all(&[sleepy], &config, &cancel).await;

    let now = Utc::now();
    let resource =
        ec2("web").with_property("created", (now - ChronoDuration::hours(24)).to_rfc3339());
    let batch = CostEngine::from_launch(&report, &config, cancel.clone())
        .with_spec_lookup(Arc::new(FlatSpec(73.0)))
        .with_clock(Arc::new(move || now))
        .actual_cost(&[resource], TimeRange::between(now - ChronoDuration::days(1), now))
        .await
        .unwrap();

    assert_eq!(batch.results[0].confidence, Some(Confidence::Medium));
    assert!((batch.results[0].total_cost - 2.4).abs() < 1e-9);
    assert_eq!(batch.errors.len(), 1);
    report.host.shutdown_all().await;
}

#[tokio::test]
async fn test_missing_executable_does_not_stop_others() {
    let config = fast_config();
    let cancel = CancellationToken::new();
    let paths = vec![
        PathBuf::from("/nonexistent/cloudcost-plugin-ghost"),
        PathBuf::from(FLATRATE),
    ];

    let report = PluginHost::launch_all(&paths, &config, &cancel).await;
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.to_string().contains("not found"));
    assert_eq!(report.registry.names(), vec!["flatrate"]);

    let batch = CostEngine::from_launch(&report, &config, cancel.clone())
        .projected_cost(&[ec2("web")])
        .await
        .unwrap();
    assert_eq!(batch.results[0].source, "flatrate");
    assert_eq!(batch.results[0].monthly_cost, 10.0);
    assert_eq!(batch.errors.len(), 1);

    report.host.shutdown_all().await;
}

#[tokio::test]
async fn test_reference_plugin_negotiates_and_shuts_down() {
    let config = fast_config();
    let cancel = CancellationToken::new();
    let report = PluginHost::launch_all(&[PathBuf::from(FLATRATE)], &config, &cancel).await;
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    let compat = report.host.compatibility();
    assert_eq!(compat.len(), 1);
    assert_eq!(compat[0].0, "flatrate");
    assert_eq!(compat[0].1.state, CompatState::Compatible);

    let reports = CostEngine::from_launch(&report, &config, cancel.clone())
        .dry_run("aws:ec2/instance:Instance")
        .await
        .unwrap();
    assert_eq!(reports[0].fields[0].field_name, "cost_per_month");

    report.host.shutdown_all().await;
    // Safe to repeat.
    report.host.shutdown_all().await;
}
