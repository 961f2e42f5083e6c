use crate::sqlite::SqliteStore;
use crate::{Store, StorageError};
use tempfile::TempDir;
use vigil_common::id::{new_id, now_millis};
use vigil_common::types::{
    Agent, AgentStatus, AlertConfig, AlertKind, AlertLevel, AlertRecord, AlertRules, AlertStatus,
    Metric, MonitorKind, MonitorStats, MonitorTask, ProbeStatus, ThresholdRule, Visibility,
};

fn setup() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path()).unwrap();
    (dir, store)
}

fn make_agent(id: &str, name: &str) -> Agent {
    let now = now_millis();
    Agent {
        id: id.to_string(),
        name: name.to_string(),
        hostname: format!("{name}.internal"),
        os: "linux".into(),
        arch: "x86_64".into(),
        version: "0.4.0".into(),
        status: AgentStatus::Online,
        last_seen_at: now,
        created_at: now,
        updated_at: now,
        ..Agent::default()
    }
}

fn make_monitor(name: &str) -> MonitorTask {
    let now = now_millis();
    MonitorTask {
        id: new_id(),
        name: name.to_string(),
        kind: MonitorKind::Https,
        target: "https://example.com/health".into(),
        description: String::new(),
        enabled: true,
        interval_secs: 60,
        agent_ids: vec![],
        http: None,
        tcp: None,
        visibility: Visibility::Public,
        created_at: now,
        updated_at: now,
    }
}

fn make_probe_metric(agent: &str, monitor: &str, status: ProbeStatus, ts: i64) -> Metric {
    Metric {
        id: new_id(),
        agent_id: agent.to_string(),
        timestamp: ts,
        monitor_name: monitor.to_string(),
        monitor_kind: Some(MonitorKind::Https),
        target: "https://example.com/health".into(),
        status: Some(status),
        response_time_ms: 120,
        ..Metric::default()
    }
}

#[test]
fn register_agent_preserves_operator_fields_on_reconnect() {
    let (_dir, store) = setup();

    let mut agent = make_agent("a1", "web-01");
    store.register_agent(&agent).unwrap();

    // Operator assigns a quota and flips visibility.
    agent.traffic_limit = 1_000_000;
    agent.traffic_reset_day = 1;
    agent.visibility = Visibility::Private;
    store.update_agent(&agent).unwrap();

    // Reconnect handshake carries a newer version but no quota knowledge.
    let reconnect = Agent {
        version: "0.5.0".into(),
        ..make_agent("a1", "web-01")
    };
    store.register_agent(&reconnect).unwrap();

    let loaded = store.get_agent("a1").unwrap();
    assert_eq!(loaded.version, "0.5.0");
    assert_eq!(loaded.traffic_limit, 1_000_000);
    assert_eq!(loaded.traffic_reset_day, 1);
    assert_eq!(loaded.visibility, Visibility::Private);
}

#[test]
fn get_missing_agent_is_not_found() {
    let (_dir, store) = setup();
    match store.get_agent("ghost") {
        Err(StorageError::NotFound { entity, .. }) => assert_eq!(entity, "agent"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn list_agents_filters_by_visibility() {
    let (_dir, store) = setup();

    let public = make_agent("a1", "public-01");
    let mut private = make_agent("a2", "private-01");
    private.visibility = Visibility::Private;
    store.register_agent(&public).unwrap();
    store.register_agent(&private).unwrap();
    store.update_agent(&private).unwrap();

    let all = store.list_agents(None).unwrap();
    assert_eq!(all.len(), 2);

    let visible = store.list_agents(Some(Visibility::Public)).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, "a1");
}

#[test]
fn mark_all_agents_offline_clears_status() {
    let (_dir, store) = setup();
    store.register_agent(&make_agent("a1", "web-01")).unwrap();
    store.register_agent(&make_agent("a2", "web-02")).unwrap();

    store.mark_all_agents_offline().unwrap();

    for agent in store.list_agents(None).unwrap() {
        assert_eq!(agent.status, AgentStatus::Offline);
    }
}

#[test]
fn duplicate_monitor_name_is_conflict() {
    let (_dir, store) = setup();
    store.create_monitor(&make_monitor("api-health")).unwrap();

    match store.create_monitor(&make_monitor("api-health")) {
        Err(StorageError::Conflict { entity, name }) => {
            assert_eq!(entity, "monitor_task");
            assert_eq!(name, "api-health");
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[test]
fn monitor_roundtrip_keeps_probe_config() {
    let (_dir, store) = setup();
    let mut task = make_monitor("api-health");
    task.http = Some(vigil_common::types::HttpProbeConfig {
        method: "GET".into(),
        expected_status: 200,
        connect_timeout_secs: 10,
        tls_verify: true,
        ..Default::default()
    });
    task.agent_ids = vec!["a1".into(), "a2".into()];
    store.create_monitor(&task).unwrap();

    let loaded = store.get_monitor(&task.id).unwrap();
    assert_eq!(loaded.http, task.http);
    assert_eq!(loaded.agent_ids, task.agent_ids);
    assert_eq!(loaded.kind, MonitorKind::Https);
}

#[test]
fn enabled_monitor_listing_excludes_disabled() {
    let (_dir, store) = setup();
    let mut disabled = make_monitor("paused");
    disabled.enabled = false;
    store.create_monitor(&disabled).unwrap();
    store.create_monitor(&make_monitor("active")).unwrap();

    let enabled = store.list_enabled_monitors().unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].name, "active");
}

#[test]
fn metrics_query_is_time_bounded_and_ordered() {
    let (_dir, store) = setup();
    let base = now_millis();
    for (i, status) in [ProbeStatus::Up, ProbeStatus::Down, ProbeStatus::Up]
        .iter()
        .enumerate()
    {
        store
            .insert_metric(&make_probe_metric(
                "a1",
                "api-health",
                *status,
                base + i as i64 * 1000,
            ))
            .unwrap();
    }
    // A row outside the window.
    store
        .insert_metric(&make_probe_metric(
            "a1",
            "api-health",
            ProbeStatus::Up,
            base - 100_000,
        ))
        .unwrap();

    let rows = store
        .query_monitor_metrics("a1", "api-health", base, base + 10_000)
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(rows[1].status, Some(ProbeStatus::Down));
}

#[test]
fn prune_removes_only_old_metrics() {
    let (_dir, store) = setup();
    let base = now_millis();
    store
        .insert_metric(&make_probe_metric("a1", "m", ProbeStatus::Up, base - 10_000))
        .unwrap();
    store
        .insert_metric(&make_probe_metric("a1", "m", ProbeStatus::Up, base))
        .unwrap();

    let removed = store.prune_metrics_before(base - 5_000).unwrap();
    assert_eq!(removed, 1);
    let rows = store
        .query_monitor_metrics("a1", "m", base - 100_000, base + 1)
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn monitor_stats_upsert_replaces_by_pair() {
    let (_dir, store) = setup();
    let mut stats = MonitorStats {
        agent_id: "a1".into(),
        monitor_name: "api-health".into(),
        total_checks_24h: 10,
        success_checks_24h: 9,
        uptime_24h: 90.0,
        updated_at: now_millis(),
        ..MonitorStats::default()
    };
    store.upsert_monitor_stats(&stats).unwrap();

    stats.total_checks_24h = 20;
    stats.success_checks_24h = 20;
    stats.uptime_24h = 100.0;
    store.upsert_monitor_stats(&stats).unwrap();

    let rows = store.list_monitor_stats("api-health").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_checks_24h, 20);
    assert!((rows[0].uptime_24h - 100.0).abs() < f64::EPSILON);
}

#[test]
fn alert_config_crud_and_enabled_filter() {
    let (_dir, store) = setup();
    let now = now_millis();
    let config = AlertConfig {
        id: new_id(),
        agent_id: "global".into(),
        name: "default".into(),
        enabled: true,
        rules: AlertRules {
            cpu: ThresholdRule {
                enabled: true,
                threshold: 80.0,
                duration_secs: 10,
            },
            ..AlertRules::default()
        },
        created_at: now,
        updated_at: now,
    };
    store.create_alert_config(&config).unwrap();

    let enabled = store.list_enabled_alert_configs("global").unwrap();
    assert_eq!(enabled.len(), 1);
    assert!((enabled[0].rules.cpu.threshold - 80.0).abs() < f64::EPSILON);

    let mut updated = config.clone();
    updated.enabled = false;
    store.update_alert_config(&updated).unwrap();
    assert!(store.list_enabled_alert_configs("global").unwrap().is_empty());

    store.delete_alert_config(&config.id).unwrap();
    match store.get_alert_config(&config.id) {
        Err(StorageError::NotFound { .. }) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn latest_firing_record_lookup() {
    let (_dir, store) = setup();
    let now = now_millis();
    let make_record = |id: &str, fired_at: i64, status: AlertStatus| AlertRecord {
        id: id.to_string(),
        agent_id: "a1".into(),
        agent_name: "web-01".into(),
        config_id: "c1".into(),
        config_name: "default".into(),
        alert_type: AlertKind::Cpu,
        message: "CPU usage above 80.00% for 10 s, currently 91.00%".into(),
        threshold: 80.0,
        actual_value: 91.0,
        level: AlertLevel::Info,
        status,
        fired_at,
        resolved_at: None,
        created_at: fired_at,
        updated_at: fired_at,
    };

    store
        .insert_alert_record(&make_record("r1", now - 60_000, AlertStatus::Resolved))
        .unwrap();
    store
        .insert_alert_record(&make_record("r2", now - 30_000, AlertStatus::Firing))
        .unwrap();
    store
        .insert_alert_record(&make_record("r3", now, AlertStatus::Firing))
        .unwrap();

    let latest = store
        .latest_firing_record("c1", AlertKind::Cpu)
        .unwrap()
        .expect("a firing record exists");
    assert_eq!(latest.id, "r3");

    assert!(store
        .latest_firing_record("c1", AlertKind::Disk)
        .unwrap()
        .is_none());

    // Resolving r3 makes r2 the latest firing record.
    let mut resolved = latest;
    resolved.status = AlertStatus::Resolved;
    resolved.resolved_at = Some(now + 1000);
    resolved.updated_at = now + 1000;
    store.update_alert_record(&resolved).unwrap();

    let latest = store
        .latest_firing_record("c1", AlertKind::Cpu)
        .unwrap()
        .expect("r2 still firing");
    assert_eq!(latest.id, "r2");
}

#[test]
fn alert_record_pagination() {
    let (_dir, store) = setup();
    let now = now_millis();
    for i in 0..5 {
        store
            .insert_alert_record(&AlertRecord {
                id: format!("r{i}"),
                agent_id: "a1".into(),
                agent_name: "web-01".into(),
                config_id: "c1".into(),
                config_name: "default".into(),
                alert_type: AlertKind::Memory,
                message: "memory".into(),
                threshold: 80.0,
                actual_value: 85.0,
                level: AlertLevel::Info,
                status: AlertStatus::Firing,
                fired_at: now + i,
                resolved_at: None,
                created_at: now + i,
                updated_at: now + i,
            })
            .unwrap();
    }

    assert_eq!(store.count_alert_records(Some("a1")).unwrap(), 5);
    assert_eq!(store.count_alert_records(Some("other")).unwrap(), 0);

    let page = store.list_alert_records(Some("a1"), 2, 2).unwrap();
    assert_eq!(page.len(), 2);
    // Newest first.
    assert_eq!(page[0].id, "r2");
    assert_eq!(page[1].id, "r1");
}

#[test]
fn traffic_block_persists_through_dedicated_update() {
    let (_dir, store) = setup();
    let mut agent = make_agent("a1", "web-01");
    store.register_agent(&agent).unwrap();

    agent.traffic_used = 500;
    agent.traffic_baseline_recv = 1000;
    agent.traffic_period_start = now_millis();
    agent.traffic_alert_sent_80 = true;
    store.update_agent_traffic(&agent).unwrap();

    let loaded = store.get_agent("a1").unwrap();
    assert_eq!(loaded.traffic_used, 500);
    assert_eq!(loaded.traffic_baseline_recv, 1000);
    assert!(loaded.traffic_alert_sent_80);
    assert!(!loaded.traffic_alert_sent_90);
}

#[test]
fn notification_channel_roundtrip() {
    let (_dir, store) = setup();
    let now = now_millis();
    let channel = vigil_common::types::NotificationChannelConfig {
        id: new_id(),
        name: "ops-webhook".into(),
        channel_type: "webhook".into(),
        enabled: true,
        payload: serde_json::json!({"url": "https://hooks.example.com/x"}),
        created_at: now,
        updated_at: now,
    };
    store.upsert_notification_channel(&channel).unwrap();

    let mut disabled = channel.clone();
    disabled.id = new_id();
    disabled.name = "muted".into();
    disabled.enabled = false;
    store.upsert_notification_channel(&disabled).unwrap();

    assert_eq!(store.list_notification_channels().unwrap().len(), 2);
    let enabled = store.list_enabled_notification_channels().unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].name, "ops-webhook");
    assert_eq!(enabled[0].payload["url"], "https://hooks.example.com/x");
}
