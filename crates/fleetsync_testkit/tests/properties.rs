//! Property and scenario tests across the store, core and protocol crates.

use fleetsync_core::{CoreError, EngineConfig, NODE_NAME_LABEL};
use fleetsync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn assert_index_matches_selectors(fleet: &TestFleet) {
    for app in fleet.stores().apps.list(TEST_NAMESPACE).unwrap() {
        let indexed: BTreeSet<String> = fleet.nodes_for(&app.name).into_iter().collect();
        assert_eq!(
            indexed,
            fleet.matching_nodes(&app.selector),
            "index disagrees with selector {:?} of {}",
            app.selector,
            app.name
        );
    }
}

fn config_reference(fleet: &TestFleet, app: &str, config: &str) -> Option<Version> {
    fleet
        .app(app)
        .references_of(ReferenceKind::Config)
        .find(|r| r.name == config)
        .map(|r| r.version.clone())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn index_tracks_selectors_through_any_ops(
        plan in fleet_plan_strategy(),
        ops in prop::collection::vec(fleet_op_strategy(), 0..12),
    ) {
        let fleet = plan.build();
        assert_index_matches_selectors(&fleet);

        for op in &ops {
            op.apply(&fleet, &plan);
            assert_index_matches_selectors(&fleet);
        }
        fleet.assert_consistent();
    }

    #[test]
    fn references_only_move_forward(
        plan in fleet_plan_strategy(),
        ops in prop::collection::vec(fleet_op_strategy(), 0..12),
    ) {
        let fleet = plan.build();
        let mut seen: Vec<Option<Version>> = (0..plan.apps.len())
            .map(|i| {
                plan.apps[i].config.and_then(|c| {
                    config_reference(&fleet, &FleetPlan::app_name(i), &FleetPlan::config_name(c))
                })
            })
            .collect();

        for op in &ops {
            op.apply(&fleet, &plan);
            for (i, app) in plan.apps.iter().enumerate() {
                let name = FleetPlan::app_name(i);
                let Some(config) = app.config else { continue };
                if fleet.stores().apps.get(&ObjectKey::new(TEST_NAMESPACE, &name)).is_err() {
                    continue;
                }
                let now = config_reference(&fleet, &name, &FleetPlan::config_name(config));
                if let (Some(before), Some(after)) = (&seen[i], &now) {
                    prop_assert!(!before.is_newer_than(after), "{name}: {before} -> {after}");
                }
                seen[i] = now;
            }
        }
    }

    #[test]
    fn referenced_configs_cannot_be_deleted(plan in fleet_plan_strategy()) {
        let fleet = plan.build();
        for c in 0..plan.configs {
            let name = FleetPlan::config_name(c);
            let dependents = fleet.apps_for_config(&name);
            let result = fleet.try_delete(ReferenceKind::Config, &name);
            if dependents.is_empty() {
                prop_assert!(result.is_ok());
            } else {
                let is_violation = matches!(result, Err(CoreError::ReferentialIntegrityViolation { .. }));
                prop_assert!(is_violation);
                for app in dependents {
                    let _ = fleet.delete_app(&app);
                }
                prop_assert!(fleet.apps_for_config(&name).is_empty());
                prop_assert!(fleet.try_delete(ReferenceKind::Config, &name).is_ok());
            }
        }
        fleet.assert_consistent();
    }
}

#[test]
fn redelivered_config_write_is_a_no_op() {
    let fleet = scenarios::two_zone_fleet();
    let (config, first) = fleet.update_config("settings", "level", "debug");
    assert_eq!(first.value.updated.len(), 1);
    let app = fleet.app("web");
    let node = fleet.node("edge-1");

    let again = fleet.plane.on_config_write(&config).unwrap();
    assert!(again.value.updated.is_empty());
    assert_eq!(again.value.unchanged, vec!["web".to_string()]);
    assert_eq!(fleet.app("web").version, app.version);
    assert_eq!(fleet.node("edge-1").version, node.version);
}

#[test]
fn secret_update_reaches_nodes_once() {
    let fleet = TestFleet::new();
    fleet.add_node("edge-1", &[("zone", "a")]);
    fleet.add_node("edge-2", &[("zone", "b")]);
    let secret = fleet.add_secret(Secret::new(TEST_NAMESPACE, "tls").with_data("cert", "v1"));
    let (web, _) = fleet.put_app(
        Application::new(TEST_NAMESPACE, "web")
            .with_selector("zone=a")
            .with_volume(Volume::secret("creds", "tls", secret.version)),
    );
    assert_eq!(fleet.apps_for_secret("tls"), vec!["web"]);

    let (secret, outcome) = fleet.update_secret("tls", "cert", "v2");
    assert!(outcome.is_clean());
    let bumped = fleet.app("web");
    assert_eq!(bumped.version, web.version.next());
    assert_eq!(outcome.value.updated, vec![bumped.app_info()]);
    assert_eq!(outcome.value.nodes.len(), 1);
    assert_eq!(
        bumped
            .references_of(ReferenceKind::Secret)
            .next()
            .map(|r| r.version.clone()),
        Some(secret.version.clone())
    );
    assert_eq!(fleet.desire_of("edge-1"), vec![bumped.app_info()]);
    assert!(fleet.desire_of("edge-2").is_empty());
    let node = fleet.node("edge-1");

    let again = fleet.plane.on_secret_write(&secret).unwrap();
    assert!(again.is_clean());
    assert!(again.value.updated.is_empty());
    assert_eq!(again.value.unchanged, vec!["web".to_string()]);
    assert_eq!(fleet.app("web").version, bumped.version);
    assert_eq!(fleet.node("edge-1").version, node.version);
    fleet.assert_consistent();
}

#[test]
fn older_config_write_never_downgrades() {
    let fleet = scenarios::two_zone_fleet();
    let (old, _) = fleet.update_config("settings", "level", "debug");
    let _ = fleet.update_config("settings", "level", "trace");
    let current = config_reference(&fleet, "web", "settings").unwrap();

    let _ = fleet.plane.on_config_write(&old).unwrap();
    assert_eq!(config_reference(&fleet, "web", "settings"), Some(current));
}

#[test]
fn selector_change_migrates_placement() {
    let fleet = TestFleet::new();
    fleet.add_node("n1", &[("zone", "a")]);
    fleet.add_node("n2", &[("zone", "a"), ("edge", "yes")]);
    fleet.add_node("n3", &[("edge", "yes")]);
    let _ = fleet.put_app(Application::new(TEST_NAMESPACE, "A").with_selector("zone=a"));
    assert_eq!(fleet.nodes_for("A"), vec!["n1", "n2"]);

    let _ = fleet.put_app(Application::new(TEST_NAMESPACE, "A").with_selector("edge=yes"));

    assert!(!fleet.node("n1").desire.contains("A"));
    assert!(fleet.node("n3").desire.contains("A"));
    assert_eq!(fleet.nodes_for("A"), vec!["n2", "n3"]);
    fleet.assert_consistent();
}

#[test]
fn node_delete_completes_despite_cleanup_failures() {
    let faulty = FaultyStores::new();
    let fleet = TestFleet::with_config(faulty.stores(), EngineConfig::default());
    fleet.add_node("edge-1", &[]);
    fleet.add_node("edge-2", &[]);
    let config = fleet.add_config(Config::new(TEST_NAMESPACE, "edge-1-conf").owned_by("edge-1"));
    let _ = fleet.put_app(
        Application::new(TEST_NAMESPACE, "edge-1-agent")
            .with_selector(format!("{NODE_NAME_LABEL}=edge-1"))
            .with_volume(Volume::config("conf", "edge-1-conf", config.version))
            .owned_by("edge-1"),
    );
    assert_eq!(fleet.nodes_for("edge-1-agent"), vec!["edge-1"]);

    faulty.configs.fail_deletes_of("edge-1-conf");
    let outcome = fleet.delete_node("edge-1");

    assert!(!outcome.is_clean());
    assert_eq!(outcome.value.deleted_apps, vec!["edge-1-agent".to_string()]);
    assert!(outcome.value.deleted_configs.is_empty());
    assert!(fleet
        .stores()
        .nodes
        .get(&ObjectKey::new(TEST_NAMESPACE, "edge-1"))
        .is_err());
    assert!(faulty.configs.inner().get(&ObjectKey::new(TEST_NAMESPACE, "edge-1-conf")).is_ok());
    assert!(fleet.apps_for_config("edge-1-conf").is_empty());
    assert_eq!(faulty.configs.fired(), 1);
}

#[test]
fn placement_survives_one_conflict_per_node() {
    let faulty = FaultyStores::new();
    let fleet = TestFleet::with_config(faulty.stores(), EngineConfig::default());
    fleet.add_node("edge-1", &[("zone", "a")]);

    faulty.nodes.inject_conflicts(1);
    let (_, outcome) = fleet.put_app(Application::new(TEST_NAMESPACE, "web").with_selector("zone=a"));

    assert!(outcome.is_clean());
    assert_eq!(fleet.nodes_for("web"), vec!["edge-1"]);
    assert_eq!(fleet.desire_of("edge-1"), vec![AppInfo::new("web", 1u64)]);
}

#[test]
fn failed_node_write_is_a_warning_not_an_index_entry() {
    let faulty = FaultyStores::new();
    let fleet = TestFleet::with_config(faulty.stores(), EngineConfig::default());
    fleet.add_node("edge-1", &[("zone", "a")]);
    fleet.add_node("edge-2", &[("zone", "a")]);

    faulty.nodes.fail_updates_of("edge-2");
    let (_, outcome) = fleet.put_app(Application::new(TEST_NAMESPACE, "web").with_selector("zone=a"));

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].name, "edge-2");
    assert_eq!(fleet.nodes_for("web"), vec!["edge-1"]);

    faulty.nodes.heal();
    let _ = fleet.plane.reconcile_namespace(TEST_NAMESPACE).unwrap();
    assert_eq!(fleet.nodes_for("web"), vec!["edge-1", "edge-2"]);
    fleet.assert_consistent();
}
