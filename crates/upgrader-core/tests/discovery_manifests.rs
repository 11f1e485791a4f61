//! Manifest discovery across search roots, and running shell-backed units.

use std::path::Path;

use upgrader_core::{
    AssumeYes, Discovery, DiscoveryError, Executor, MemoryHistoryStore, Reporter, UpgradeError,
};

fn manifest(root: &Path, id: &str, body: &str) {
    let dir = root.join("upgrades");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{id}.toml")), body).unwrap();
}

#[test]
fn units_from_several_roots_form_one_registry() {
    let core = tempfile::tempdir().unwrap();
    let plugin = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();
    manifest(core.path(), "core_2024_01_01_init", "info = \"init\"\ndo_upgrade = \"true\"\n");
    manifest(
        plugin.path(),
        "plugin_release_1_0_0",
        "info = \"release\"\ndo_upgrade = \"true\"\n",
    );

    let registry = Discovery::from_search_roots([core.path(), plugin.path(), empty.path()])
        .load()
        .unwrap();

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("core_2024_01_01_init").unwrap().repository(), "core");
    assert_eq!(registry.get("plugin_release_1_0_0").unwrap().repository(), "plugin");
}

#[test]
fn broken_manifests_are_reported_together() {
    let root = tempfile::tempdir().unwrap();
    manifest(root.path(), "demo_2024_01_01_ok", "info = \"fine\"\ndo_upgrade = \"true\"\n");
    manifest(
        root.path(),
        "demo_2024_01_02_no_body",
        "info = \"missing do_upgrade\"\n",
    );
    manifest(
        root.path(),
        "demo_2024_01_03_bad_estimate",
        "info = \"x\"\ndo_upgrade = \"true\"\nestimate = -5\n",
    );
    manifest(root.path(), "nodate", "info = \"x\"\ndo_upgrade = \"true\"\n");
    manifest(
        root.path(),
        "demo_2024_01_04_typo",
        "info = \"x\"\ndo_upgrade = \"true\"\ndepend_on = []\n",
    );

    let err = Discovery::from_search_roots([root.path()]).load().unwrap_err();
    let DiscoveryError::BrokenUnits { units } = err else {
        panic!("expected BrokenUnits, got {err:?}");
    };
    let ids: Vec<&str> = units.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "demo_2024_01_02_no_body",
            "demo_2024_01_03_bad_estimate",
            "demo_2024_01_04_typo",
            "nodate",
        ]
    );
}

#[test]
fn same_id_in_two_roots_is_broken() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    for root in [first.path(), second.path()] {
        manifest(root, "demo_2024_01_01_a", "info = \"a\"\ndo_upgrade = \"true\"\n");
    }

    let err = Discovery::from_search_roots([first.path(), second.path()])
        .load()
        .unwrap_err();
    assert!(err.to_string().contains("duplicate upgrade id"));
}

#[tokio::test]
async fn shell_units_run_in_upgrades_dir_and_fail_with_stderr() {
    let root = tempfile::tempdir().unwrap();
    manifest(
        root.path(),
        "demo_2024_01_01_touch",
        "info = \"Create marker\"\ndo_upgrade = \"touch \\\"$UPGRADE_ID.done\\\"\"\n",
    );
    manifest(
        root.path(),
        "demo_2024_01_02_fail",
        "info = \"Always fails\"\ndepends_on = [\"demo_2024_01_01_touch\"]\ndo_upgrade = \"echo 'no such table' >&2; exit 2\"\n",
    );

    let registry = Discovery::from_search_roots([root.path()]).load().unwrap();
    let store = MemoryHistoryStore::new();
    let (reporter, console) = Reporter::buffered();

    let err = Executor::new(&registry, &store, &reporter)
        .run(&AssumeYes)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        UpgradeError::Execution(e) if e.messages == vec!["no such table".to_string()]
    ));
    assert!(root
        .path()
        .join("upgrades")
        .join("demo_2024_01_01_touch.done")
        .exists());
    assert_eq!(store.applied_ids(), vec!["demo_2024_01_01_touch".to_string()]);
    assert!(console.contents().contains(" (-) no such table"));
}
