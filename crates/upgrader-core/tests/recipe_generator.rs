//! Recipe generation against a history store and a discovered registry.

use chrono::NaiveDate;
use upgrader_core::{
    create_recipe, create_release, plan_pending, AppliedHistory, Discovery, HistoryStore,
    MemoryHistoryStore, RecipeError, RecipeRequest, UnitManifest,
};

fn request(path: &std::path::Path) -> RecipeRequest {
    RecipeRequest {
        date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        ..RecipeRequest::new(path)
    }
}

fn read_manifest(path: &std::path::Path) -> UnitManifest {
    toml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn manifest(root: &std::path::Path, id: &str, deps: &[&str]) {
    let dir = root.join("upgrades");
    std::fs::create_dir_all(&dir).unwrap();
    let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
    std::fs::write(
        dir.join(format!("{id}.toml")),
        format!("info = \"{id}\"\ndepends_on = [{}]\ndo_upgrade = \"true\"\n", deps.join(", ")),
    )
    .unwrap();
}

#[tokio::test]
async fn dated_recipe_defaults_to_latest_applied() {
    let parent = tempfile::tempdir().unwrap();
    let module = parent.path().join("Demo-Module");
    std::fs::create_dir_all(&module).unwrap();

    let store = MemoryHistoryStore::new();
    store.record_success("demo_module_2024_01_01_a").await.unwrap();
    store.record_success("other_2024_02_01_x").await.unwrap();
    store.record_success("demo_module_2024_01_05_b").await.unwrap();

    let recipe = create_recipe(&request(&module), &store).await.unwrap();

    assert_eq!(recipe.id, "demo_module_2024_03_09_rename_me");
    assert_eq!(recipe.path, module.join("upgrades").join("demo_module_2024_03_09_rename_me.toml"));
    assert_eq!(recipe.depends_on, vec!["demo_module_2024_01_05_b".to_string()]);
    assert_eq!(read_manifest(&recipe.path).depends_on, recipe.depends_on);
}

#[tokio::test]
async fn dated_recipe_skips_repository_sharing_a_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryHistoryStore::new();
    store.record_success("demo_2024_01_01_a").await.unwrap();
    store.record_success("demo_extra_2024_02_01_x").await.unwrap();

    let mut req = request(dir.path());
    req.repository = Some("demo".to_string());
    let recipe = create_recipe(&req, &store).await.unwrap();

    assert_eq!(recipe.depends_on, vec!["demo_2024_01_01_a".to_string()]);
}

#[tokio::test]
async fn dated_recipe_uses_placeholder_without_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = request(dir.path());
    req.repository = Some("demo".to_string());

    let recipe = create_recipe(&req, &MemoryHistoryStore::new()).await.unwrap();
    assert_eq!(recipe.depends_on, vec!["CHANGE_ME".to_string()]);
}

#[tokio::test]
async fn explicit_dependencies_win() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryHistoryStore::with_applied(["demo_2024_01_01_a"]);
    let mut req = request(dir.path());
    req.repository = Some("demo".to_string());
    req.depends_on = vec!["demo_2024_02_01_x".to_string(), "demo_2024_02_02_y".to_string()];

    let recipe = create_recipe(&req, &store).await.unwrap();
    assert_eq!(recipe.depends_on, req.depends_on);
}

#[tokio::test]
async fn existing_recipe_is_not_overwritten_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryHistoryStore::new();
    let mut req = request(dir.path());
    req.repository = Some("demo".to_string());

    let first = create_recipe(&req, &store).await.unwrap();
    std::fs::write(&first.path, "edited").unwrap();

    let err = create_recipe(&req, &store).await.unwrap_err();
    assert!(matches!(err, RecipeError::Exists { .. }));
    assert_eq!(std::fs::read_to_string(&first.path).unwrap(), "edited");

    req.force = true;
    create_recipe(&req, &store).await.unwrap();
    assert_ne!(std::fs::read_to_string(&first.path).unwrap(), "edited");
}

#[tokio::test]
async fn repository_that_does_not_parse_back_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = request(dir.path());
    req.repository = Some("legacy_release".to_string());

    let err = create_recipe(&req, &MemoryHistoryStore::new()).await.unwrap_err();
    assert!(matches!(err, RecipeError::UnparsableGeneratedId { .. }));
    assert!(err.to_string().contains("--repository"));
}

#[tokio::test]
async fn release_uses_full_graph_endpoints_even_when_applied() {
    let root = tempfile::tempdir().unwrap();
    manifest(root.path(), "demo_2024_01_01_a", &[]);
    manifest(root.path(), "demo_2024_01_02_b", &["demo_2024_01_01_a"]);
    manifest(root.path(), "demo_2024_01_03_c", &["demo_2024_01_01_a"]);
    manifest(root.path(), "other_2024_01_01_z", &[]);
    let registry = Discovery::from_search_roots([root.path()]).load().unwrap();

    // History covering everything must not hide the end-points.
    let store = MemoryHistoryStore::with_applied([
        "demo_2024_01_01_a",
        "demo_2024_01_02_b",
        "demo_2024_01_03_c",
    ]);
    assert_eq!(store.applied().await.unwrap().len(), 3);

    let mut req = request(root.path());
    req.repository = Some("demo".to_string());
    let recipe = create_release(&req, &registry).unwrap();

    assert_eq!(recipe.id, "demo_release_x_y_z");
    assert_eq!(
        recipe.depends_on,
        vec!["demo_2024_01_02_b".to_string(), "demo_2024_01_03_c".to_string()]
    );

    // The generated release is itself a loadable unit once renamed.
    let renamed = root.path().join("upgrades").join("demo_release_1_0_0.toml");
    std::fs::rename(&recipe.path, &renamed).unwrap();
    let registry = Discovery::from_search_roots([root.path()]).load().unwrap();
    assert_eq!(registry.get("demo_release_1_0_0").unwrap().depends_on().len(), 2);
}

#[test]
fn release_without_endpoints_fails() {
    let root = tempfile::tempdir().unwrap();
    manifest(root.path(), "other_2024_01_01_z", &[]);
    let registry = Discovery::from_search_roots([root.path()]).load().unwrap();

    let mut req = request(root.path());
    req.repository = Some("demo".to_string());
    let err = create_release(&req, &registry).unwrap_err();
    assert!(matches!(err, RecipeError::NoEndpoints { ref repository } if repository == "demo"));
}

#[test]
fn forced_release_regeneration_does_not_depend_on_itself() {
    let root = tempfile::tempdir().unwrap();
    manifest(root.path(), "demo_2024_01_01_a", &[]);
    manifest(root.path(), "demo_2024_01_02_b", &["demo_2024_01_01_a"]);

    let mut req = request(root.path());
    req.repository = Some("demo".to_string());

    let registry = Discovery::from_search_roots([root.path()]).load().unwrap();
    let first = create_release(&req, &registry).unwrap();
    assert_eq!(first.depends_on, vec!["demo_2024_01_02_b".to_string()]);

    // The scaffold is now a registered unit and the only end-point of `demo`.
    let registry = Discovery::from_search_roots([root.path()]).load().unwrap();
    assert!(registry.contains("demo_release_x_y_z"));

    req.force = true;
    let second = create_release(&req, &registry).unwrap();
    assert_eq!(second.depends_on, vec!["demo_2024_01_02_b".to_string()]);
    assert_eq!(read_manifest(&second.path).depends_on, second.depends_on);

    let registry = Discovery::from_search_roots([root.path()]).load().unwrap();
    let plan = plan_pending(&registry, &AppliedHistory::new()).unwrap();
    assert_eq!(
        plan.ids(),
        vec!["demo_2024_01_01_a", "demo_2024_01_02_b", "demo_release_x_y_z"]
    );
}
