use std::fs;
use std::path::Path;

use tempfile::TempDir;

use polyrun_core::scanner::Scanner;
use polyrun_core::workspace::DependencyType;
use polyrun_core::{Error, Graph};

fn write_manifest(dir: &Path, manifest: serde_json::Value) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("package.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
}

fn create_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write_manifest(
        root,
        serde_json::json!({
            "name": "monorepo",
            "private": true,
            "workspaces": ["packages/*", "apps/*"],
            "devDependencies": { "tooling": "^0.1.0" }
        }),
    );
    write_manifest(
        &root.join("packages/core"),
        serde_json::json!({ "name": "core", "version": "2.0.0", "keywords": ["lib"] }),
    );
    write_manifest(
        &root.join("packages/ui"),
        serde_json::json!({
            "name": "ui",
            "version": "1.0.0",
            "dependencies": { "core": "^2.0.0", "react": "^18.0.0" },
            "peerDependencies": { "core": "*" }
        }),
    );
    write_manifest(
        &root.join("apps/web"),
        serde_json::json!({
            "name": "web",
            "private": true,
            "version": "not-a-version",
            "dependencies": { "ui": "workspace:*" }
        }),
    );
    write_manifest(
        &root.join("packages/ui/node_modules/core"),
        serde_json::json!({ "name": "core", "version": "0.0.1" }),
    );
    temp_dir
}

#[test]
fn test_scan_workspaces() {
    let temp_dir = create_repo();
    let workspaces = Scanner::new(temp_dir.path()).scan().unwrap();

    let names: Vec<&str> = workspaces.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["monorepo", "core", "ui", "web"]);

    let root = &workspaces[0];
    assert!(root.is_root);
    assert!(root.is_private);
    assert_eq!(root.display_dir(), ".");
    assert_eq!(root.dependencies.dev_dependencies["tooling"], "^0.1.0");

    let ui = &workspaces[2];
    assert_eq!(ui.display_dir(), "packages/ui");
    assert_eq!(ui.version.as_deref(), Some("1.0.0"));
    assert_eq!(
        ui.dependencies.get(DependencyType::Dependencies).len(),
        2
    );
    assert_eq!(ui.manifest["name"], "ui");
}

#[test]
fn test_invalid_version_dropped() {
    let temp_dir = create_repo();
    let workspaces = Scanner::new(temp_dir.path()).scan().unwrap();
    let web = workspaces.iter().find(|w| w.name == "web").unwrap();
    assert!(web.version.is_none());
    assert!(web.is_private);
}

#[test]
fn test_scanned_graph() {
    let temp_dir = create_repo();
    let graph = Graph::build(Scanner::new(temp_dir.path()).scan().unwrap()).unwrap();

    let web = graph.resolve("web").unwrap();
    let deps: Vec<String> = graph
        .all_dependencies(web)
        .into_iter()
        .map(|id| graph.get(id).name.clone())
        .collect();
    assert_eq!(deps, vec!["core", "ui"]);

    let ui = graph.resolve("ui").unwrap();
    assert_eq!(graph.links_from(ui, false, None).len(), 2);
}

#[test]
fn test_workspaces_object_form_and_negation() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_manifest(
        root,
        serde_json::json!({
            "name": "root",
            "workspaces": { "packages": ["libs/**", "!libs/legacy"] }
        }),
    );
    write_manifest(&root.join("libs/a"), serde_json::json!({ "name": "a" }));
    write_manifest(&root.join("libs/group/b"), serde_json::json!({ "name": "b" }));
    write_manifest(&root.join("libs/legacy"), serde_json::json!({ "name": "legacy" }));
    write_manifest(&root.join(".cache/c"), serde_json::json!({ "name": "c" }));

    let workspaces = Scanner::new(root).scan().unwrap();
    let names: Vec<&str> = workspaces.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["root", "a", "b"]);
}

#[test]
fn test_root_without_workspaces() {
    let temp_dir = TempDir::new().unwrap();
    write_manifest(temp_dir.path(), serde_json::json!({ "name": "single" }));

    let workspaces = Scanner::new(temp_dir.path()).scan().unwrap();
    assert_eq!(workspaces.len(), 1);
    assert!(workspaces[0].is_root);
}

#[test]
fn test_missing_root_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let result = Scanner::new(temp_dir.path()).scan();
    assert!(matches!(result, Err(Error::ManifestNotFound(_))));
}

#[test]
fn test_malformed_manifest() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("package.json"), "{ not json").unwrap();
    let result = Scanner::new(temp_dir.path()).scan();
    assert!(matches!(result, Err(Error::Json { .. })));

    fs::write(
        temp_dir.path().join("package.json"),
        r#"{ "name": "x", "dependencies": ["not", "a", "map"] }"#,
    )
    .unwrap();
    let result = Scanner::new(temp_dir.path()).scan();
    assert!(matches!(result, Err(Error::InvalidManifest { .. })));
}

#[test]
fn test_duplicate_names_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_manifest(root, serde_json::json!({ "name": "root", "workspaces": ["packages/*"] }));
    write_manifest(&root.join("packages/one"), serde_json::json!({ "name": "same" }));
    write_manifest(&root.join("packages/two"), serde_json::json!({ "name": "same" }));

    let result = Scanner::new(root).scan();
    assert!(matches!(result, Err(Error::DuplicateWorkspace { .. })));
}
