//! Build classifier tests

use hostkit::deploy::classify::classify;
use hostkit_models::BuildType;

use crate::common::{mkdir, write};

#[test]
fn test_root_server_with_next_dir_is_standalone_regardless_of_other_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "server.js", "");
    mkdir(root, ".next");
    write(root, "package.json", "{}");
    write(root, "requirements.txt", "");
    write(root, "index.html", "");
    write(root, ".next/standalone/nested/server.js", "");

    let result = classify(root);
    assert_eq!(result.build_type(), BuildType::NextjsStandalone);
    assert_eq!(result.standalone_root(), Some(root));
    assert_eq!(result.server_entry(), Some(root.join("server.js").as_path()));
}

#[test]
fn test_root_server_without_next_dir_is_not_standalone() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "server.js", "");
    write(dir.path(), "package.json", "{}");

    assert_eq!(classify(dir.path()).build_type(), BuildType::Node);
}

#[test]
fn test_nested_entry_without_vendor_dir_warns() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, ".next/standalone/server.js", "");

    let result = classify(root);
    assert_eq!(result.build_type(), BuildType::NextjsStandalone);
    assert_eq!(
        result.standalone_root(),
        Some(root.join(".next/standalone").as_path())
    );
    let warning = result.warning().expect("missing node_modules should warn");
    assert!(!warning.is_empty());
}

#[test]
fn test_nested_entry_with_vendor_dir_has_no_warning() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, ".next/standalone/apps/web/server.js", "");
    mkdir(root, ".next/standalone/apps/web/node_modules");

    let result = classify(root);
    assert_eq!(result.build_type(), BuildType::NextjsStandalone);
    assert_eq!(
        result.standalone_root(),
        Some(root.join(".next/standalone/apps/web").as_path())
    );
    assert!(result.warning().is_none());
}

#[test]
fn test_vendor_copies_of_server_entry_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, ".next/standalone/node_modules/next/dist/server.js", "");

    assert_eq!(classify(root).build_type(), BuildType::Unknown);

    write(root, "package.json", "{}");
    assert_eq!(classify(root).build_type(), BuildType::Node);
}

#[test]
fn test_tie_break_prefers_entry_with_runtime_folder() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, ".next/standalone/a/server.js", "");
    write(root, ".next/standalone/b/server.js", "");
    mkdir(root, ".next/standalone/b/.next");

    let result = classify(root);
    assert_eq!(
        result.standalone_root(),
        Some(root.join(".next/standalone/b").as_path())
    );
}

#[test]
fn test_tie_break_falls_back_to_traversal_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, ".next/standalone/zeta/server.js", "");
    write(root, ".next/standalone/alpha/server.js", "");

    let result = classify(root);
    assert_eq!(
        result.standalone_root(),
        Some(root.join(".next/standalone/alpha").as_path())
    );
}

#[test]
fn test_next_build_without_standalone() {
    let dir = tempfile::tempdir().unwrap();
    mkdir(dir.path(), ".next/static");
    write(dir.path(), "package.json", "{}");

    let result = classify(dir.path());
    assert_eq!(result.build_type(), BuildType::NextjsStandard);
    assert!(result.standalone_root().is_none());
    assert!(result.warning().is_none());
}

#[test]
fn test_manifest_priority() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pyproject.toml", "");
    write(dir.path(), "index.html", "");
    assert_eq!(classify(dir.path()).build_type(), BuildType::Python);

    write(dir.path(), "package.json", "{}");
    assert_eq!(classify(dir.path()).build_type(), BuildType::Node);
}

#[test]
fn test_each_python_manifest() {
    for manifest in ["requirements.txt", "pyproject.toml", "Pipfile"] {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), manifest, "");
        assert_eq!(
            classify(dir.path()).build_type(),
            BuildType::Python,
            "{manifest}"
        );
    }
}

#[test]
fn test_static_and_unknown() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(classify(dir.path()).build_type(), BuildType::Unknown);

    write(dir.path(), "index.html", "<html></html>");
    assert_eq!(classify(dir.path()).build_type(), BuildType::Static);

    let missing = dir.path().join("does-not-exist");
    assert_eq!(classify(&missing).build_type(), BuildType::Unknown);
}
