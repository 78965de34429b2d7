//! Build classifier
//!
//! Works out what kind of build a source directory holds by checking an ordered
//! table of rules; the first rule that matches decides. Read-only and never
//! fails: anything unrecognised is [`BuildType::Unknown`].

use std::path::{Path, PathBuf};

use hostkit_models::{BuildClassification, BuildType};
use tracing::debug;
use walkdir::WalkDir;

pub const SERVER_ENTRY: &str = "server.js";
pub const NEXT_DIR: &str = ".next";
pub const STANDALONE_DIR: &str = ".next/standalone";
pub const VENDOR_DIR: &str = "node_modules";
pub const PACKAGE_MANIFEST: &str = "package.json";
pub const PYTHON_MANIFESTS: &[&str] = &["requirements.txt", "pyproject.toml", "Pipfile"];
pub const HTML_ENTRY: &str = "index.html";

type Rule = fn(&Path) -> Option<BuildClassification>;

/// Classification rules in priority order
const RULES: &[(&str, Rule)] = &[
    ("root standalone server", root_standalone),
    ("nested standalone server", nested_standalone),
    ("next build output", next_standard),
    ("package manifest", node),
    ("python manifest", python),
    ("html entry", static_site),
];

/// Classify a source directory
pub fn classify(source_dir: &Path) -> BuildClassification {
    for (name, rule) in RULES {
        if let Some(classification) = rule(source_dir) {
            debug!(
                "{} classified as {} by rule '{}'",
                source_dir.display(),
                classification.build_type(),
                name
            );
            return classification;
        }
    }
    debug!("{} classified as unknown", source_dir.display());
    BuildClassification::plain(BuildType::Unknown)
}

fn root_standalone(root: &Path) -> Option<BuildClassification> {
    let entry = root.join(SERVER_ENTRY);
    if entry.is_file() && root.join(NEXT_DIR).is_dir() {
        return Some(standalone_at(root.to_path_buf(), entry));
    }
    None
}

fn nested_standalone(root: &Path) -> Option<BuildClassification> {
    let standalone = root.join(STANDALONE_DIR);
    if !standalone.is_dir() {
        return None;
    }

    let candidates: Vec<PathBuf> = WalkDir::new(&standalone)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != VENDOR_DIR)
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == SERVER_ENTRY)
        .map(|e| e.into_path())
        .collect();

    if candidates.len() > 1 {
        debug!(
            "{} server entries under {}, applying tie-break",
            candidates.len(),
            standalone.display()
        );
    }

    let chosen = candidates
        .iter()
        .find(|entry| has_sibling_dir(entry, NEXT_DIR))
        .or_else(|| candidates.first())?
        .clone();
    let root = chosen.parent()?.to_path_buf();
    Some(standalone_at(root, chosen))
}

fn next_standard(root: &Path) -> Option<BuildClassification> {
    (root.join(NEXT_DIR).is_dir() && !root.join(STANDALONE_DIR).is_dir())
        .then(|| BuildClassification::plain(BuildType::NextjsStandard))
}

fn node(root: &Path) -> Option<BuildClassification> {
    root.join(PACKAGE_MANIFEST)
        .is_file()
        .then(|| BuildClassification::plain(BuildType::Node))
}

fn python(root: &Path) -> Option<BuildClassification> {
    PYTHON_MANIFESTS
        .iter()
        .any(|m| root.join(m).is_file())
        .then(|| BuildClassification::plain(BuildType::Python))
}

fn static_site(root: &Path) -> Option<BuildClassification> {
    root.join(HTML_ENTRY)
        .is_file()
        .then(|| BuildClassification::plain(BuildType::Static))
}

fn has_sibling_dir(entry: &Path, name: &str) -> bool {
    entry
        .parent()
        .map(|dir| dir.join(name).is_dir())
        .unwrap_or(false)
}

fn standalone_at(root: PathBuf, entry: PathBuf) -> BuildClassification {
    let warning = (!has_sibling_dir(&entry, VENDOR_DIR)).then(|| {
        format!(
            "No {} next to {}; the standalone server will not start until its \
             dependencies are present",
            VENDOR_DIR,
            entry.display()
        )
    });
    BuildClassification::standalone(root, entry, warning)
}
