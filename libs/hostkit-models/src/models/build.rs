//! Build classification models

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Build type detected for a source directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    Python,
    Node,
    NextjsStandard,
    NextjsStandalone,
    Static,
    Unknown,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Python => "python",
            BuildType::Node => "node",
            BuildType::NextjsStandard => "nextjs_standard",
            BuildType::NextjsStandalone => "nextjs_standalone",
            BuildType::Static => "static",
            BuildType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a source directory.
///
/// `standalone_root` and `server_entry` are set exactly when the build type is
/// [`BuildType::NextjsStandalone`], and `warning` only ever accompanies them. The
/// constructors and deserialization both go through the same check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClassification")]
pub struct BuildClassification {
    build_type: BuildType,
    #[serde(skip_serializing_if = "Option::is_none")]
    standalone_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_entry: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

/// Unchecked wire form of [`BuildClassification`]
#[derive(Deserialize)]
struct RawClassification {
    build_type: BuildType,
    #[serde(default)]
    standalone_root: Option<PathBuf>,
    #[serde(default)]
    server_entry: Option<PathBuf>,
    #[serde(default)]
    warning: Option<String>,
}

impl TryFrom<RawClassification> for BuildClassification {
    type Error = String;

    fn try_from(raw: RawClassification) -> Result<Self, Self::Error> {
        match (raw.build_type, raw.standalone_root, raw.server_entry) {
            (BuildType::NextjsStandalone, Some(root), Some(entry)) => {
                Ok(Self::standalone(root, entry, raw.warning))
            }
            (BuildType::NextjsStandalone, _, _) => {
                Err("nextjs_standalone needs both standalone_root and server_entry".to_string())
            }
            (build_type, None, None) if raw.warning.is_none() => Ok(Self::plain(build_type)),
            (build_type, _, _) => Err(format!(
                "{build_type} carries no standalone_root, server_entry or warning"
            )),
        }
    }
}

impl BuildClassification {
    /// Classification without a standalone layout.
    ///
    /// A standalone build is meaningless without its layout, so
    /// [`BuildType::NextjsStandalone`] comes back as [`BuildType::Unknown`]; use
    /// [`BuildClassification::standalone`] for it.
    pub fn plain(build_type: BuildType) -> Self {
        let build_type = match build_type {
            BuildType::NextjsStandalone => BuildType::Unknown,
            other => other,
        };
        Self {
            build_type,
            standalone_root: None,
            server_entry: None,
            warning: None,
        }
    }

    /// Standalone Next.js classification
    pub fn standalone(
        standalone_root: PathBuf,
        server_entry: PathBuf,
        warning: Option<String>,
    ) -> Self {
        Self {
            build_type: BuildType::NextjsStandalone,
            standalone_root: Some(standalone_root),
            server_entry: Some(server_entry),
            warning,
        }
    }

    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    pub fn standalone_root(&self) -> Option<&Path> {
        self.standalone_root.as_deref()
    }

    pub fn server_entry(&self) -> Option<&Path> {
        self.server_entry.as_deref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn is_standalone(&self) -> bool {
        self.build_type == BuildType::NextjsStandalone
    }
}
