//! Trust settings
//!
//! Settings are host-provided configuration, not user state: whether the
//! trust feature is enabled, what kind of host is running, and path casing.
//! Loadable from a YAML file; a missing file yields defaults.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Execution environment kind. Trust is meaningless in a browser host where
/// no local code execution happens, so the feature is forced off there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    Desktop,
    Browser,
}

impl Default for HostKind {
    fn default() -> Self {
        HostKind::Desktop
    }
}

/// Persisted non-interactive preference for opening files from outside the
/// trusted workspace boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpenFilesPreference {
    /// Ask every time (default)
    Prompt,
    /// Open in the current window without asking
    Open,
    /// Open in a new empty window without asking
    NewWindow,
}

impl Default for OpenFilesPreference {
    fn default() -> Self {
        OpenFilesPreference::Prompt
    }
}

impl OpenFilesPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenFilesPreference::Prompt => "prompt",
            OpenFilesPreference::Open => "open",
            OpenFilesPreference::NewWindow => "newWindow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prompt" => Some(OpenFilesPreference::Prompt),
            "open" => Some(OpenFilesPreference::Open),
            "newWindow" => Some(OpenFilesPreference::NewWindow),
            _ => None,
        }
    }
}

/// The complete trust settings block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustSettings {
    /// User-configured enablement; takes precedence over `default_enabled`
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Default enablement when the user has not configured a value
    #[serde(default = "default_true")]
    pub default_enabled: bool,

    #[serde(default)]
    pub host: HostKind,

    /// Automated extension test hosts bypass trust entirely
    #[serde(default)]
    pub extension_test_host: bool,

    /// Path comparison case sensitivity for trusted-folder matching
    #[serde(default = "default_true")]
    pub case_sensitive_paths: bool,

    /// Initial out-of-workspace-files preference; the request layer persists
    /// user changes to storage, which overrides this value
    #[serde(default)]
    pub untrusted_files: OpenFilesPreference,
}

fn default_true() -> bool {
    true
}

impl Default for TrustSettings {
    fn default() -> Self {
        TrustSettings {
            enabled: None,
            default_enabled: true,
            host: HostKind::Desktop,
            extension_test_host: false,
            case_sensitive_paths: true,
            untrusted_files: OpenFilesPreference::Prompt,
        }
    }
}

impl TrustSettings {
    /// Load settings from a YAML file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(TrustSettings::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: TrustSettings = serde_yaml_ng::from_str(&content)?;
        Ok(settings)
    }
}
