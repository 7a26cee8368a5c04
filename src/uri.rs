//! URI value type for workspace roots and trusted-folder entries
//!
//! A deliberately small model: scheme, authority and a slash-separated path.
//! Serializes to the "revivable" JSON form used by the persisted
//! trusted-folder list (`{"scheme": ..., "authority": ..., "path": ...}`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheme used for local filesystem resources
pub const SCHEME_FILE: &str = "file";

/// Schemes whose resources are transient and never participate in trust
/// matching (untitled workspace files, in-memory documents).
pub const TRANSIENT_SCHEMES: &[&str] = &["untitled", "inmemory"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uri {
    pub scheme: String,

    #[serde(default)]
    pub authority: String,

    pub path: String,
}

impl Uri {
    /// A local filesystem URI
    pub fn file(path: impl Into<String>) -> Self {
        Uri {
            scheme: SCHEME_FILE.to_string(),
            authority: String::new(),
            path: normalize_path(&path.into()),
        }
    }

    /// A remote resource addressed through an authority (e.g. an SSH host)
    pub fn remote(scheme: impl Into<String>, authority: impl Into<String>, path: impl Into<String>) -> Self {
        Uri {
            scheme: scheme.into(),
            authority: authority.into(),
            path: normalize_path(&path.into()),
        }
    }

    /// Whether this URI names a transient resource (untitled / in-memory)
    pub fn is_transient(&self) -> bool {
        TRANSIENT_SCHEMES.contains(&self.scheme.as_str())
    }

    /// Whether this URI is on the local filesystem
    pub fn is_local(&self) -> bool {
        self.scheme == SCHEME_FILE
    }

    /// Equality with configurable path case sensitivity. Scheme and
    /// authority always compare case-insensitively.
    pub fn is_equal(&self, other: &Uri, case_sensitive: bool) -> bool {
        if !self.scheme.eq_ignore_ascii_case(&other.scheme)
            || !self.authority.eq_ignore_ascii_case(&other.authority)
        {
            return false;
        }
        paths_equal(&self.path, &other.path, case_sensitive)
    }

    /// Whether `self` is equal to `other` or an ancestor of it.
    pub fn is_equal_or_parent(&self, other: &Uri, case_sensitive: bool) -> bool {
        if !self.scheme.eq_ignore_ascii_case(&other.scheme)
            || !self.authority.eq_ignore_ascii_case(&other.authority)
        {
            return false;
        }
        let parent = normalize_path(&self.path);
        let child = normalize_path(&other.path);
        if paths_equal(&parent, &child, case_sensitive) {
            return true;
        }
        let (parent_cmp, child_cmp) = if case_sensitive {
            (parent.clone(), child)
        } else {
            (parent.to_lowercase(), child.to_lowercase())
        };
        if parent_cmp == "/" {
            return child_cmp.starts_with('/');
        }
        child_cmp.starts_with(&format!("{parent_cmp}/"))
    }

    /// Parent URI, or `None` for the root path
    pub fn parent(&self) -> Option<Uri> {
        let path = normalize_path(&self.path);
        if path == "/" || path.is_empty() {
            return None;
        }
        let parent_path = match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
            None => return None,
        };
        Some(Uri {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path: parent_path,
        })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)
    }
}

/// Strip a trailing slash (the root path keeps its single slash)
fn normalize_path(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

fn paths_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    let a = normalize_path(a);
    let b = normalize_path(b);
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(&b)
    }
}
