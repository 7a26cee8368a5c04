//! Persisted trusted-folder state
//!
//! The trusted-folder list is a single JSON blob under one application-scoped
//! storage key. Durability is best-effort: the list is a cache of user
//! decisions, so write failures are logged and swallowed rather than
//! propagated into trust transitions.

use crate::storage::{StorageScope, TrustStorage};
use crate::uri::Uri;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key owning the trusted-folder list
pub const TRUSTED_FOLDERS_KEY: &str = "trustedFolders";

/// One trusted URI prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedUriEntry {
    pub uri: Uri,

    pub trusted: bool,

    /// When trust was granted; informational only, never consulted for
    /// matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_at: Option<DateTime<Utc>>,
}

impl TrustedUriEntry {
    pub fn trusted_now(uri: Uri) -> Self {
        TrustedUriEntry {
            uri,
            trusted: true,
            trusted_at: Some(Utc::now()),
        }
    }
}

/// The complete persisted trust state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustStateInfo {
    #[serde(rename = "uriTrustInfo", default)]
    pub uri_trust_info: Vec<TrustedUriEntry>,
}

/// Loads and saves `TrustStateInfo` through the storage backend
pub struct TrustStateStore {
    storage: Arc<dyn TrustStorage>,
}

impl TrustStateStore {
    pub fn new(storage: Arc<dyn TrustStorage>) -> Self {
        TrustStateStore { storage }
    }

    /// Read the persisted state. Absence and parse failures both yield the
    /// empty state; entries that somehow deserialized untrusted are dropped.
    pub fn load(&self) -> TrustStateInfo {
        let raw = match self.storage.get(TRUSTED_FOLDERS_KEY, StorageScope::Application) {
            Some(raw) => raw,
            None => return TrustStateInfo::default(),
        };

        let mut info: TrustStateInfo = match serde_json::from_str(&raw) {
            Ok(info) => info,
            Err(e) => {
                warn!("discarding corrupt trusted-folder state: {}", e);
                return TrustStateInfo::default();
            }
        };

        let before = info.uri_trust_info.len();
        info.uri_trust_info.retain(|entry| entry.trusted);
        if info.uri_trust_info.len() != before {
            debug!(
                "dropped {} untrusted entries from persisted state",
                before - info.uri_trust_info.len()
            );
        }
        info
    }

    /// Persist the state. Write failures are logged and swallowed.
    pub fn save(&self, info: &TrustStateInfo) {
        let serialized = match serde_json::to_string(info) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to serialize trusted-folder state: {}", e);
                return;
            }
        };
        if let Err(e) =
            self.storage
                .store(TRUSTED_FOLDERS_KEY, &serialized, StorageScope::Application)
        {
            warn!("failed to persist trusted-folder state: {}", e);
        }
    }
}
