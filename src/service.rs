//! Workspace trust management service
//!
//! Owns the canonical trust state: a two-state machine (restricted /
//! trusted) driven by the policy engine, the persisted trusted-folder list,
//! the per-workspace memento, and remote resolution. All mutation funnels
//! through this service; transition participants always complete before
//! subscribers observe a change.

use crate::config::TrustSettings;
use crate::error::{Result, TrustError};
use crate::events::{EventEmitter, Subscription};
use crate::policy::{self, TrustContext, UriTrustInfo};
use crate::remote::{RemoteAuthorityResolver, ResolvedAuthority};
use crate::storage::{StorageScope, TrustStorage};
use crate::store::{TrustStateInfo, TrustStateStore, TrustedUriEntry, TRUSTED_FOLDERS_KEY};
use crate::transition::TrustTransitionCoordinator;
use crate::uri::Uri;
use crate::workspace::{WorkbenchState, WorkspaceAccessor};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Storage key for the per-workspace trust memento
pub const WORKSPACE_TRUST_KEY: &str = "workspaceTrust";

/// Per-workspace persisted trust decision. Only consulted for empty
/// workspaces; the out-of-workspace-files flag applies everywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTrustMemento {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trusted: Option<bool>,

    #[serde(default)]
    pub accepts_out_of_workspace_files: bool,
}

struct ServiceState {
    initialized: bool,
    is_trusted: bool,
    trust_info: TrustStateInfo,
    memento: WorkspaceTrustMemento,
    resolved_remote: Option<ResolvedAuthority>,
    /// Workspace roots after canonicalization, refreshed on workspace change
    canonical_folders: Vec<Uri>,
    canonical_config: Option<Uri>,
}

pub struct WorkspaceTrustService {
    settings: TrustSettings,
    storage: Arc<dyn TrustStorage>,
    workspace: Arc<dyn WorkspaceAccessor>,
    resolver: Option<Arc<dyn RemoteAuthorityResolver>>,
    remote_authority: Option<String>,
    store: TrustStateStore,
    transitions: TrustTransitionCoordinator,
    state: Mutex<ServiceState>,

    /// Serializes compute -> participate -> publish so overlapping
    /// transitions (host mutations vs. storage-driven reloads) cannot
    /// publish out of order.
    transition_lock: tokio::sync::Mutex<()>,
    on_did_change_trust: EventEmitter<bool>,
    on_did_change_trusted_folders: EventEmitter<()>,
    on_did_request_startup_prompt: EventEmitter<()>,
}

impl WorkspaceTrustService {
    pub fn new(
        settings: TrustSettings,
        storage: Arc<dyn TrustStorage>,
        workspace: Arc<dyn WorkspaceAccessor>,
    ) -> Self {
        WorkspaceTrustService {
            settings,
            store: TrustStateStore::new(storage.clone()),
            storage,
            workspace,
            resolver: None,
            remote_authority: None,
            transitions: TrustTransitionCoordinator::new(),
            state: Mutex::new(ServiceState {
                initialized: false,
                is_trusted: false,
                trust_info: TrustStateInfo::default(),
                memento: WorkspaceTrustMemento::default(),
                resolved_remote: None,
                canonical_folders: Vec::new(),
                canonical_config: None,
            }),
            transition_lock: tokio::sync::Mutex::new(()),
            on_did_change_trust: EventEmitter::new(),
            on_did_change_trusted_folders: EventEmitter::new(),
            on_did_request_startup_prompt: EventEmitter::new(),
        }
    }

    /// Make this a remote workspace resolved through `resolver`
    pub fn with_remote(
        mut self,
        authority: impl Into<String>,
        resolver: Arc<dyn RemoteAuthorityResolver>,
    ) -> Self {
        self.remote_authority = Some(authority.into());
        self.resolver = Some(resolver);
        self
    }

    /// Load persisted state, resolve the remote authority (if any) and
    /// compute the baseline trust state. Fires no change events; the
    /// startup-prompt signal fires for remote workspaces whose authority
    /// did not pre-decide trust.
    pub async fn initialize(&self) -> Result<()> {
        let (folders, config) = self.resolve_canonical().await;

        let resolved = match (&self.remote_authority, &self.resolver) {
            (Some(authority), Some(resolver)) => match resolver.resolve(authority).await {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    warn!(target: "trust", "remote authority resolution failed for {}: {}", authority, e);
                    None
                }
            },
            _ => None,
        };

        let trust_info = self.store.load();
        let memento = self.load_memento();

        let (baseline, fire_startup_prompt) = {
            let mut st = self.state.lock().expect("trust state poisoned");
            st.canonical_folders = folders;
            st.canonical_config = config;
            st.resolved_remote = resolved;
            st.trust_info = trust_info;
            st.memento = memento;
            st.initialized = true;
            st.is_trusted = self.compute_trust(&st);

            let undecided_remote = self.remote_authority.is_some()
                && st
                    .resolved_remote
                    .as_ref()
                    .map_or(true, |r| r.is_trusted.is_none());
            (st.is_trusted, undecided_remote)
        };

        debug!("workspace trust initialized: trusted={}", baseline);
        if fire_startup_prompt {
            self.on_did_request_startup_prompt.fire(&());
        }
        Ok(())
    }

    pub fn is_workspace_trusted(&self) -> bool {
        self.state.lock().expect("trust state poisoned").is_trusted
    }

    pub fn is_trust_enabled(&self) -> bool {
        policy::is_trust_enabled(&self.settings)
    }

    pub fn can_modify_workspace_trust(&self) -> bool {
        let st = self.state.lock().expect("trust state poisoned");
        let ctx = TrustContext {
            settings: &self.settings,
            workbench_state: self.workspace.workbench_state(),
            folders: &st.canonical_folders,
            configuration_uri: st.canonical_config.as_ref(),
            remote_authority: self.remote_authority.as_deref(),
            resolved_remote: st.resolved_remote.as_ref(),
            memento_trusted: st.memento.is_trusted,
            entries: &st.trust_info.uri_trust_info,
        };
        policy::can_modify_trust(&ctx, st.is_trusted)
    }

    /// Match a URI against the current trusted-folder list
    pub fn uri_trust_info(&self, uri: &Uri) -> UriTrustInfo {
        let st = self.state.lock().expect("trust state poisoned");
        policy::uri_trust_info(
            &st.trust_info.uri_trust_info,
            uri,
            self.settings.case_sensitive_paths,
        )
    }

    pub fn get_trusted_folders(&self) -> Vec<Uri> {
        self.state
            .lock()
            .expect("trust state poisoned")
            .trust_info
            .uri_trust_info
            .iter()
            .map(|e| e.uri.clone())
            .collect()
    }

    pub fn accepts_out_of_workspace_files(&self) -> bool {
        self.state
            .lock()
            .expect("trust state poisoned")
            .memento
            .accepts_out_of_workspace_files
    }

    pub fn set_accepts_out_of_workspace_files(&self, accepts: bool) -> Result<()> {
        let mut st = self.state.lock().expect("trust state poisoned");
        if !st.initialized {
            return Err(TrustError::NotInitialized);
        }
        if st.memento.accepts_out_of_workspace_files != accepts {
            st.memento.accepts_out_of_workspace_files = accepts;
            self.save_memento(&st.memento);
        }
        Ok(())
    }

    /// Recompute trust (or apply an explicit value) and, on change, run the
    /// transition participants before publishing the change event. On
    /// participant failure the new value stays applied but the event is not
    /// fired and the error is returned.
    pub async fn update_trust(&self, explicit: Option<bool>) -> Result<()> {
        // A later transition must not run its participants and publish
        // before an earlier one finishes; the value is computed only after
        // the lock is held so it reflects any transition that just completed.
        let _transition = self.transition_lock.lock().await;

        let new_value = {
            let mut st = self.state.lock().expect("trust state poisoned");
            if !st.initialized {
                return Err(TrustError::NotInitialized);
            }
            let new_value = explicit.unwrap_or_else(|| self.compute_trust(&st));
            if new_value == st.is_trusted {
                return Ok(());
            }
            st.is_trusted = new_value;
            if !new_value && st.memento.accepts_out_of_workspace_files {
                st.memento.accepts_out_of_workspace_files = false;
                self.save_memento(&st.memento);
            }
            new_value
        };

        info!(
            target: "trust",
            "workspace entering {} mode",
            if new_value { "trusted" } else { "restricted" }
        );

        if let Err(e) = self.transitions.participate(new_value).await {
            e.log_if_security_relevant();
            return Err(e);
        }

        self.on_did_change_trust.fire(&new_value);
        Ok(())
    }

    /// Idempotent add/remove of trusted entries by exact-URI match.
    /// Persists and recomputes trust only when the entry set changed.
    pub async fn set_uris_trust(&self, uris: &[Uri], trusted: bool) -> Result<()> {
        let changed = {
            let mut st = self.state.lock().expect("trust state poisoned");
            if !st.initialized {
                return Err(TrustError::NotInitialized);
            }
            let case_sensitive = self.settings.case_sensitive_paths;
            let mut changed = false;
            for uri in uris {
                let pos = st
                    .trust_info
                    .uri_trust_info
                    .iter()
                    .position(|e| e.uri.is_equal(uri, case_sensitive));
                match (pos, trusted) {
                    (None, true) => {
                        info!(target: "trust", "granting trust to {}", uri);
                        st.trust_info
                            .uri_trust_info
                            .push(TrustedUriEntry::trusted_now(uri.clone()));
                        changed = true;
                    }
                    (Some(idx), false) => {
                        info!(target: "trust", "revoking trust from {}", uri);
                        st.trust_info.uri_trust_info.remove(idx);
                        changed = true;
                    }
                    _ => {}
                }
            }
            if changed {
                self.store.save(&st.trust_info);
            }
            changed
        };

        if changed {
            self.on_did_change_trusted_folders.fire(&());
            self.update_trust(None).await?;
        }
        Ok(())
    }

    /// Set trust for the whole workspace: the memento for empty workspaces,
    /// the trusted-folder list for folder/multi-root workspaces.
    pub async fn set_workspace_trust(&self, trusted: bool) -> Result<()> {
        if self.workspace.workbench_state() == WorkbenchState::Empty {
            {
                let mut st = self.state.lock().expect("trust state poisoned");
                if !st.initialized {
                    return Err(TrustError::NotInitialized);
                }
                st.memento.is_trusted = Some(trusted);
                if !trusted {
                    st.memento.accepts_out_of_workspace_files = false;
                }
                self.save_memento(&st.memento);
            }
            return self.update_trust(Some(trusted)).await;
        }

        let uris = {
            let st = self.state.lock().expect("trust state poisoned");
            if !st.initialized {
                return Err(TrustError::NotInitialized);
            }
            let mut uris = st.canonical_folders.clone();
            if let Some(config) = &st.canonical_config {
                if !config.is_transient() {
                    uris.push(config.clone());
                }
            }
            uris
        };
        self.set_uris_trust(&uris, trusted).await
    }

    /// Replace the trusted-folder list wholesale, deduplicating and keeping
    /// grant timestamps for entries that survive.
    pub async fn set_trusted_folders(&self, uris: Vec<Uri>) -> Result<()> {
        let changed = {
            let mut st = self.state.lock().expect("trust state poisoned");
            if !st.initialized {
                return Err(TrustError::NotInitialized);
            }
            let case_sensitive = self.settings.case_sensitive_paths;
            let mut new_list: Vec<TrustedUriEntry> = Vec::with_capacity(uris.len());
            for uri in &uris {
                if new_list.iter().any(|e| e.uri.is_equal(uri, case_sensitive)) {
                    continue;
                }
                let existing = st
                    .trust_info
                    .uri_trust_info
                    .iter()
                    .find(|e| e.uri.is_equal(uri, case_sensitive))
                    .cloned();
                new_list.push(existing.unwrap_or_else(|| TrustedUriEntry::trusted_now(uri.clone())));
            }

            let old = &st.trust_info.uri_trust_info;
            let changed = new_list.len() != old.len()
                || new_list
                    .iter()
                    .zip(old.iter())
                    .any(|(a, b)| !a.uri.is_equal(&b.uri, case_sensitive));
            if changed {
                st.trust_info.uri_trust_info = new_list;
                self.store.save(&st.trust_info);
            }
            changed
        };

        if changed {
            self.on_did_change_trusted_folders.fire(&());
            self.update_trust(None).await?;
        }
        Ok(())
    }

    /// React to folder or workbench-state changes reported by the host
    pub async fn handle_workspace_changed(&self) -> Result<()> {
        let (folders, config) = self.resolve_canonical().await;
        {
            let mut st = self.state.lock().expect("trust state poisoned");
            if !st.initialized {
                return Err(TrustError::NotInitialized);
            }
            st.canonical_folders = folders;
            st.canonical_config = config;
        }
        self.update_trust(None).await
    }

    /// React to a workbench-state change (a configuration file appearing or
    /// the last folder closing); same path as a folder change.
    pub async fn handle_workbench_state_changed(&self) -> Result<()> {
        self.handle_workspace_changed().await
    }

    /// React to an external (cross-process) storage change: reload the
    /// trusted-folder list, and when it actually differs re-fire the folder
    /// event and recompute trust so multiple windows converge.
    pub async fn handle_storage_external_change(&self, key: &str) -> Result<()> {
        if key != TRUSTED_FOLDERS_KEY {
            return Ok(());
        }
        let new_info = self.store.load();
        let changed = {
            let mut st = self.state.lock().expect("trust state poisoned");
            if !st.initialized || new_info == st.trust_info {
                false
            } else {
                st.trust_info = new_info;
                true
            }
        };
        if changed {
            debug!("trusted-folder state changed externally, reconciling");
            self.on_did_change_trusted_folders.fire(&());
            self.update_trust(None).await?;
        }
        Ok(())
    }

    /// Wire the storage backend's external-change event to this service.
    /// Requires a tokio runtime; the handler runs on a spawned task.
    pub fn attach_storage_listener(self: &Arc<Self>) -> Subscription<String> {
        let weak = Arc::downgrade(self);
        self.storage.on_external_change().subscribe(move |key: &String| {
            if let Some(service) = weak.upgrade() {
                let key = key.clone();
                tokio::spawn(async move {
                    if let Err(e) = service.handle_storage_external_change(&key).await {
                        warn!("failed to reconcile external storage change: {}", e);
                    }
                });
            }
        })
    }

    pub fn transitions(&self) -> &TrustTransitionCoordinator {
        &self.transitions
    }

    pub fn settings(&self) -> &TrustSettings {
        &self.settings
    }

    pub fn on_did_change_trust(&self) -> &EventEmitter<bool> {
        &self.on_did_change_trust
    }

    pub fn on_did_change_trusted_folders(&self) -> &EventEmitter<()> {
        &self.on_did_change_trusted_folders
    }

    pub fn on_did_request_startup_prompt(&self) -> &EventEmitter<()> {
        &self.on_did_request_startup_prompt
    }

    /// Release subscribers and participants at shutdown
    pub fn dispose(&self) {
        self.transitions.dispose();
        self.on_did_change_trust.dispose();
        self.on_did_change_trusted_folders.dispose();
        self.on_did_request_startup_prompt.dispose();
    }

    fn compute_trust(&self, st: &ServiceState) -> bool {
        let ctx = TrustContext {
            settings: &self.settings,
            workbench_state: self.workspace.workbench_state(),
            folders: &st.canonical_folders,
            configuration_uri: st.canonical_config.as_ref(),
            remote_authority: self.remote_authority.as_deref(),
            resolved_remote: st.resolved_remote.as_ref(),
            memento_trusted: st.memento.is_trusted,
            entries: &st.trust_info.uri_trust_info,
        };
        policy::calculate_trust(&ctx)
    }

    async fn resolve_canonical(&self) -> (Vec<Uri>, Option<Uri>) {
        let raw_folders = self.workspace.folders();
        let raw_config = self.workspace.configuration_uri();

        let resolver = match &self.resolver {
            Some(resolver) => resolver,
            None => return (raw_folders, raw_config),
        };

        let mut folders = Vec::with_capacity(raw_folders.len());
        for uri in raw_folders {
            match resolver.canonical_uri(&uri).await {
                Ok(canonical) => folders.push(canonical),
                Err(e) => {
                    warn!("canonicalization failed for {}: {}", uri, e);
                    folders.push(uri);
                }
            }
        }
        let config = match raw_config {
            Some(uri) => match resolver.canonical_uri(&uri).await {
                Ok(canonical) => Some(canonical),
                Err(e) => {
                    warn!("canonicalization failed for {}: {}", uri, e);
                    Some(uri)
                }
            },
            None => None,
        };
        (folders, config)
    }

    fn load_memento(&self) -> WorkspaceTrustMemento {
        match self.storage.get(WORKSPACE_TRUST_KEY, StorageScope::Workspace) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("discarding corrupt workspace trust memento: {}", e);
                WorkspaceTrustMemento::default()
            }),
            None => WorkspaceTrustMemento::default(),
        }
    }

    fn save_memento(&self, memento: &WorkspaceTrustMemento) {
        let serialized = match serde_json::to_string(memento) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to serialize workspace trust memento: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .storage
            .store(WORKSPACE_TRUST_KEY, &serialized, StorageScope::Workspace)
        {
            warn!("failed to persist workspace trust memento: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memento_serde_layout() {
        let memento = WorkspaceTrustMemento {
            is_trusted: Some(true),
            accepts_out_of_workspace_files: false,
        };
        let json = serde_json::to_string(&memento).unwrap();
        assert_eq!(json, r#"{"isTrusted":true,"acceptsOutOfWorkspaceFiles":false}"#);

        let unset: WorkspaceTrustMemento = serde_json::from_str("{}").unwrap();
        assert_eq!(unset, WorkspaceTrustMemento::default());
        assert_eq!(unset.is_trusted, None);
    }
}
