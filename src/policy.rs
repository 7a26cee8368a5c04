//! Trust decision logic
//!
//! Pure functions, no I/O: given settings, workspace shape, the persisted
//! trusted-URI list and remote resolution state, compute whether the
//! workspace is trusted and whether trust can currently be modified.

use crate::config::{HostKind, TrustSettings};
use crate::remote::ResolvedAuthority;
use crate::store::TrustedUriEntry;
use crate::uri::Uri;
use crate::workspace::WorkbenchState;

/// Result of matching a URI against the trusted-folder list
#[derive(Debug, Clone, PartialEq)]
pub struct UriTrustInfo {
    pub trusted: bool,

    /// The entry URI that matched, or the input URI when nothing matched
    pub uri: Uri,
}

/// Whether the trust feature is active at all. Browser hosts never execute
/// local code, so trust is forced off there; otherwise the user value takes
/// precedence over the default.
pub fn is_trust_enabled(settings: &TrustSettings) -> bool {
    if settings.host == HostKind::Browser {
        return false;
    }
    settings.enabled.unwrap_or(settings.default_enabled)
}

/// Find the trusted entry covering `uri`: ancestor-or-equal match, longest
/// path wins. No match yields untrusted with the input URI echoed back.
pub fn uri_trust_info(entries: &[TrustedUriEntry], uri: &Uri, case_sensitive: bool) -> UriTrustInfo {
    let mut best: Option<&TrustedUriEntry> = None;
    for entry in entries {
        if !entry.uri.is_equal_or_parent(uri, case_sensitive) {
            continue;
        }
        match best {
            Some(b) if entry.uri.path.len() <= b.uri.path.len() => {}
            _ => best = Some(entry),
        }
    }
    match best {
        Some(entry) => UriTrustInfo {
            trusted: entry.trusted,
            uri: entry.uri.clone(),
        },
        None => UriTrustInfo {
            trusted: false,
            uri: uri.clone(),
        },
    }
}

/// Everything the decision functions need, snapshotted by the service
#[derive(Debug)]
pub struct TrustContext<'a> {
    pub settings: &'a TrustSettings,
    pub workbench_state: WorkbenchState,

    /// Canonicalized workspace root URIs
    pub folders: &'a [Uri],

    /// Workspace configuration file, for multi-root workspaces
    pub configuration_uri: Option<&'a Uri>,

    /// `Some` when this is a remote workspace
    pub remote_authority: Option<&'a str>,

    /// `None` while remote resolution is pending or failed
    pub resolved_remote: Option<&'a ResolvedAuthority>,

    /// Persisted per-workspace trust decision (empty workspaces only)
    pub memento_trusted: Option<bool>,

    pub entries: &'a [TrustedUriEntry],
}

/// The trust decision table; evaluated strictly in order, first match wins.
pub fn calculate_trust(ctx: &TrustContext) -> bool {
    // 1. Feature disabled: trust is meaningless, everything is trusted
    if !is_trust_enabled(ctx.settings) {
        return true;
    }

    // 2. Automated extension test hosts run pre-vetted code
    if ctx.settings.extension_test_host {
        return true;
    }

    // 3. Remote workspaces follow the resolver; pending means untrusted
    if ctx.remote_authority.is_some() {
        return ctx
            .resolved_remote
            .and_then(|r| r.is_trusted)
            .unwrap_or(false);
    }

    // 4. Empty workspaces fall back to the persisted memento
    if ctx.workbench_state == WorkbenchState::Empty {
        return ctx.memento_trusted.unwrap_or(false);
    }

    // 5. Folder / multi-root: every root (and the workspace config file,
    // unless transient) must independently resolve trusted
    let case_sensitive = ctx.settings.case_sensitive_paths;
    let folders_trusted = ctx
        .folders
        .iter()
        .all(|uri| uri_trust_info(ctx.entries, uri, case_sensitive).trusted);
    if !folders_trusted {
        return false;
    }
    match ctx.configuration_uri {
        Some(cfg) if !cfg.is_transient() => {
            uri_trust_info(ctx.entries, cfg, case_sensitive).trusted
        }
        _ => true,
    }
}

/// Whether the user may currently change the workspace trust state.
///
/// Once a single-folder workspace is trusted transitively through a trusted
/// ancestor entry, re-granting it independently is refused: the redundant
/// child entry would be meaningless and would survive a parent revocation.
pub fn can_modify_trust(ctx: &TrustContext, currently_trusted: bool) -> bool {
    if ctx.remote_authority.is_some() {
        match ctx.resolved_remote {
            // Unresolved: the decision is not ours to make yet
            None => return false,
            // The resolver fixed trust explicitly
            Some(resolved) if resolved.is_trusted.is_some() => return false,
            Some(_) => {}
        }
    }

    if ctx.workbench_state == WorkbenchState::Empty {
        return true;
    }

    if !currently_trusted {
        return true;
    }

    let single_local_folder = ctx.workbench_state == WorkbenchState::Folder
        && ctx.folders.len() == 1
        && ctx.folders[0].is_local();
    if !single_local_folder {
        return false;
    }

    let folder = &ctx.folders[0];
    let case_sensitive = ctx.settings.case_sensitive_paths;
    let info = uri_trust_info(ctx.entries, folder, case_sensitive);
    let matched_own_entry = info.trusted && info.uri.is_equal(folder, case_sensitive);
    let parent_trusted = folder
        .parent()
        .map(|parent| uri_trust_info(ctx.entries, &parent, case_sensitive).trusted)
        .unwrap_or(false);

    matched_own_entry && !parent_trusted
}
