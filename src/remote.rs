//! Remote authority resolution
//!
//! Remote workspaces (SSH, containers, tunnels) delegate the trust decision
//! to whatever resolved the remote authority. Resolution is a single async
//! lookup awaited once at startup; until it completes the workspace is
//! treated as untrusted.

use crate::uri::Uri;
use async_trait::async_trait;

/// Outcome of resolving a remote authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthority {
    pub authority: String,

    /// Explicit trust decision carried by the resolver, if any. `Some(_)`
    /// fixes the workspace trust state and makes it unmodifiable.
    pub is_trusted: Option<bool>,
}

#[async_trait]
pub trait RemoteAuthorityResolver: Send + Sync {
    async fn resolve(&self, authority: &str) -> anyhow::Result<ResolvedAuthority>;

    /// Canonical form of a URI (e.g. symlinks resolved on the remote). Used
    /// before trusted-folder matching so equivalent paths compare equal.
    async fn canonical_uri(&self, uri: &Uri) -> anyhow::Result<Uri>;
}

/// Resolver that answers from fixed values, for tests and simple hosts
pub struct StaticResolver {
    pub is_trusted: Option<bool>,
}

#[async_trait]
impl RemoteAuthorityResolver for StaticResolver {
    async fn resolve(&self, authority: &str) -> anyhow::Result<ResolvedAuthority> {
        Ok(ResolvedAuthority {
            authority: authority.to_string(),
            is_trusted: self.is_trusted,
        })
    }

    async fn canonical_uri(&self, uri: &Uri) -> anyhow::Result<Uri> {
        Ok(uri.clone())
    }
}
