//! User prompting for out-of-workspace file conflicts
//!
//! The modal workspace-trust prompt itself is rendered by the host (it
//! reacts to the initiate-request event and answers through the request
//! service). The only prompt this subsystem drives directly is the
//! three-way choice for opening files outside the trusted boundary.

use crate::uri::Uri;
use async_trait::async_trait;

/// Outcome of the out-of-workspace-files flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFilesChoice {
    /// Open in the current (trusted) window
    Open,
    /// Open in a new, untrusted empty window
    OpenInNewWindow,
    /// Do not open; never persisted as a preference
    Cancel,
}

/// What the user answered, including the "remember my decision" checkbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFilesPromptResult {
    pub choice: OpenFilesChoice,
    pub remember: bool,
}

#[async_trait]
pub trait TrustPrompter: Send + Sync {
    /// Present the three-way choice for the given out-of-workspace URIs.
    /// Dismissing the dialog maps to `Cancel`, never to an error.
    async fn choose_open_files(&self, uris: &[Uri]) -> anyhow::Result<OpenFilesPromptResult>;
}
