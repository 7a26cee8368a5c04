//! Workspace trust management
//!
//! Decides whether a workspace may run code-executing features (extensions,
//! tasks, debug) without explicit user consent, and mediates the transition
//! between the restricted and trusted states: persisted trusted-folder
//! prefixes, async remote-authority resolution, ordered transition
//! participants, and a coalesced modal trust-request protocol.

pub mod config;
pub mod error;
pub mod events;
pub mod policy;
pub mod prompt;
pub mod remote;
pub mod request;
pub mod service;
pub mod storage;
pub mod store;
pub mod transition;
pub mod uri;
pub mod workspace;

pub use config::{HostKind, OpenFilesPreference, TrustSettings};
pub use error::{Result, TrustError};
pub use prompt::{OpenFilesChoice, OpenFilesPromptResult, TrustPrompter};
pub use request::{WorkspaceTrustRequestOptions, WorkspaceTrustRequestService};
pub use service::WorkspaceTrustService;
pub use transition::{TrustTransitionCoordinator, TrustTransitionParticipant};
pub use uri::Uri;
