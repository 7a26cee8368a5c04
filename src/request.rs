//! Interactive trust request protocol
//!
//! Two flows live here: the modal "do you trust this workspace" request,
//! coalesced so concurrent callers share a single user-facing prompt, and
//! the out-of-workspace-files conflict protocol with its persisted
//! non-interactive preference.

use crate::config::OpenFilesPreference;
use crate::error::Result;
use crate::events::{EventEmitter, Subscription};
use crate::prompt::{OpenFilesChoice, TrustPrompter};
use crate::service::WorkspaceTrustService;
use crate::storage::{StorageScope, TrustStorage};
use crate::uri::Uri;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Storage key for the persisted out-of-workspace-files preference
pub const UNTRUSTED_FILES_PREF_KEY: &str = "untrustedFilesPreference";

/// Options forwarded to the host UI rendering the modal trust prompt
#[derive(Debug, Clone, Default)]
pub struct WorkspaceTrustRequestOptions {
    pub message: Option<String>,
}

type SharedRequest = Shared<BoxFuture<'static, Option<bool>>>;

struct PendingRequest {
    tx: oneshot::Sender<Option<bool>>,
    shared: SharedRequest,
}

pub struct WorkspaceTrustRequestService {
    service: Arc<WorkspaceTrustService>,
    prompter: Arc<dyn TrustPrompter>,
    storage: Arc<dyn TrustStorage>,

    /// Trust boolean mirrored from the management service's change event
    cached_trusted: Arc<Mutex<bool>>,

    pending: Mutex<Option<PendingRequest>>,
    on_did_initiate_trust_request: EventEmitter<WorkspaceTrustRequestOptions>,

    _trust_subscription: Subscription<bool>,
}

impl WorkspaceTrustRequestService {
    pub fn new(
        service: Arc<WorkspaceTrustService>,
        prompter: Arc<dyn TrustPrompter>,
        storage: Arc<dyn TrustStorage>,
    ) -> Self {
        let cached_trusted = Arc::new(Mutex::new(service.is_workspace_trusted()));
        let mirror = cached_trusted.clone();
        let trust_subscription = service.on_did_change_trust().subscribe(move |trusted| {
            *mirror.lock().expect("cached trust poisoned") = *trusted;
        });

        WorkspaceTrustRequestService {
            service,
            prompter,
            storage,
            cached_trusted,
            pending: Mutex::new(None),
            on_did_initiate_trust_request: EventEmitter::new(),
            _trust_subscription: trust_subscription,
        }
    }

    /// Cached trust state, usable as a UI indicator without touching the
    /// management service.
    pub fn is_workspace_trusted(&self) -> bool {
        *self.cached_trusted.lock().expect("cached trust poisoned")
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending.lock().expect("pending request poisoned").is_some()
    }

    /// Fired when a modal request starts; the host renders the prompt and
    /// answers through `complete_request` / `cancel_request`.
    pub fn on_did_initiate_trust_request(&self) -> &EventEmitter<WorkspaceTrustRequestOptions> {
        &self.on_did_initiate_trust_request
    }

    /// Ask the user to trust the workspace. Resolves `Some(true)`
    /// immediately when already trusted; otherwise concurrent callers share
    /// one pending request and resolve with the same value. `None` means
    /// the user dismissed the prompt without deciding.
    pub async fn request_workspace_trust(
        &self,
        options: WorkspaceTrustRequestOptions,
    ) -> Option<bool> {
        if self.is_workspace_trusted() {
            return Some(true);
        }

        let (shared, initiated) = {
            let mut pending = self.pending.lock().expect("pending request poisoned");
            match pending.as_ref() {
                Some(existing) => (existing.shared.clone(), false),
                None => {
                    let (tx, rx) = oneshot::channel::<Option<bool>>();
                    let shared: SharedRequest =
                        rx.map(|result| result.unwrap_or(None)).boxed().shared();
                    *pending = Some(PendingRequest {
                        tx,
                        shared: shared.clone(),
                    });
                    (shared, true)
                }
            }
        };

        if initiated {
            debug!("initiating modal workspace trust request");
            self.on_did_initiate_trust_request.fire(&options);
        }
        shared.await
    }

    /// Resolve the pending request. `None` or a value equal to the current
    /// trust state resolves without persisting; a changed value is applied
    /// through the management service first. When applying it fails, waiters
    /// resolve `None` and the error is returned to the host. No-op when
    /// nothing is pending.
    pub async fn complete_request(&self, trusted: Option<bool>) -> Result<()> {
        let pending = match self.pending.lock().expect("pending request poisoned").take() {
            Some(pending) => pending,
            None => return Ok(()),
        };

        let current = self.is_workspace_trusted();
        let resolution = match trusted {
            Some(value) if value != current => {
                if let Err(e) = self.service.set_workspace_trust(value).await {
                    // Waiters resolve as dismissed rather than observing a
                    // dropped channel; the host gets the error.
                    let _ = pending.tx.send(None);
                    return Err(e);
                }
                Some(value)
            }
            _ => Some(current),
        };

        // The receiver side may already be gone; that just means no caller
        // is waiting anymore.
        let _ = pending.tx.send(resolution);
        Ok(())
    }

    /// Resolve the pending request as "dismissed without deciding"
    pub fn cancel_request(&self) {
        if let Some(pending) = self.pending.lock().expect("pending request poisoned").take() {
            debug!("modal workspace trust request canceled");
            let _ = pending.tx.send(None);
        }
    }

    /// Conflict resolution for opening files outside the trusted workspace
    /// boundary. Dismissed prompts map to `Cancel`, never to an error.
    pub async fn request_open_uris(&self, uris: &[Uri]) -> OpenFilesChoice {
        // Restricted windows have nothing to protect; trusted files in a
        // trusted window raise no conflict either.
        if !self.is_workspace_trusted() {
            return OpenFilesChoice::Open;
        }
        if uris.iter().all(|uri| self.service.uri_trust_info(uri).trusted) {
            return OpenFilesChoice::Open;
        }

        match self.open_files_preference() {
            OpenFilesPreference::Open => return OpenFilesChoice::Open,
            OpenFilesPreference::NewWindow => return OpenFilesChoice::OpenInNewWindow,
            OpenFilesPreference::Prompt => {}
        }

        if self.service.accepts_out_of_workspace_files() {
            return OpenFilesChoice::Open;
        }

        let result = match self.prompter.choose_open_files(uris).await {
            Ok(result) => result,
            Err(e) => {
                warn!("out-of-workspace files prompt failed: {}", e);
                return OpenFilesChoice::Cancel;
            }
        };

        if result.remember {
            match result.choice {
                OpenFilesChoice::Open => self.save_open_files_preference(OpenFilesPreference::Open),
                OpenFilesChoice::OpenInNewWindow => {
                    self.save_open_files_preference(OpenFilesPreference::NewWindow)
                }
                // Cancel is never persisted
                OpenFilesChoice::Cancel => {}
            }
        }
        result.choice
    }

    fn open_files_preference(&self) -> OpenFilesPreference {
        self.storage
            .get(UNTRUSTED_FILES_PREF_KEY, StorageScope::Application)
            .and_then(|raw| OpenFilesPreference::parse(&raw))
            .unwrap_or(self.service.settings().untrusted_files)
    }

    fn save_open_files_preference(&self, preference: OpenFilesPreference) {
        if let Err(e) = self.storage.store(
            UNTRUSTED_FILES_PREF_KEY,
            preference.as_str(),
            StorageScope::Application,
        ) {
            warn!("failed to persist untrusted-files preference: {}", e);
        }
    }

    /// Release subscribers and resolve any pending request as dismissed
    pub fn dispose(&self) {
        self.cancel_request();
        self.on_did_initiate_trust_request.dispose();
    }
}
