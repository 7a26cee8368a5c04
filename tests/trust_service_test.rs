//! Integration tests for the workspace trust management service

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use workspace_trust::remote::StaticResolver;
use workspace_trust::service::WorkspaceTrustService;
use workspace_trust::storage::{MemoryStorage, StorageScope, TrustStorage};
use workspace_trust::store::TRUSTED_FOLDERS_KEY;
use workspace_trust::transition::TrustTransitionParticipant;
use workspace_trust::workspace::StaticWorkspace;
use workspace_trust::{TrustError, TrustSettings, Uri};

mod common;

fn service_for(workspace: StaticWorkspace) -> (Arc<WorkspaceTrustService>, Arc<MemoryStorage>) {
    common::init_test_logging();
    let storage = Arc::new(MemoryStorage::new());
    let service = Arc::new(WorkspaceTrustService::new(
        TrustSettings::default(),
        storage.clone(),
        Arc::new(workspace),
    ));
    (service, storage)
}

fn seed_trusted_folders(storage: &MemoryStorage, paths: &[&str]) {
    let entries: Vec<String> = paths
        .iter()
        .map(|p| {
            format!(
                r#"{{"uri":{{"scheme":"file","authority":"","path":"{p}"}},"trusted":true}}"#
            )
        })
        .collect();
    let raw = format!(r#"{{"uriTrustInfo":[{}]}}"#, entries.join(","));
    storage
        .store(TRUSTED_FOLDERS_KEY, &raw, StorageScope::Application)
        .unwrap();
}

struct Recorder {
    label: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
    fail: bool,
}

#[async_trait]
impl TrustTransitionParticipant for Recorder {
    async fn on_trust_change(&self, _trusted: bool) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(self.label);
        if self.fail {
            anyhow::bail!("{} refused", self.label);
        }
        Ok(())
    }
}

/// Participant that stalls grant transitions, leaving a window for a
/// revocation to overtake them.
struct SlowGrant;

#[async_trait]
impl TrustTransitionParticipant for SlowGrant {
    async fn on_trust_change(&self, trusted: bool) -> anyhow::Result<()> {
        if trusted {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_overlapping_transitions_publish_in_order() -> Result<()> {
    let (service, _) = service_for(StaticWorkspace::empty());
    service.initialize().await?;
    let _h = service.transitions().register(Arc::new(SlowGrant));

    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    let _sub = service
        .on_did_change_trust()
        .subscribe(move |trusted| e.lock().unwrap().push(*trusted));

    let s1 = service.clone();
    let grant = tokio::spawn(async move { s1.set_workspace_trust(true).await });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let s2 = service.clone();
    let revoke = tokio::spawn(async move { s2.set_workspace_trust(false).await });

    grant.await??;
    revoke.await??;

    // The revocation overlapped the stalled grant yet must observe it and
    // publish after it; the last published event agrees with the canonical
    // state.
    let events = events.lock().unwrap().clone();
    assert_eq!(events, vec![true, false]);
    assert_eq!(events.last().copied(), Some(service.is_workspace_trusted()));
    Ok(())
}

#[tokio::test]
async fn test_mutation_before_initialize_is_a_contract_violation() {
    let (service, _) = service_for(StaticWorkspace::empty());
    let err = service.set_workspace_trust(true).await.unwrap_err();
    assert!(matches!(err, TrustError::NotInitialized));
}

#[tokio::test]
async fn test_empty_workspace_defaults_untrusted_then_grants() -> Result<()> {
    let (service, storage) = service_for(StaticWorkspace::empty());
    service.initialize().await?;
    assert!(!service.is_workspace_trusted());

    let fired = Arc::new(Mutex::new(Vec::new()));
    let f = fired.clone();
    let _sub = service
        .on_did_change_trust()
        .subscribe(move |trusted| f.lock().unwrap().push(*trusted));

    service.set_workspace_trust(true).await?;
    assert!(service.is_workspace_trusted());
    assert_eq!(*fired.lock().unwrap(), vec![true]);

    // The decision is persisted in the workspace-scoped memento
    let raw = storage
        .get("workspaceTrust", StorageScope::Workspace)
        .expect("memento persisted");
    assert!(raw.contains(r#""isTrusted":true"#));
    Ok(())
}

#[tokio::test]
async fn test_initialize_fires_no_change_events() -> Result<()> {
    let workspace = StaticWorkspace::single_folder(Uri::file("/proj"));
    let (service, storage) = service_for(workspace);
    seed_trusted_folders(&storage, &["/proj"]);

    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    let _sub = service.on_did_change_trust().subscribe(move |_| {
        f.fetch_add(1, Ordering::SeqCst);
    });

    service.initialize().await?;
    assert!(service.is_workspace_trusted());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_single_folder_trusted_via_persisted_list() -> Result<()> {
    let workspace = StaticWorkspace::single_folder(Uri::file("/proj"));
    let (service, storage) = service_for(workspace);
    seed_trusted_folders(&storage, &["/proj"]);

    service.initialize().await?;
    assert!(service.is_workspace_trusted());
    assert_eq!(service.get_trusted_folders(), vec![Uri::file("/proj")]);
    Ok(())
}

#[tokio::test]
async fn test_set_uris_trust_is_idempotent() -> Result<()> {
    let (service, storage) = service_for(StaticWorkspace::single_folder(Uri::file("/proj")));
    service.initialize().await?;

    service.set_uris_trust(&[Uri::file("/proj")], true).await?;
    let raw_once = storage
        .get(TRUSTED_FOLDERS_KEY, StorageScope::Application)
        .unwrap();

    service.set_uris_trust(&[Uri::file("/proj")], true).await?;
    let raw_twice = storage
        .get(TRUSTED_FOLDERS_KEY, StorageScope::Application)
        .unwrap();

    assert_eq!(raw_once, raw_twice);
    assert_eq!(service.get_trusted_folders(), vec![Uri::file("/proj")]);
    Ok(())
}

#[tokio::test]
async fn test_revoking_folder_trust_enters_restricted_mode() -> Result<()> {
    let workspace = StaticWorkspace::single_folder(Uri::file("/proj"));
    let (service, storage) = service_for(workspace);
    seed_trusted_folders(&storage, &["/proj"]);
    service.initialize().await?;
    assert!(service.is_workspace_trusted());

    service.set_workspace_trust(false).await?;
    assert!(!service.is_workspace_trusted());
    assert!(service.get_trusted_folders().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_untrusting_resets_accepts_out_of_workspace_files() -> Result<()> {
    let (service, _) = service_for(StaticWorkspace::empty());
    service.initialize().await?;

    service.set_workspace_trust(true).await?;
    service.set_accepts_out_of_workspace_files(true)?;
    assert!(service.accepts_out_of_workspace_files());

    service.set_workspace_trust(false).await?;
    assert!(!service.accepts_out_of_workspace_files());
    Ok(())
}

#[tokio::test]
async fn test_failing_participant_aborts_transition_and_event() -> Result<()> {
    let (service, _) = service_for(StaticWorkspace::empty());
    service.initialize().await?;

    let log = Arc::new(Mutex::new(Vec::new()));
    let _h1 = service.transitions().register(Arc::new(Recorder {
        label: "failing",
        log: log.clone(),
        fail: true,
    }));
    let _h2 = service.transitions().register(Arc::new(Recorder {
        label: "second",
        log: log.clone(),
        fail: false,
    }));

    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    let _sub = service.on_did_change_trust().subscribe(move |_| {
        f.fetch_add(1, Ordering::SeqCst);
    });

    let err = service.set_workspace_trust(true).await.unwrap_err();
    assert!(matches!(err, TrustError::TransitionFailed(_)));
    assert_eq!(*log.lock().unwrap(), vec!["failing"]);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_participants_complete_before_subscribers_observe() -> Result<()> {
    let (service, _) = service_for(StaticWorkspace::empty());
    service.initialize().await?;

    let log = Arc::new(Mutex::new(Vec::new()));
    let _h = service.transitions().register(Arc::new(Recorder {
        label: "participant",
        log: log.clone(),
        fail: false,
    }));
    let l = log.clone();
    let _sub = service.on_did_change_trust().subscribe(move |_| {
        l.lock().unwrap().push("subscriber");
    });

    service.set_workspace_trust(true).await?;
    assert_eq!(*log.lock().unwrap(), vec!["participant", "subscriber"]);
    Ok(())
}

#[tokio::test]
async fn test_external_storage_change_reconciles_and_dedupes() -> Result<()> {
    let workspace = StaticWorkspace::single_folder(Uri::file("/proj"));
    let (service, storage) = service_for(workspace);
    service.initialize().await?;
    assert!(!service.is_workspace_trusted());

    let folder_events = Arc::new(AtomicUsize::new(0));
    let fe = folder_events.clone();
    let _sub = service.on_did_change_trusted_folders().subscribe(move |_| {
        fe.fetch_add(1, Ordering::SeqCst);
    });

    // Another window grants trust to /proj
    seed_trusted_folders(&storage, &["/proj"]);
    service
        .handle_storage_external_change(TRUSTED_FOLDERS_KEY)
        .await?;
    assert!(service.is_workspace_trusted());
    assert_eq!(folder_events.load(Ordering::SeqCst), 1);

    // Identical content arrives again: deep equality suppresses re-firing
    service
        .handle_storage_external_change(TRUSTED_FOLDERS_KEY)
        .await?;
    assert_eq!(folder_events.load(Ordering::SeqCst), 1);

    // Unrelated keys are ignored entirely
    service.handle_storage_external_change("otherKey").await?;
    assert_eq!(folder_events.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_attached_storage_listener_drives_reconciliation() -> Result<()> {
    let workspace = StaticWorkspace::single_folder(Uri::file("/proj"));
    let (service, storage) = service_for(workspace);
    service.initialize().await?;
    let _listener = service.attach_storage_listener();

    let raw = r#"{"uriTrustInfo":[{"uri":{"scheme":"file","authority":"","path":"/proj"},"trusted":true}]}"#;
    storage.apply_external(TRUSTED_FOLDERS_KEY, raw, StorageScope::Application);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(service.is_workspace_trusted());
    Ok(())
}

#[tokio::test]
async fn test_workspace_folder_change_recomputes_trust() -> Result<()> {
    let workspace = Arc::new(StaticWorkspace::single_folder(Uri::file("/proj")));
    let storage = Arc::new(MemoryStorage::new());
    seed_trusted_folders(&storage, &["/proj"]);
    let service = Arc::new(WorkspaceTrustService::new(
        TrustSettings::default(),
        storage.clone(),
        workspace.clone(),
    ));
    service.initialize().await?;
    assert!(service.is_workspace_trusted());

    // An untrusted folder joins the workspace
    workspace.set_folders(vec![Uri::file("/proj"), Uri::file("/other")]);
    service.handle_workspace_changed().await?;
    assert!(!service.is_workspace_trusted());
    Ok(())
}

#[tokio::test]
async fn test_workbench_state_change_recomputes_trust() -> Result<()> {
    let workspace = Arc::new(StaticWorkspace::single_folder(Uri::file("/proj")));
    let storage = Arc::new(MemoryStorage::new());
    seed_trusted_folders(&storage, &["/proj"]);
    let service = Arc::new(WorkspaceTrustService::new(
        TrustSettings::default(),
        storage.clone(),
        workspace.clone(),
    ));
    service.initialize().await?;
    assert!(service.is_workspace_trusted());

    // The folder becomes part of a multi-root workspace whose configuration
    // file is not trusted
    workspace.set_configuration_uri(Some(Uri::file("/other/app.code-workspace")));
    service.handle_workbench_state_changed().await?;
    assert!(!service.is_workspace_trusted());
    Ok(())
}

#[tokio::test]
async fn test_set_trusted_folders_replaces_list() -> Result<()> {
    let (service, _) = service_for(StaticWorkspace::single_folder(Uri::file("/b")));
    service.initialize().await?;
    service
        .set_uris_trust(&[Uri::file("/a"), Uri::file("/b")], true)
        .await?;

    service
        .set_trusted_folders(vec![Uri::file("/b"), Uri::file("/b"), Uri::file("/c")])
        .await?;
    assert_eq!(
        service.get_trusted_folders(),
        vec![Uri::file("/b"), Uri::file("/c")]
    );
    assert!(service.is_workspace_trusted());
    Ok(())
}

#[tokio::test]
async fn test_remote_workspace_follows_resolver_decision() -> Result<()> {
    let workspace = StaticWorkspace::single_folder(Uri::remote("vscode-remote", "ssh-host", "/work"));
    let storage = Arc::new(MemoryStorage::new());
    let service = Arc::new(
        WorkspaceTrustService::new(TrustSettings::default(), storage.clone(), Arc::new(workspace))
            .with_remote(
                "ssh-host",
                Arc::new(StaticResolver {
                    is_trusted: Some(true),
                }),
            ),
    );

    let prompts = Arc::new(AtomicUsize::new(0));
    let p = prompts.clone();
    let _sub = service.on_did_request_startup_prompt().subscribe(move |_| {
        p.fetch_add(1, Ordering::SeqCst);
    });

    service.initialize().await?;
    assert!(service.is_workspace_trusted());
    // Authority pre-decided trust: no first-run prompt, not modifiable
    assert_eq!(prompts.load(Ordering::SeqCst), 0);
    assert!(!service.can_modify_workspace_trust());
    Ok(())
}

#[tokio::test]
async fn test_remote_workspace_without_decision_prompts_at_startup() -> Result<()> {
    let workspace = StaticWorkspace::single_folder(Uri::remote("vscode-remote", "ssh-host", "/work"));
    let storage = Arc::new(MemoryStorage::new());
    let service = Arc::new(
        WorkspaceTrustService::new(TrustSettings::default(), storage.clone(), Arc::new(workspace))
            .with_remote("ssh-host", Arc::new(StaticResolver { is_trusted: None })),
    );

    let prompts = Arc::new(AtomicUsize::new(0));
    let p = prompts.clone();
    let _sub = service.on_did_request_startup_prompt().subscribe(move |_| {
        p.fetch_add(1, Ordering::SeqCst);
    });

    service.initialize().await?;
    assert!(!service.is_workspace_trusted());
    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    Ok(())
}
