//! Workspace shape accessor
//!
//! The trust service never enumerates folders itself; the host supplies the
//! current workspace shape through this trait.

use crate::uri::Uri;
use std::sync::Mutex;

/// Kind of workbench the user has open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbenchState {
    /// No folders open
    Empty,
    /// A single root folder
    Folder,
    /// A multi-root workspace backed by a configuration file
    Workspace,
}

pub trait WorkspaceAccessor: Send + Sync {
    fn workbench_state(&self) -> WorkbenchState;

    /// Current root folder URIs, in workspace order
    fn folders(&self) -> Vec<Uri>;

    /// URI of the workspace configuration file, for multi-root workspaces
    fn configuration_uri(&self) -> Option<Uri>;
}

/// A workspace accessor backed by plain fields, mutable so hosts and tests
/// can simulate folder changes.
pub struct StaticWorkspace {
    inner: Mutex<WorkspaceShape>,
}

struct WorkspaceShape {
    folders: Vec<Uri>,
    configuration_uri: Option<Uri>,
}

impl StaticWorkspace {
    pub fn empty() -> Self {
        StaticWorkspace {
            inner: Mutex::new(WorkspaceShape {
                folders: Vec::new(),
                configuration_uri: None,
            }),
        }
    }

    pub fn single_folder(folder: Uri) -> Self {
        StaticWorkspace {
            inner: Mutex::new(WorkspaceShape {
                folders: vec![folder],
                configuration_uri: None,
            }),
        }
    }

    pub fn multi_root(configuration_uri: Uri, folders: Vec<Uri>) -> Self {
        StaticWorkspace {
            inner: Mutex::new(WorkspaceShape {
                folders,
                configuration_uri: Some(configuration_uri),
            }),
        }
    }

    pub fn set_folders(&self, folders: Vec<Uri>) {
        self.inner.lock().expect("workspace shape poisoned").folders = folders;
    }

    pub fn set_configuration_uri(&self, uri: Option<Uri>) {
        self.inner
            .lock()
            .expect("workspace shape poisoned")
            .configuration_uri = uri;
    }
}

impl WorkspaceAccessor for StaticWorkspace {
    fn workbench_state(&self) -> WorkbenchState {
        let inner = self.inner.lock().expect("workspace shape poisoned");
        if inner.configuration_uri.is_some() {
            WorkbenchState::Workspace
        } else if inner.folders.is_empty() {
            WorkbenchState::Empty
        } else {
            WorkbenchState::Folder
        }
    }

    fn folders(&self) -> Vec<Uri> {
        self.inner
            .lock()
            .expect("workspace shape poisoned")
            .folders
            .clone()
    }

    fn configuration_uri(&self) -> Option<Uri> {
        self.inner
            .lock()
            .expect("workspace shape poisoned")
            .configuration_uri
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workbench_state_follows_shape() {
        let ws = StaticWorkspace::empty();
        assert_eq!(ws.workbench_state(), WorkbenchState::Empty);

        ws.set_folders(vec![Uri::file("/proj")]);
        assert_eq!(ws.workbench_state(), WorkbenchState::Folder);

        ws.set_configuration_uri(Some(Uri::file("/proj/app.code-workspace")));
        assert_eq!(ws.workbench_state(), WorkbenchState::Workspace);
    }
}
