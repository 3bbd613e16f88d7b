pub mod remote;
pub mod repository;

use crate::model::RepositoryName;

pub use repository::{ManagedRepository, SyncError, SyncOutcome, SyncTarget};

/// A working copy that can be brought up to date on demand.
pub trait RepoSync: Send + Sync {
    /// Name that incoming events must carry to address this repository.
    fn name(&self) -> &RepositoryName;

    /// Branch name or commit id the working copy follows.
    fn version(&self) -> &str;

    fn force_pull(&self) -> Result<SyncOutcome, SyncError>;
}
