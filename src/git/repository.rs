use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use git2::{
    build::CheckoutBuilder, BranchType, ErrorCode, Object, Oid, Repository, ResetType,
};
use log::{debug, trace, warn};
use thiserror::Error;

use crate::{
    flock::FileLock,
    git::{remote::RemoteAuth, RepoSync},
    model::{ParseError, RepositoryName},
};

const ORIGIN: &str = "origin";
const LOCK_FILE: &str = "hooksync.lock";
const LOCK_WAIT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Version {version} is neither a branch of origin nor a known commit")]
    UnresolvedVersion { version: String },
    #[error("Invalid repository url: {0}")]
    Url(#[from] ParseError),
    #[error("Working copy cannot be locked: {0}")]
    Lock(#[from] crate::flock::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// What the working copy follows, fixed once the version has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    /// Full name of the remote tracking reference, e.g. `refs/remotes/origin/main`.
    Branch { remote_ref: String },
    PinnedCommit(Oid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub before: Oid,
    pub after: Oid,
}

impl SyncOutcome {
    pub fn advanced(&self) -> bool {
        self.before != self.after
    }
}

/// A local working copy kept in sync with one branch or commit of a remote.
///
/// Construction fetches `origin`, resolves `version` and checks it out; a
/// failure at any of these steps is fatal. Afterwards [`force_pull`] can be
/// called any number of times; calls are serialized.
///
/// [`force_pull`]: ManagedRepository::force_pull
pub struct ManagedRepository {
    version: String,
    name: RepositoryName,
    target: SyncTarget,
    git_repo: Mutex<Repository>,
    _lock: FileLock,
}

impl ManagedRepository {
    pub fn new(url: &str, version: &str, path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let name = RepositoryName::from_url(url)?;

        let git_repo = open_or_init(&path)?;
        let lock = FileLock::new(&git_repo.path().join(LOCK_FILE), LOCK_WAIT)?;
        std::fs::write(git_repo.path().join("description"), format!("{name}\n"))?;

        ensure_origin(&git_repo, url)?;
        debug!("Fetching from: {}", url);
        fetch_origin(&git_repo)?;

        let target = resolve_version(&git_repo, version)?;
        match &target {
            SyncTarget::Branch { remote_ref } => checkout_branch(&git_repo, version, remote_ref)?,
            SyncTarget::PinnedCommit(oid) => checkout_commit(&git_repo, *oid)?,
        }

        Ok(Self {
            version: version.to_owned(),
            name,
            target,
            git_repo: Mutex::new(git_repo),
            _lock: lock,
        })
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Commit currently checked out.
    pub fn commit(&self) -> Result<Oid, SyncError> {
        let git_repo = self.git_repo.lock().unwrap_or_else(PoisonError::into_inner);
        head_commit(&git_repo)
    }

    /// Fetches `origin` and hard-resets the working copy to the sync target.
    ///
    /// For a pinned commit the reset target never moves, so the returned
    /// commits are always equal.
    pub fn force_pull(&self) -> Result<SyncOutcome, SyncError> {
        let git_repo = self.git_repo.lock().unwrap_or_else(PoisonError::into_inner);

        let before = head_commit(&git_repo)?;
        fetch_origin(&git_repo)?;

        let target = match &self.target {
            SyncTarget::Branch { remote_ref } => {
                git_repo.find_reference(remote_ref)?.peel_to_commit()?
            }
            SyncTarget::PinnedCommit(oid) => git_repo.find_commit(*oid)?,
        };
        hard_reset(&git_repo, target.as_object())?;

        let after = head_commit(&git_repo)?;
        Ok(SyncOutcome { before, after })
    }
}

impl RepoSync for ManagedRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn force_pull(&self) -> Result<SyncOutcome, SyncError> {
        ManagedRepository::force_pull(self)
    }
}

fn open_or_init(path: &Path) -> Result<Repository, SyncError> {
    match Repository::open(path) {
        Ok(repo) => {
            trace!("Opening existing repository at {}", path.display());
            Ok(repo)
        }
        Err(error) if error.code() == ErrorCode::NotFound => {
            trace!("Creating a new repository at {}", path.display());
            std::fs::create_dir_all(path)?;
            Ok(Repository::init(path)?)
        }
        Err(error) => Err(error.into()),
    }
}

fn ensure_origin(repo: &Repository, url: &str) -> Result<(), SyncError> {
    match repo.find_remote(ORIGIN) {
        Ok(remote) => {
            if remote.url() != Some(url) {
                trace!(
                    "Updating remote existing url {:?} to new url {}",
                    remote.url(),
                    url
                );
                repo.remote_set_url(ORIGIN, url)?;
            }
        }
        Err(error) if error.code() == ErrorCode::NotFound => {
            trace!("Adding remote {} at {}", ORIGIN, url);
            repo.remote(ORIGIN, url)?;
        }
        Err(error) => return Err(error.into()),
    }
    Ok(())
}

fn fetch_origin(repo: &Repository) -> Result<(), SyncError> {
    let mut remote = repo.find_remote(ORIGIN)?;
    let auth = RemoteAuth::new(repo.config()?);
    remote.fetch(&[] as &[&str], Some(&mut auth.fetch_options()), None)?;
    Ok(())
}

/// Branches of `origin` take precedence over commit ids, so a branch whose
/// name happens to be a hex prefix is still followed as a branch.
fn resolve_version(repo: &Repository, version: &str) -> Result<SyncTarget, SyncError> {
    match repo.find_branch(&format!("{ORIGIN}/{version}"), BranchType::Remote) {
        Ok(branch) => {
            if let Some(remote_ref) = branch.get().name() {
                debug!("Resolved {} to remote branch {}", version, remote_ref);
                return Ok(SyncTarget::Branch {
                    remote_ref: remote_ref.to_owned(),
                });
            }
        }
        Err(error) if matches!(error.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {}
        Err(error) => return Err(error.into()),
    }

    if looks_like_commit(version) {
        match repo
            .revparse_single(version)
            .and_then(|object| object.peel_to_commit())
        {
            Ok(commit) => {
                debug!("Resolved {} to commit {}", version, commit.id());
                return Ok(SyncTarget::PinnedCommit(commit.id()));
            }
            Err(error)
                if matches!(
                    error.code(),
                    ErrorCode::NotFound
                        | ErrorCode::Ambiguous
                        | ErrorCode::InvalidSpec
                        | ErrorCode::Peel
                ) => {}
            Err(error) => return Err(error.into()),
        }
    }

    Err(SyncError::UnresolvedVersion {
        version: version.to_owned(),
    })
}

fn looks_like_commit(version: &str) -> bool {
    (4..=64).contains(&version.len()) && version.chars().all(|c| c.is_ascii_hexdigit())
}

fn checkout_branch(repo: &Repository, branch: &str, remote_ref: &str) -> Result<(), SyncError> {
    let remote_commit = repo.find_reference(remote_ref)?.peel_to_commit()?;

    let mut local = match repo.find_branch(branch, BranchType::Local) {
        Ok(local) => local,
        Err(error) if error.code() == ErrorCode::NotFound => {
            debug!("Creating branch {} at {}", branch, remote_commit.id());
            repo.branch(branch, &remote_commit, false)?
        }
        Err(error) => return Err(error.into()),
    };

    let local_ref = format!("refs/heads/{branch}");
    if head_reference_name(repo)?.as_deref() != Some(local_ref.as_str()) {
        debug!("Switching HEAD to {}", local_ref);
        repo.set_head(&local_ref)?;
    }

    let upstream = local
        .upstream()
        .ok()
        .and_then(|upstream| upstream.get().name().map(str::to_owned));
    if upstream.as_deref() != Some(remote_ref) {
        debug!("Setting tracking branch of {} to {}", branch, remote_ref);
        local.set_upstream(Some(&format!("{ORIGIN}/{branch}")))?;
    }

    debug!("Checking out {} at {}", branch, remote_commit.id());
    hard_reset(repo, remote_commit.as_object())
}

fn checkout_commit(repo: &Repository, oid: Oid) -> Result<(), SyncError> {
    warn!(
        "Pinned to commit {}, HEAD is detached and no tracking branch is set",
        oid
    );
    let commit = repo.find_commit(oid)?;

    // The previously checked out branch must not keep tracking origin.
    if let Some(previous) = head_reference_name(repo)? {
        if let Some(branch) = previous.strip_prefix("refs/heads/") {
            if let Ok(mut local) = repo.find_branch(branch, BranchType::Local) {
                if local.upstream().is_ok() {
                    debug!("Removing tracking branch of {}", branch);
                    local.set_upstream(None)?;
                }
            }
        }
    }

    repo.set_head_detached(oid)?;
    hard_reset(repo, commit.as_object())
}

fn hard_reset(repo: &Repository, target: &Object<'_>) -> Result<(), SyncError> {
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.reset(target, ResetType::Hard, Some(&mut checkout))?;
    Ok(())
}

/// Symbolic target of HEAD, `None` when detached.
fn head_reference_name(repo: &Repository) -> Result<Option<String>, SyncError> {
    let head = repo.find_reference("HEAD")?;
    Ok(head.symbolic_target().map(str::to_owned))
}

fn head_commit(repo: &Repository) -> Result<Oid, SyncError> {
    Ok(repo.head()?.peel_to_commit()?.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    use git2::{Commit, Signature};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        remote: Repository,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let remote = Repository::init(dir.path().join("remote")).unwrap();
            Self { dir, remote }
        }

        fn url(&self) -> String {
            self.dir.path().join("remote").to_str().unwrap().to_owned()
        }

        fn local_path(&self) -> PathBuf {
            self.dir.path().join("local")
        }

        fn commit(&self, branch: &str, file: &str, contents: &str) -> Oid {
            let workdir = self.remote.workdir().unwrap();
            std::fs::write(workdir.join(file), contents).unwrap();

            let mut index = self.remote.index().unwrap();
            index.add_path(Path::new(file)).unwrap();
            index.write().unwrap();
            let tree = self.remote.find_tree(index.write_tree().unwrap()).unwrap();

            let refname = format!("refs/heads/{branch}");
            let parent = self
                .remote
                .find_reference(&refname)
                .and_then(|reference| reference.peel_to_commit())
                .ok();
            let parents: Vec<&Commit> = parent.iter().collect();

            let signature = Signature::now("Sync Test", "sync@example.com").unwrap();
            self.remote
                .commit(
                    Some(&refname),
                    &signature,
                    &signature,
                    &format!("update {file}"),
                    &tree,
                    &parents,
                )
                .unwrap()
        }

        fn open_local(&self) -> Repository {
            Repository::open(self.local_path()).unwrap()
        }

        fn read_local(&self, file: &str) -> String {
            std::fs::read_to_string(self.local_path().join(file)).unwrap()
        }
    }

    #[test]
    fn checkout_tracks_remote_branch() {
        let fixture = Fixture::new();
        let tip = fixture.commit("main", "README", "first");

        let managed = ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap();

        assert_eq!(
            managed.target(),
            &SyncTarget::Branch {
                remote_ref: "refs/remotes/origin/main".to_owned()
            }
        );
        assert_eq!(managed.commit().unwrap(), tip);

        let local = fixture.open_local();
        assert_eq!(
            local.find_reference("HEAD").unwrap().symbolic_target(),
            Some("refs/heads/main")
        );
        let branch = local.find_branch("main", BranchType::Local).unwrap();
        assert_eq!(
            branch.upstream().unwrap().get().name(),
            Some("refs/remotes/origin/main")
        );
        assert_eq!(fixture.read_local("README"), "first");
    }

    #[test]
    fn description_is_derived_name() {
        let fixture = Fixture::new();
        fixture.commit("main", "README", "first");

        let managed = ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap();

        let description =
            std::fs::read_to_string(fixture.local_path().join(".git/description")).unwrap();
        assert_eq!(description.trim(), managed.name().value);
    }

    #[test]
    fn force_pull_advances_and_discards_local_changes() {
        let fixture = Fixture::new();
        let first = fixture.commit("main", "README", "first");
        let managed = ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap();

        std::fs::write(fixture.local_path().join("README"), "local edit").unwrap();
        let second = fixture.commit("main", "README", "second");

        let outcome = managed.force_pull().unwrap();

        assert_eq!(
            outcome,
            SyncOutcome {
                before: first,
                after: second
            }
        );
        assert!(outcome.advanced());
        assert_eq!(fixture.read_local("README"), "second");
        assert!(fixture.open_local().statuses(None).unwrap().is_empty());
    }

    #[test]
    fn force_pull_without_remote_changes_is_stable() {
        let fixture = Fixture::new();
        let tip = fixture.commit("main", "README", "first");
        let managed = ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap();

        let outcome = managed.force_pull().unwrap();

        assert_eq!(
            outcome,
            SyncOutcome {
                before: tip,
                after: tip
            }
        );
        assert!(!outcome.advanced());
    }

    #[test]
    fn pinned_commit_never_advances() {
        let fixture = Fixture::new();
        let pinned = fixture.commit("main", "README", "first");
        let managed =
            ManagedRepository::new(&fixture.url(), &pinned.to_string(), fixture.local_path())
                .unwrap();

        assert_eq!(managed.target(), &SyncTarget::PinnedCommit(pinned));
        assert!(fixture.open_local().head_detached().unwrap());

        for round in 0..3 {
            fixture.commit("main", "README", &format!("newer {round}"));
            let outcome = managed.force_pull().unwrap();
            assert_eq!(outcome.after, pinned);
        }
        assert_eq!(fixture.read_local("README"), "first");
    }

    #[test]
    fn short_commit_id_is_pinned() {
        let fixture = Fixture::new();
        let pinned = fixture.commit("main", "README", "first");
        fixture.commit("main", "README", "second");

        let short = &pinned.to_string()[..10];
        let managed = ManagedRepository::new(&fixture.url(), short, fixture.local_path()).unwrap();

        assert_eq!(managed.commit().unwrap(), pinned);
    }

    #[test]
    fn branch_takes_precedence_over_commit_prefix() {
        let fixture = Fixture::new();
        let first = fixture.commit("main", "README", "first");
        let second = fixture.commit("main", "README", "second");

        let colliding = second.to_string()[..8].to_owned();
        let first_commit = fixture.remote.find_commit(first).unwrap();
        fixture.remote.branch(&colliding, &first_commit, false).unwrap();

        let managed =
            ManagedRepository::new(&fixture.url(), &colliding, fixture.local_path()).unwrap();

        assert_eq!(
            managed.target(),
            &SyncTarget::Branch {
                remote_ref: format!("refs/remotes/origin/{colliding}")
            }
        );
        assert_eq!(managed.commit().unwrap(), first);
    }

    #[test]
    fn unknown_version_is_a_single_resolution_error() {
        let fixture = Fixture::new();
        fixture.commit("main", "README", "first");

        let result = ManagedRepository::new(&fixture.url(), "release", fixture.local_path());

        assert!(matches!(
            result,
            Err(SyncError::UnresolvedVersion { version }) if version == "release"
        ));
    }

    #[test]
    fn unreachable_origin_fails_construction() {
        let fixture = Fixture::new();
        let missing = fixture.dir.path().join("missing");

        let result = ManagedRepository::new(
            missing.to_str().unwrap(),
            "main",
            fixture.local_path(),
        );

        assert!(matches!(result, Err(SyncError::Git(_))));
    }

    #[test]
    fn reopening_repairs_origin_and_branch() {
        let fixture = Fixture::new();
        fixture.commit("main", "README", "first");
        drop(ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap());

        {
            let local = fixture.open_local();
            local.remote_set_url(ORIGIN, "/nonexistent").unwrap();
            let mut branch = local.find_branch("main", BranchType::Local).unwrap();
            branch.set_upstream(None).unwrap();
        }
        let tip = fixture.commit("main", "README", "second");

        let managed = ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap();

        let local = fixture.open_local();
        assert_eq!(
            local.find_remote(ORIGIN).unwrap().url(),
            Some(fixture.url().as_str())
        );
        let branch = local.find_branch("main", BranchType::Local).unwrap();
        assert_eq!(
            branch.upstream().unwrap().get().name(),
            Some("refs/remotes/origin/main")
        );
        assert_eq!(managed.commit().unwrap(), tip);
    }

    #[test]
    fn pinning_a_tracking_copy_drops_its_upstream() {
        let fixture = Fixture::new();
        let pinned = fixture.commit("main", "README", "first");
        fixture.commit("main", "README", "second");
        drop(ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap());

        let managed =
            ManagedRepository::new(&fixture.url(), &pinned.to_string(), fixture.local_path())
                .unwrap();

        assert_eq!(managed.target(), &SyncTarget::PinnedCommit(pinned));
        let local = fixture.open_local();
        assert!(local.head_detached().unwrap());
        let branch = local.find_branch("main", BranchType::Local).unwrap();
        assert!(branch.upstream().is_err());
        assert_eq!(fixture.read_local("README"), "first");
    }

    #[test]
    fn concurrent_pulls_are_serialized() {
        let fixture = Fixture::new();
        fixture.commit("main", "README", "first");
        let managed = std::sync::Arc::new(
            ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap(),
        );
        let tip = fixture.commit("main", "README", "second");

        let pulls: Vec<_> = (0..8)
            .map(|_| {
                let managed = managed.clone();
                std::thread::spawn(move || managed.force_pull())
            })
            .collect();

        for pull in pulls {
            let outcome = pull.join().unwrap().unwrap();
            assert_eq!(outcome.after, tip);
        }
        assert_eq!(managed.commit().unwrap(), tip);
        assert_eq!(fixture.read_local("README"), "second");
        assert!(fixture.open_local().statuses(None).unwrap().is_empty());
    }

    #[test]
    fn second_instance_cannot_own_the_working_copy() {
        let fixture = Fixture::new();
        fixture.commit("main", "README", "first");
        let _managed =
            ManagedRepository::new(&fixture.url(), "main", fixture.local_path()).unwrap();

        let lock = FileLock::new(
            &fixture.local_path().join(".git").join(LOCK_FILE),
            Duration::ZERO,
        );

        assert!(lock.is_err());
    }

    #[test]
    fn commit_like_versions() {
        assert!(looks_like_commit("deadbeef"));
        assert!(!looks_like_commit("main"));
        assert!(!looks_like_commit("abc"));
    }
}
