use std::sync::Arc;

use anyhow::Context;
use log::{error, info, warn};
use serde::Deserialize;

use crate::{
    action::PostAction,
    git::{RepoSync, SyncOutcome},
    webhook::{Hook, WebhookEvent},
};

pub const PUSH_EVENT: &str = "push";

const BRANCH_PREFIX: &str = "refs/heads/";

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: PushRepository,
    head_commit: Option<HeadCommit>,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    id: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// The push was for another repository or branch.
    Ignored,
    Pulled(SyncOutcome),
    /// The pull failed; the working copy stays at its last good commit.
    Failed,
}

/// Pulls the managed repository when a push to its branch is announced.
pub struct PushHook<R> {
    repo: Arc<R>,
    action: Option<PostAction>,
}

impl<R: RepoSync> PushHook<R> {
    pub fn new(repo: Arc<R>, action: Option<PostAction>) -> Self {
        Self { repo, action }
    }

    pub fn on_push(&self, event: &WebhookEvent) -> anyhow::Result<PushOutcome> {
        let payload = PushPayload::deserialize(&event.payload)
            .with_context(|| format!("Malformed push payload in delivery {}", event.delivery))?;

        let branch = payload
            .git_ref
            .strip_prefix(BRANCH_PREFIX)
            .unwrap_or(&payload.git_ref);
        let name = &payload.repository.full_name;

        if self.repo.name() != name.as_str() || branch != self.repo.version() {
            warn!(
                "Push to {}:{} does not match managed repository {}:{}",
                name,
                branch,
                self.repo.name(),
                self.repo.version()
            );
            return Ok(PushOutcome::Ignored);
        }

        if let Some(head_commit) = &payload.head_commit {
            info!("New commit available: {}", head_commit.id);
        }

        let outcome = match self.repo.force_pull() {
            Ok(outcome) if outcome.advanced() => {
                info!("Updated repo to: {}", outcome.after);
                PushOutcome::Pulled(outcome)
            }
            Ok(outcome) => {
                warn!("Repo did not move, still at: {}", outcome.after);
                PushOutcome::Pulled(outcome)
            }
            Err(err) => {
                error!("Failed to update {}: {}", self.repo.name(), err);
                PushOutcome::Failed
            }
        };

        if let Some(action) = &self.action {
            action.run();
        }

        Ok(outcome)
    }
}

impl<R: RepoSync> Hook for PushHook<R> {
    fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()> {
        self.on_push(event).map(|_| ())
    }
}
