//! Optimistic updates with explicit commit and revert.
//!
//! [`Optimistic::begin`] captures the current value, applies a tentative
//! change and hands back a [`Tentative`] guard. The guard must be committed
//! once the remote write succeeds; reverting (or dropping it unresolved)
//! restores the captured value.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use adflow_client::ProjectWriter;
use adflow_models::{Job, Project, SceneUpdate};

use crate::error::{TrackerError, TrackerResult};

/// Locally held value that observers see change immediately.
pub struct Optimistic<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Optimistic<T> {
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(value);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Replace the value outright, outside any tentative change.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Apply `mutate` tentatively.
    pub fn begin(&self, mutate: impl FnOnce(&mut T)) -> Tentative<'_, T> {
        let before = self.get();
        self.tx.send_modify(mutate);
        Tentative {
            owner: self,
            before: Some(before),
        }
    }

    /// Apply `mutate`, run `write` on the tentative value, and commit on
    /// success or revert on error.
    pub async fn apply<R, E, W, Fut>(&self, mutate: impl FnOnce(&mut T), write: W) -> Result<R, E>
    where
        W: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let tentative = self.begin(mutate);
        match write(self.get()).await {
            Ok(result) => {
                tentative.commit();
                Ok(result)
            }
            Err(e) => {
                tentative.revert();
                Err(e)
            }
        }
    }
}

/// Pending tentative change. Dropping it unresolved reverts.
#[must_use = "an unresolved tentative change is reverted on drop"]
pub struct Tentative<'a, T: Clone> {
    owner: &'a Optimistic<T>,
    before: Option<T>,
}

impl<T: Clone> Tentative<'_, T> {
    pub fn commit(mut self) {
        self.before = None;
    }

    pub fn revert(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some(before) = self.before.take() {
            self.owner.tx.send_replace(before);
        }
    }
}

impl<T: Clone> Drop for Tentative<'_, T> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Edits a project's scenes optimistically, persisting through a
/// [`ProjectWriter`].
pub struct SceneEditor {
    writer: Arc<dyn ProjectWriter>,
    project: Optimistic<Project>,
}

impl SceneEditor {
    pub fn new(writer: Arc<dyn ProjectWriter>, project: Project) -> Self {
        Self {
            writer,
            project: Optimistic::new(project),
        }
    }

    pub fn project(&self) -> Project {
        self.project.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Project> {
        self.project.subscribe()
    }

    /// Show the edit immediately, then persist it. Invalid edits are refused
    /// before anything changes; a rejected write restores the project as it
    /// was before the edit.
    pub async fn update_scene(&self, scene_id: &str, update: SceneUpdate) -> TrackerResult<()> {
        let mut edited = self.project.get();
        edited.apply_scene_update(scene_id, &update)?;
        let project_id = edited.id.clone();

        let writer = Arc::clone(&self.writer);
        let result = self
            .project
            .apply(
                move |project| *project = edited,
                move |_| async move { writer.update_scene(&project_id, scene_id, &update).await },
            )
            .await;

        match result {
            Ok(()) => {
                debug!(scene_id, "Scene update persisted");
                Ok(())
            }
            Err(e) => {
                warn!(scene_id, "Scene update rejected, reverted: {}", e);
                Err(TrackerError::Api(e))
            }
        }
    }

    /// Record a tracked job's latest snapshot on its scene. Local only; the
    /// backend owns the persisted copy.
    pub fn record_job(&self, scene_id: &str, job: &Job) -> TrackerResult<()> {
        let mut project = self.project.get();
        project.set_active_job(scene_id, job)?;
        self.project.set(project);
        Ok(())
    }
}
