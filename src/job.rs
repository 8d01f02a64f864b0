use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::project::Project;

/// Import-job status as reported to the host UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Preparing,
    CreatingProject,
    CreatedProject,
    Error,
}

#[derive(Clone, Debug)]
pub struct ImportJob {
    pub id: Uuid,
    pub state: JobState,
    pub updating: bool,
    pub canceled: bool,
    pub project_id: Option<Uuid>,
    pub errors: Vec<String>,
    /// Candidate project from the latest preview run.
    pub preview: Option<Project>,
    pub created_at: DateTime<Utc>,
    pub touched_at: DateTime<Utc>,
}

impl ImportJob {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: JobState::Preparing,
            updating: false,
            canceled: false,
            project_id: None,
            errors: Vec::new(),
            preview: None,
            created_at: now,
            touched_at: now,
        }
    }
}

/// In-memory registry of live import jobs. The host owns job lifecycle in
/// the full application; this models the bookkeeping the controller needs.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, ImportJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_job(&self) -> Uuid {
        let job = ImportJob::new();
        let id = job.id;
        self.lock().insert(id, job);
        id
    }

    /// Snapshot of the job, if it exists.
    pub fn get(&self, id: Uuid) -> Option<ImportJob> {
        self.lock().get(&id).cloned()
    }

    pub fn touch(&self, id: Uuid) {
        self.update(id, |job| job.touched_at = Utc::now());
    }

    pub fn set_updating(&self, id: Uuid, updating: bool) {
        self.update(id, |job| job.updating = updating);
    }

    pub fn set_state(&self, id: Uuid, state: JobState) {
        self.update(id, |job| job.state = state);
    }

    pub fn set_preview(&self, id: Uuid, preview: Project) {
        self.update(id, |job| {
            job.preview = Some(preview);
            job.errors.clear();
        });
    }

    pub fn set_project(&self, id: Uuid, project_id: Uuid) {
        self.update(id, |job| {
            job.state = JobState::CreatedProject;
            job.project_id = Some(project_id);
        });
    }

    pub fn set_error(&self, id: Uuid, errors: Vec<String>) {
        self.update(id, |job| {
            job.state = JobState::Error;
            job.errors = errors;
        });
    }

    pub fn cancel(&self, id: Uuid) {
        self.update(id, |job| job.canceled = true);
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut ImportJob)) {
        if let Some(job) = self.lock().get_mut(&id) {
            f(job);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ImportJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
