use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{DbColumn, DbRow};

#[derive(Clone, Debug, Serialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub encoding: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ProjectMetadata {
    pub fn new(name: impl Into<String>, encoding: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            encoding: encoding.into(),
            created_at: now,
            modified_at: now,
        }
    }
}

/// The host's unit of imported tabular data. Once registered, the project
/// store owns these rows; the import machinery never touches them again.
#[derive(Clone, Debug, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub columns: Vec<DbColumn>,
    pub rows: Vec<DbRow>,
}

impl Project {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// Stand-in for the host's project store.
#[derive(Default)]
pub struct ProjectRegistry {
    projects: Mutex<HashMap<Uuid, (Project, ProjectMetadata)>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, project: Project, metadata: ProjectMetadata) -> Uuid {
        let id = project.id;
        self.lock().insert(id, (project, metadata));
        id
    }

    pub fn get(&self, id: Uuid) -> Option<(Project, ProjectMetadata)> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, (Project, ProjectMetadata)>> {
        self.projects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
