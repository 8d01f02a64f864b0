use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::QueryInfo;
use crate::error::ConnectorError;
use crate::importer::{self, DEFAULT_PREVIEW_LIMIT, ImportOptions};
use crate::job::{JobRegistry, JobState};
use crate::manager::ConnectionManager;
use crate::project::{Project, ProjectMetadata, ProjectRegistry};

/// Entry point the host's import framework dispatches POST requests to.
/// Takes the flat request-parameter map, returns the JSON response body;
/// transport belongs to the host.
pub struct ImportController {
    connections: Arc<ConnectionManager>,
    jobs: Arc<JobRegistry>,
    projects: Arc<ProjectRegistry>,
}

impl ImportController {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(ConnectionManager::new()),
            jobs: Arc::new(JobRegistry::new()),
            projects: Arc::new(ProjectRegistry::new()),
        }
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn projects(&self) -> &ProjectRegistry {
        &self.projects
    }

    pub fn handle_get(&self) -> Value {
        error_response("GET not implemented")
    }

    pub async fn handle(&self, params: &HashMap<String, String>) -> Value {
        let sub_command = params.get("subCommand").map(String::as_str).unwrap_or("");
        info!(sub_command, "import controller dispatch");
        match sub_command {
            "initialize-parser-ui" => self.initialize_parser_ui(),
            "parse-preview" => self.parse_preview(params).await,
            "create-project" => self.create_project(params).await,
            _ => error_response("No such sub command"),
        }
    }

    /// Defaults the import dialog seeds its option widgets from.
    fn initialize_parser_ui(&self) -> Value {
        json!({
            "status": "ok",
            "options": {
                "skipDataLines": 0,
                "storeBlankRows": true,
                "storeBlankCellsAsNulls": true,
            },
        })
    }

    async fn parse_preview(&self, params: &HashMap<String, String>) -> Value {
        let job_id = match self.resolve_job(params) {
            Ok(id) => id,
            Err(err) => return error_response(&err.to_string()),
        };
        let (query_info, options) = match request_inputs(params) {
            Ok(inputs) => inputs,
            Err(response) => return response,
        };

        self.jobs.set_updating(job_id, true);
        let result = self.run_preview(&query_info, &options).await;
        let response = match result {
            Ok(project) => {
                let row_count = project.row_count();
                self.jobs.set_preview(job_id, project);
                json!({"status": "ok", "rowCount": row_count})
            }
            Err(err) => {
                error!(%job_id, %err, "parse-preview failed");
                json!({"status": "error", "errors": [err.to_string()]})
            }
        };
        self.jobs.touch(job_id);
        self.jobs.set_updating(job_id, false);
        response
    }

    async fn run_preview(
        &self,
        query_info: &QueryInfo,
        options: &ImportOptions,
    ) -> Result<Project, ConnectorError> {
        let connection = self.connections.acquire(&query_info.config, false).await?;
        let mut project = Project::new();
        importer::parse(
            &connection,
            query_info,
            Some(DEFAULT_PREVIEW_LIMIT),
            options,
            &mut project,
        )
        .await?;
        Ok(project)
    }

    /// Kicks the full import off on a background task and returns at once;
    /// the caller polls job state to learn the outcome.
    async fn create_project(&self, params: &HashMap<String, String>) -> Value {
        let job_id = match self.resolve_job(params) {
            Ok(id) => id,
            Err(err) => return error_response(&err.to_string()),
        };
        let (query_info, options) = match request_inputs(params) {
            Ok(inputs) => inputs,
            Err(response) => return response,
        };

        self.jobs.set_updating(job_id, true);
        self.jobs.set_state(job_id, JobState::CreatingProject);

        let connections = Arc::clone(&self.connections);
        let jobs = Arc::clone(&self.jobs);
        let projects = Arc::clone(&self.projects);
        tokio::spawn(async move {
            let result = async {
                let connection = connections.acquire(&query_info.config, false).await?;
                let mut project = Project::new();
                importer::parse(&connection, &query_info, None, &options, &mut project).await?;
                Ok::<Project, ConnectorError>(project)
            }
            .await;

            // A canceled job registers nothing and keeps whatever state the
            // host left it in.
            if jobs.get(job_id).is_none_or(|job| job.canceled) {
                return;
            }

            match result {
                Ok(project) => {
                    let metadata = ProjectMetadata::new(&options.project_name, &options.encoding);
                    let project_id = projects.register(project, metadata);
                    jobs.set_project(job_id, project_id);
                    info!(%job_id, %project_id, "project created");
                }
                Err(err) => {
                    error!(%job_id, %err, "create-project failed");
                    jobs.set_error(job_id, vec![err.to_string()]);
                }
            }
            jobs.touch(job_id);
            jobs.set_updating(job_id, false);
        });

        json!({"status": "ok", "message": "done"})
    }

    fn resolve_job(&self, params: &HashMap<String, String>) -> Result<Uuid, ConnectorError> {
        let raw = params.get("jobID").map(String::as_str).unwrap_or("");
        let id = Uuid::parse_str(raw).map_err(|_| ConnectorError::NoSuchJob(raw.to_string()))?;
        if self.jobs.get(id).is_none() {
            return Err(ConnectorError::NoSuchJob(id.to_string()));
        }
        Ok(id)
    }
}

impl Default for ImportController {
    fn default() -> Self {
        Self::new()
    }
}

fn request_inputs(params: &HashMap<String, String>) -> Result<(QueryInfo, ImportOptions), Value> {
    let query_info = QueryInfo::from_params(params)
        .map_err(|err| error_response(&format!("Invalid or missing query info: {err}")))?;
    let options = ImportOptions::from_json(params.get("options").map(String::as_str))
        .map_err(|err| error_response(&err.to_string()))?;
    Ok((query_info, options))
}

fn error_response(message: &str) -> Value {
    json!({"status": "error", "message": message})
}
