use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use uuid::Uuid;

use quarry::ImportController;
use quarry::job::{ImportJob, JobRegistry, JobState};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

async fn seed_database(path: &str) -> Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{path}?mode=rwc"))
        .await?;
    sqlx::query("CREATE TABLE cities (name TEXT, population INTEGER)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "INSERT INTO cities VALUES ('Lagos', 15000000), ('Accra', 2500000), ('Dakar', NULL)",
    )
    .execute(&pool)
    .await?;
    pool.close().await;
    Ok(())
}

fn request(db_path: &str, job_id: Uuid, sub_command: &str, query: &str) -> HashMap<String, String> {
    let job = job_id.to_string();
    [
        ("subCommand", sub_command),
        ("jobID", job.as_str()),
        ("databaseType", "sqlite"),
        ("initialDatabase", db_path),
        ("query", query),
        ("options", r#"{"projectName":"Cities"}"#),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

async fn wait_for_settled(jobs: &JobRegistry, id: Uuid) -> ImportJob {
    for _ in 0..250 {
        if let Some(job) = jobs.get(id) {
            if matches!(job.state, JobState::CreatedProject | JobState::Error) && !job.updating {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("import job never settled");
}

#[tokio::test]
async fn parse_preview_fills_job_candidate() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let db_path = dir.path().join("source.db").display().to_string();
    seed_database(&db_path).await?;

    let controller = ImportController::new();
    let job_id = controller.jobs().create_job();

    let response = controller
        .handle(&request(
            &db_path,
            job_id,
            "parse-preview",
            "SELECT name, population FROM cities ORDER BY rowid",
        ))
        .await;
    assert_eq!(response["status"], "ok");
    assert_eq!(response["rowCount"], 3);

    let job = controller.jobs().get(job_id).unwrap();
    assert!(!job.updating);
    let preview = job.preview.expect("preview project");
    assert_eq!(preview.columns.len(), 2);
    assert_eq!(preview.columns[0].name, "name");
    assert_eq!(preview.rows[0].values[0].as_deref(), Some("Lagos"));
    assert_eq!(preview.rows[2].values[1], None);
    Ok(())
}

#[tokio::test]
async fn create_project_materializes_in_background() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let db_path = dir.path().join("source.db").display().to_string();
    seed_database(&db_path).await?;

    let controller = ImportController::new();
    let job_id = controller.jobs().create_job();

    let response = controller
        .handle(&request(
            &db_path,
            job_id,
            "create-project",
            "SELECT name, population FROM cities ORDER BY rowid",
        ))
        .await;
    assert_eq!(response["status"], "ok");
    assert_eq!(response["message"], "done");

    let job = wait_for_settled(controller.jobs(), job_id).await;
    assert_eq!(job.state, JobState::CreatedProject);

    let project_id = job.project_id.expect("project id recorded on the job");
    let (project, metadata) = controller.projects().get(project_id).unwrap();
    assert_eq!(metadata.name, "Cities");
    assert_eq!(metadata.encoding, "UTF-8");
    assert_eq!(project.row_count(), 3);
    assert_eq!(project.rows[1].values[0].as_deref(), Some("Accra"));
    assert_eq!(project.rows[1].values[1].as_deref(), Some("2500000"));
    Ok(())
}

#[tokio::test]
async fn create_project_records_query_failures_on_the_job() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let db_path = dir.path().join("source.db").display().to_string();
    seed_database(&db_path).await?;

    let controller = ImportController::new();
    let job_id = controller.jobs().create_job();

    let response = controller
        .handle(&request(
            &db_path,
            job_id,
            "create-project",
            "SELECT nope FROM does_not_exist",
        ))
        .await;
    // dispatch succeeds; the failure surfaces asynchronously on the job
    assert_eq!(response["status"], "ok");

    let job = wait_for_settled(controller.jobs(), job_id).await;
    assert_eq!(job.state, JobState::Error);
    assert!(!job.errors.is_empty());
    assert!(controller.projects().is_empty());
    Ok(())
}

#[tokio::test]
async fn canceled_job_registers_no_project() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let db_path = dir.path().join("source.db").display().to_string();
    seed_database(&db_path).await?;

    let controller = ImportController::new();
    let job_id = controller.jobs().create_job();
    controller.jobs().cancel(job_id);

    let response = controller
        .handle(&request(
            &db_path,
            job_id,
            "create-project",
            "SELECT name FROM cities",
        ))
        .await;
    assert_eq!(response["status"], "ok");

    // give the background task time to run and observe the cancellation
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(controller.projects().is_empty());
    let job = controller.jobs().get(job_id).unwrap();
    assert!(job.project_id.is_none());
    Ok(())
}

#[tokio::test]
async fn preview_then_import_reuses_the_managed_connection() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let db_path = dir.path().join("source.db").display().to_string();
    seed_database(&db_path).await?;

    let controller = ImportController::new();
    let job_id = controller.jobs().create_job();
    let query = "SELECT name FROM cities ORDER BY rowid";

    let preview = controller
        .handle(&request(&db_path, job_id, "parse-preview", query))
        .await;
    assert_eq!(preview["status"], "ok");

    let created = controller
        .handle(&request(&db_path, job_id, "create-project", query))
        .await;
    assert_eq!(created["status"], "ok");

    let job = wait_for_settled(controller.jobs(), job_id).await;
    assert_eq!(job.state, JobState::CreatedProject);
    Ok(())
}
