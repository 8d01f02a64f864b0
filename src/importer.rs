use serde::Deserialize;
use tracing::debug;

use crate::config::QueryInfo;
use crate::db::{self, DatabaseConnection, DbRow};
use crate::error::ConnectorError;
use crate::project::Project;

/// Preview runs never pull more than this many rows.
pub const DEFAULT_PREVIEW_LIMIT: u64 = 100;

/// Row-shaping options posted by the import dialog as a JSON blob.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportOptions {
    pub project_name: String,
    pub encoding: String,
    pub skip_data_lines: usize,
    pub store_blank_rows: bool,
    pub store_blank_cells_as_nulls: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            project_name: "Untitled".to_string(),
            encoding: "UTF-8".to_string(),
            skip_data_lines: 0,
            store_blank_rows: true,
            store_blank_cells_as_nulls: true,
        }
    }
}

impl ImportOptions {
    pub fn from_json(raw: Option<&str>) -> Result<Self, ConnectorError> {
        match raw {
            None | Some("") => Ok(Self::default()),
            Some(raw) => {
                serde_json::from_str(raw).map_err(|e| ConnectorError::InvalidOptions(e.to_string()))
            }
        }
    }
}

/// Runs the query (limit-wrapped when `limit` is set) and materializes the
/// result into the project: column descriptors first, then rows shaped by
/// the options. Returns the number of rows the project holds afterwards.
pub async fn parse(
    connection: &DatabaseConnection,
    query_info: &QueryInfo,
    limit: Option<u64>,
    options: &ImportOptions,
    project: &mut Project,
) -> Result<usize, ConnectorError> {
    let sql = match limit {
        Some(limit) => db::build_limit_query(Some(limit), None, &query_info.query),
        None => query_info.query.clone(),
    };
    debug!(vendor = query_info.config.vendor.label(), %sql, "materializing query");

    let batch = connection.execute(&sql).await?;
    project.columns = batch.columns;

    let mut index = project.rows.len();
    let mut remaining_skip = options.skip_data_lines;
    for row in batch.rows {
        if remaining_skip > 0 {
            remaining_skip -= 1;
            continue;
        }

        let values: Vec<Option<String>> = row
            .values
            .into_iter()
            .map(|cell| match cell {
                Some(s) if s.is_empty() && options.store_blank_cells_as_nulls => None,
                other => other,
            })
            .collect();

        let all_blank = values
            .iter()
            .all(|v| v.as_deref().is_none_or(|s| s.trim().is_empty()));
        if all_blank && !options.store_blank_rows {
            continue;
        }

        project.rows.push(DbRow { index, values });
        index += 1;
    }

    Ok(project.rows.len())
}
