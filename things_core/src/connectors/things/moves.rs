use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::location;
use super::scripts::NOT_FOUND;
use super::service::{today, require_id, ThingsService};
use super::types::{BuiltinList, Location};
use crate::cache::InvalidationScope;
use crate::error::{ErrorCode, ThingsError};

#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub success: bool,
    pub todo_id: String,
    pub from: String,
    pub destination: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveFailure {
    pub todo_id: String,
    pub error: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkMoveReport {
    pub success: bool,
    pub destination: String,
    pub successful: Vec<String>,
    pub failed: Vec<MoveFailure>,
    pub total_requested: usize,
    pub total_successful: usize,
    pub total_failed: usize,
}

impl ThingsService {
    /// Move one todo. The destination is validated before any subprocess
    /// runs.
    pub async fn move_todo(
        &self,
        todo_id: &str,
        destination: &str,
        preserve_scheduling: bool,
    ) -> Result<MoveOutcome, ThingsError> {
        let destination = Location::parse_destination(destination)?;
        let todo_id = require_id(todo_id, "todo_id")?;
        self.move_to(todo_id, &destination, preserve_scheduling).await
    }

    async fn move_to(
        &self,
        todo_id: &str,
        destination: &Location,
        preserve_scheduling: bool,
    ) -> Result<MoveOutcome, ThingsError> {
        let todo = self.get_todo(todo_id).await?;
        let from = location::classify(&todo, today(), self).await;

        match destination {
            Location::Project { id } => {
                if !self.exists("project", id).await? {
                    return Err(ThingsError::project_not_found(id));
                }
            }
            Location::Area { id } => {
                if !self.exists("area", id).await? {
                    return Err(ThingsError::area_not_found(id));
                }
            }
            Location::List { .. } => {}
        }

        let output = self
            .run_script(&self.scripts().move_todo(todo_id, destination))
            .await?;
        if output.trim() == NOT_FOUND {
            return Err(ThingsError::todo_not_found(todo_id));
        }

        if !preserve_scheduling {
            if let Location::List { name } = destination {
                self.apply_list_scheduling(todo_id, *name).await;
            }
        }

        self.cache().invalidate(InvalidationScope::Todos).await;
        info!(target: "things::moves", todo_id, %from, to = %destination, "moved todo");

        Ok(MoveOutcome {
            success: true,
            todo_id: todo_id.to_string(),
            message: format!("Moved from {} to {}", from, destination),
            from: from.to_string(),
            destination: destination.to_string(),
        })
    }

    /// Best effort; the move itself already succeeded.
    async fn apply_list_scheduling(&self, todo_id: &str, list: BuiltinList) {
        let Some(script) = self.scripts().reschedule_for_list(todo_id, list) else {
            return;
        };
        if let Err(e) = self.run_script(&script).await {
            warn!(target: "things::moves", todo_id, %list, error = %e, "could not adjust scheduling");
        }
    }

    /// Moves each id independently, at most `max_concurrent` at a time.
    /// One failure never aborts the batch.
    pub async fn bulk_move(
        &self,
        todo_ids: &[String],
        destination: &str,
        preserve_scheduling: bool,
        max_concurrent: Option<usize>,
    ) -> Result<BulkMoveReport, ThingsError> {
        let destination = Location::parse_destination(destination)?;
        if todo_ids.is_empty() {
            return Err(ThingsError::validation(
                ErrorCode::InvalidParameter,
                "todo_ids must contain at least one id",
            ));
        }

        let limit = max_concurrent.unwrap_or(self.max_concurrent()).max(1);
        let semaphore = Semaphore::new(limit);

        // Blank ids are reported as failures in place, never dropped.
        let outcomes = join_all(todo_ids.iter().map(|raw| {
            let semaphore = &semaphore;
            let destination = &destination;
            async move {
                let id = raw.trim();
                let result = match require_id(id, "todo_id") {
                    Err(e) => Err(e),
                    Ok(id) => match semaphore.acquire().await {
                        Ok(_permit) => self.move_to(id, destination, preserve_scheduling).await,
                        Err(e) => Err(ThingsError::Internal(e.to_string())),
                    },
                };
                (id, result)
            }
        }))
        .await;

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for (id, result) in outcomes {
            match result {
                Ok(_) => successful.push(id.to_string()),
                Err(e) => failed.push(MoveFailure {
                    todo_id: id.to_string(),
                    error: e.code(),
                    message: e.to_string(),
                }),
            }
        }

        let report = BulkMoveReport {
            success: failed.is_empty(),
            destination: destination.to_string(),
            total_requested: todo_ids.len(),
            total_successful: successful.len(),
            total_failed: failed.len(),
            successful,
            failed,
        };
        info!(
            target: "things::moves",
            destination = %report.destination,
            requested = report.total_requested,
            failed = report.total_failed,
            "bulk move finished"
        );
        Ok(report)
    }
}
