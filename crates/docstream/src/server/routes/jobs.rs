//! Job inspection endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OwnerId;
use crate::error::{Error, Result};
use crate::processing::{JobSummary, QueueStats};
use crate::server::state::AppState;

/// Queue stats plus the caller's jobs
#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub stats: QueueStats,
    pub jobs: Vec<JobSummary>,
}

/// GET /api/jobs - Queue stats and the caller's jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Json<JobListResponse> {
    let queue = state.job_queue();
    Json(JobListResponse {
        stats: queue.stats(),
        jobs: queue.list_by_owner(&owner_id),
    })
}

/// GET /api/jobs/:id - Job details
pub async fn get_job(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSummary>> {
    let job = state
        .job_queue()
        .get(job_id)
        .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
    if !job.is_owned_by(&owner_id) {
        return Err(Error::Ownership(format!("job {}", job_id)));
    }
    Ok(Json(JobSummary::from(&job)))
}
