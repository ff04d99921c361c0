use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::faceswap::FaceSwapResponse;
use crate::models::job::{JobSnapshot, JobStatus};
use crate::routes::error::{ApiError, ApiResult};

/// POST /api/v1/faceswap: Upload a photo and the card image to swap it onto.
pub async fn submit_faceswap(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<FaceSwapResponse>)> {
    let mut source_image: Option<Vec<u8>> = None;
    let mut target_image_url: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        match field.name() {
            Some("source_image") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                source_image = Some(data.to_vec());
            }
            Some("target_image_url") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                target_image_url = Some(text.trim().to_string());
            }
            _ => {}
        }
    }

    let source_image =
        source_image.ok_or_else(|| ApiError::BadRequest("source_image is required".to_string()))?;
    let target_image_url = target_image_url
        .ok_or_else(|| ApiError::BadRequest("target_image_url is required".to_string()))?;

    let job_id = state.jobs.submit(source_image, &target_image_url).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(FaceSwapResponse {
            job_id,
            status: JobStatus::Pending,
            message: "Face swap submitted".to_string(),
        }),
    ))
}

/// GET /api/v1/faceswap/{job_id}: Check face swap job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::NotFound(format!("Job {job_id} not found")))?;

    let job = state.jobs.status(job_id).await?;
    Ok(Json(JobSnapshot::from(&job)))
}
