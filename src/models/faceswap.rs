use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::JobStatus;

/// Text portion of a face-swap submission.
#[derive(Debug, Deserialize, Validate)]
pub struct FaceSwapRequest {
    /// Normal-resolution image of the chosen card print.
    #[garde(url, length(min = 1, max = 2048))]
    pub target_image_url: String,
}

/// Response after submitting a face-swap job.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaceSwapResponse {
    pub job_id: uuid::Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Query parameters for card search.
#[derive(Debug, Deserialize)]
pub struct CardSearchQuery {
    pub q: String,
}

/// Query parameters for listing all prints of a card.
#[derive(Debug, Deserialize)]
pub struct CardPrintsQuery {
    pub uri: String,
}
