use serde::{Deserialize, Serialize};

use crate::model::Prediction;

pub const DEFAULT_NUM_RESULTS: usize = 5;

/// Form payload of `POST /model/predict`. Both fields are deserialized
/// leniently (`num_results` as a raw string) so the handler can produce
/// explicit error bodies instead of a framework rejection.
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub num_results: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub status: String,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}
