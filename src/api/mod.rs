mod handlers;
mod types;

pub use handlers::{health, metadata, predict, ApiError};
pub use types::{ErrorBody, PredictRequest, PredictResponse, DEFAULT_NUM_RESULTS};
