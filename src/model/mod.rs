pub mod assets;
pub mod ncf;
pub mod wrapper;

pub use assets::{ModelAssets, ModelError, Parameters};
pub use ncf::NeuMf;
pub use wrapper::{ModelWrapper, PredictError, Prediction};
