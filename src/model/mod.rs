pub mod config;
pub mod inference_config;
pub mod model_metadata;
pub mod model_storage;

pub use config::{AppConfig, ModelSettings, ServerSettings, TrainingSettings};
pub use inference_config::InferenceConfig;
pub use model_metadata::ModelMetadata;
pub use model_storage::{load_artifact, load_metadata, log_metadata_info, save_artifact};
