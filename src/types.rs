use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub features: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PredictionOut {
    /// Percent, two decimals.
    pub cancellation_probability: f64,
    pub prediction_time: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthOut {
    pub status: String,
    pub model_loaded: bool,
    pub static_folder: String,
    pub static_folder_exists: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugOut {
    pub static_folder: String,
    pub absolute_path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_index: Option<bool>,
}
