use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::encoder::{EncoderError, FrequencyEncoder, Table};
use crate::features::{column_names, BookingFeatures, N_FEATURES, SCHEMA};

// ---------- Errors ----------

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact feature_names do not match the serving schema (first difference at position {position}: expected {expected:?}, got {got:?})")]
    SchemaMismatch {
        position: usize,
        expected: Option<String>,
        got: Option<String>,
    },
    #[error("classifier expects {got} inputs, schema has {expected}")]
    WidthMismatch { expected: usize, got: usize },
    #[error("tree {tree} is malformed: {reason}")]
    MalformedTree { tree: usize, reason: String },
    #[error("warm-up scoring failed: {0}")]
    Warmup(String),
}

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("column {0} is not numeric after encoding")]
    NonNumeric(String),
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncoderError),
    #[error("model produced an invalid probability: {0}")]
    InvalidOutput(f64),
}

// ---------- Artifact format ----------

/// On-disk pipeline: frequency encoding followed by a binary classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub encoder: FrequencyEncoder,
    pub classifier: Classifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Classifier {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    GradientBoosting {
        #[serde(default)]
        base_score: f64,
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        trees: Vec<Tree>,
    },
}

fn default_learning_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

/// Split nodes send `x <= threshold` left.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Tree {
    // Children always sit after their parent (checked by `validate`), so the walk terminates.
    fn eval(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn validate(&self, tree: usize, width: usize) -> Result<(), ArtifactError> {
        let malformed = |reason: String| ArtifactError::MalformedTree { tree, reason };
        if self.nodes.is_empty() {
            return Err(malformed("no nodes".into()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= width {
                    return Err(malformed(format!("node {} splits on feature {}", i, feature)));
                }
                for child in [*left, *right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(malformed(format!("node {} has invalid child {}", i, child)));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Classifier {
    pub fn validate(&self, width: usize) -> Result<(), ArtifactError> {
        match self {
            Classifier::LogisticRegression { coefficients, .. } => {
                if coefficients.len() != width {
                    return Err(ArtifactError::WidthMismatch {
                        expected: width,
                        got: coefficients.len(),
                    });
                }
                Ok(())
            }
            Classifier::GradientBoosting { trees, .. } => trees
                .iter()
                .enumerate()
                .try_for_each(|(i, t)| t.validate(i, width)),
        }
    }

    /// Two-class probabilities `[negative, positive]`.
    pub fn predict_proba(&self, x: &[f64]) -> [f64; 2] {
        let margin = match self {
            Classifier::LogisticRegression {
                coefficients,
                intercept,
            } => intercept + coefficients.iter().zip(x).map(|(w, v)| w * v).sum::<f64>(),
            Classifier::GradientBoosting {
                base_score,
                learning_rate,
                trees,
            } => base_score + learning_rate * trees.iter().map(|t| t.eval(x)).sum::<f64>(),
        };
        let p = sigmoid(margin);
        [1.0 - p, p]
    }
}

// ---------- Pipeline ----------

#[derive(Debug, Clone)]
pub struct Pipeline {
    encoder: FrequencyEncoder,
    classifier: Classifier,
}

impl Pipeline {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read model artifact at {}", path.display()))?;
        let artifact: Artifact = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse model artifact {}", path.display()))?;
        Ok(Self::from_artifact(artifact)?)
    }

    pub fn from_artifact(artifact: Artifact) -> Result<Self, ArtifactError> {
        let expected = column_names();
        if artifact.feature_names != expected {
            let position = expected
                .iter()
                .zip(&artifact.feature_names)
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| expected.len().min(artifact.feature_names.len()));
            return Err(ArtifactError::SchemaMismatch {
                position,
                expected: expected.get(position).cloned(),
                got: artifact.feature_names.get(position).cloned(),
            });
        }
        artifact.classifier.validate(N_FEATURES)?;

        let pipeline = Self {
            encoder: artifact.encoder,
            classifier: artifact.classifier,
        };

        // Warmup to make sure the artifact scores the all-defaults record
        let p = pipeline
            .positive_proba(&BookingFeatures::default())
            .map_err(|e| ArtifactError::Warmup(e.to_string()))?;
        tracing::debug!("warmup score ok (p={:.4})", p);

        Ok(pipeline)
    }

    fn encode(&self, features: &BookingFeatures) -> Result<Vec<f64>, ScoreError> {
        let table = Table::labelled(column_names(), vec![features.to_row()]);
        let encoded = self.encoder.transform(&table)?;
        let row = encoded.rows.into_iter().next().unwrap_or_default();

        let mut x = Vec::with_capacity(N_FEATURES);
        for (value, col) in row.iter().zip(SCHEMA.iter()) {
            match value.as_number() {
                Some(v) => x.push(v),
                None => return Err(ScoreError::NonNumeric(col.name.to_string())),
            }
        }
        Ok(x)
    }

    pub fn predict_proba(&self, features: &BookingFeatures) -> Result<[f64; 2], ScoreError> {
        let x = self.encode(features)?;
        Ok(self.classifier.predict_proba(&x))
    }

    /// Probability of the positive (cancellation) class.
    pub fn positive_proba(&self, features: &BookingFeatures) -> Result<f64, ScoreError> {
        let p = self.predict_proba(features)?[1];
        if !(0.0..=1.0).contains(&p) {
            return Err(ScoreError::InvalidOutput(p));
        }
        Ok(p)
    }
}

// ---------- Host ----------

/// Holds the pipeline loaded at startup, if loading succeeded.
#[derive(Debug)]
pub struct ModelHost {
    pipeline: Option<Pipeline>,
    source: PathBuf,
}

impl ModelHost {
    /// Loads the artifact at `path`. A failed load is logged and leaves the
    /// host without a model; scoring then fails with `ModelUnavailable`.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        tracing::info!("trying to load model from {}", path.display());
        match Pipeline::from_path(path) {
            Ok(pipeline) => {
                tracing::info!("model loaded successfully");
                Self::with_pipeline(pipeline, path)
            }
            Err(e) => {
                tracing::error!("error loading model: {:#}", e);
                Self::unavailable(path)
            }
        }
    }

    pub fn with_pipeline(pipeline: Pipeline, source: impl Into<PathBuf>) -> Self {
        Self {
            pipeline: Some(pipeline),
            source: source.into(),
        }
    }

    pub fn unavailable(source: impl Into<PathBuf>) -> Self {
        Self {
            pipeline: None,
            source: source.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn score(&self, features: &BookingFeatures) -> Result<f64, ScoreError> {
        self.pipeline
            .as_ref()
            .ok_or(ScoreError::ModelUnavailable)?
            .positive_proba(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{derive, ColumnKind, FeatureValue};
    use serde_json::json;
    use std::collections::HashMap;

    // Encoder fit on the categorical columns of three bookings.
    fn encoder() -> FrequencyEncoder {
        let cats: Vec<String> = SCHEMA
            .iter()
            .filter(|c| c.kind == ColumnKind::Categorical)
            .map(|c| c.name.to_string())
            .collect();
        let rows: Vec<Vec<FeatureValue>> = ["City Hotel", "City Hotel", "Resort Hotel"]
            .iter()
            .map(|hotel| {
                let f = BookingFeatures {
                    hotel: hotel.to_string(),
                    ..BookingFeatures::default()
                };
                cats.iter().filter_map(|c| f.get(c)).collect::<Vec<_>>()
            })
            .collect();
        let mut enc = FrequencyEncoder::default();
        enc.fit(&Table::labelled(cats, rows)).unwrap();
        enc
    }

    fn logistic(weights: &[(&str, f64)], intercept: f64) -> Artifact {
        let mut coefficients = vec![0.0; N_FEATURES];
        let by_name: HashMap<&str, f64> = weights.iter().copied().collect();
        for (i, c) in SCHEMA.iter().enumerate() {
            coefficients[i] = by_name.get(c.name).copied().unwrap_or(0.0);
        }
        Artifact {
            feature_names: column_names(),
            encoder: encoder(),
            classifier: Classifier::LogisticRegression {
                coefficients,
                intercept,
            },
        }
    }

    #[test]
    fn logistic_zero_weights_is_coin_flip() {
        let pipeline = Pipeline::from_artifact(logistic(&[], 0.0)).unwrap();
        let p = pipeline.predict_proba(&BookingFeatures::default()).unwrap();
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn logistic_uses_encoded_categoricals() {
        let pipeline = Pipeline::from_artifact(logistic(&[("hotel", 3.0)], 0.0)).unwrap();
        let raw = json!({"hotel": "City Hotel"});
        let city = pipeline
            .positive_proba(&derive(raw.as_object().unwrap()))
            .unwrap();
        let raw = json!({"hotel": "Nowhere Inn"});
        let unseen = pipeline
            .positive_proba(&derive(raw.as_object().unwrap()))
            .unwrap();
        // City Hotel encodes to 2/3, unseen to 0
        assert!((city - sigmoid(2.0)).abs() < 1e-9);
        assert!((unseen - 0.5).abs() < 1e-12);
    }

    #[test]
    fn lead_time_raises_probability() {
        let pipeline = Pipeline::from_artifact(logistic(&[("lead_time", 0.01)], -1.0)).unwrap();
        let short = pipeline
            .positive_proba(&derive(json!({"lead_time": 5}).as_object().unwrap()))
            .unwrap();
        let long = pipeline
            .positive_proba(&derive(json!({"lead_time": 300}).as_object().unwrap()))
            .unwrap();
        assert!(long > short);
    }

    #[test]
    fn gradient_boosting_walks_trees() {
        let artifact = Artifact {
            feature_names: column_names(),
            encoder: encoder(),
            classifier: Classifier::GradientBoosting {
                base_score: 0.0,
                learning_rate: 1.0,
                trees: vec![Tree {
                    nodes: vec![
                        Node::Split {
                            feature: 0,
                            threshold: 30.0,
                            left: 1,
                            right: 2,
                        },
                        Node::Leaf { value: -2.0 },
                        Node::Leaf { value: 2.0 },
                    ],
                }],
            },
        };
        let pipeline = Pipeline::from_artifact(artifact).unwrap();
        let mut f = BookingFeatures::default();
        f.lead_time = 30.0;
        assert!((pipeline.positive_proba(&f).unwrap() - sigmoid(-2.0)).abs() < 1e-12);
        f.lead_time = 31.0;
        assert!((pipeline.positive_proba(&f).unwrap() - sigmoid(2.0)).abs() < 1e-12);
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let mut artifact = logistic(&[], 0.0);
        artifact.feature_names.swap(0, 1);
        match Pipeline::from_artifact(artifact) {
            Err(ArtifactError::SchemaMismatch { position, .. }) => assert_eq!(position, 0),
            other => panic!("unexpected: {:?}", other),
        }

        let mut artifact = logistic(&[], 0.0);
        artifact.feature_names.pop();
        assert!(matches!(
            Pipeline::from_artifact(artifact),
            Err(ArtifactError::SchemaMismatch { position: 27, .. })
        ));
    }

    #[test]
    fn coefficient_width_is_checked() {
        let mut artifact = logistic(&[], 0.0);
        artifact.classifier = Classifier::LogisticRegression {
            coefficients: vec![0.0; 5],
            intercept: 0.0,
        };
        assert!(matches!(
            Pipeline::from_artifact(artifact),
            Err(ArtifactError::WidthMismatch { expected: 28, got: 5 })
        ));
    }

    #[test]
    fn malformed_trees_are_rejected() {
        let mut artifact = logistic(&[], 0.0);
        artifact.classifier = Classifier::GradientBoosting {
            base_score: 0.0,
            learning_rate: 0.1,
            trees: vec![Tree {
                nodes: vec![Node::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 0,
                    right: 0,
                }],
            }],
        };
        assert!(matches!(
            Pipeline::from_artifact(artifact),
            Err(ArtifactError::MalformedTree { tree: 0, .. })
        ));
    }

    #[test]
    fn unencoded_categorical_fails_scoring() {
        let mut artifact = logistic(&[], 0.0);
        artifact.encoder = FrequencyEncoder::default();
        // Warm-up hits the raw "Unknown" token in column hotel
        match Pipeline::from_artifact(artifact) {
            Err(ArtifactError::Warmup(msg)) => assert!(msg.contains("hotel"), "{}", msg),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn artifact_json_format() {
        let artifact = logistic(&[("adr", 0.002)], -0.5);
        let text = serde_json::to_string(&artifact).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["classifier"]["type"], "logistic_regression");

        let tree = json!({"type": "gradient_boosting", "trees": [{"nodes": [{"value": 0.0}]}]});
        let parsed: Classifier = serde_json::from_value(tree).unwrap();
        match parsed {
            Classifier::GradientBoosting { learning_rate, base_score, .. } => {
                assert_eq!(learning_rate, 1.0);
                assert_eq!(base_score, 0.0);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_artifact_leaves_host_unloaded() {
        let host = ModelHost::load("/definitely/not/here/model.json");
        assert!(!host.is_loaded());
        assert!(matches!(
            host.score(&BookingFeatures::default()),
            Err(ScoreError::ModelUnavailable)
        ));
    }

    #[test]
    fn host_scores_with_pipeline() {
        let pipeline = Pipeline::from_artifact(logistic(&[], 1.0)).unwrap();
        let host = ModelHost::with_pipeline(pipeline, "mem");
        let p = host.score(&BookingFeatures::default()).unwrap();
        assert!((p - sigmoid(1.0)).abs() < 1e-12);
    }
}
