use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::error::{ClassifyError, PipelineError, StartupError};
use crate::records::RecordStore;

/// Anything that maps a normalized image tensor to class probabilities.
pub trait Model: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifyError>;
}

/// ONNX export of the package recognition network, run on CPU.
pub struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
}

impl OnnxModel {
    /// Load the model from disk. CPU-heavy; call from a blocking context.
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        if !path.exists() {
            return Err(StartupError::ModelMissing(path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| load_error(path, e))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| load_error(path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(path, e))?
            .commit_from_file(path)
            .map_err(|e| load_error(path, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| StartupError::ModelLoad("model declares no inputs".into()))?;

        log::info!("Recognition model loaded from {} (input '{input_name}')", path.display());
        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> StartupError {
    StartupError::ModelLoad(format!("{}: {e}", path.display()))
}

impl Model for OnnxModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifyError> {
        let value = Value::from_array(input.to_owned())
            .map_err(|e| ClassifyError::Inference(format!("input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifyError::Inference("model session poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let probabilities = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| ClassifyError::Inference(format!("output tensor: {e}")))?;
        log::debug!("Model output shape: {:?}", probabilities.shape());

        // [1, n] for a single-image batch
        Ok(probabilities.iter().copied().collect())
    }
}

/// Index and value of the largest probability. Earlier indices win ties; NaN never wins.
pub fn decide(probabilities: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &p) in probabilities.iter().enumerate() {
        if p.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if p <= top => {}
            _ => best = Some((index, p)),
        }
    }
    best
}

/// Outcome of one inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub index: usize,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

impl Classification {
    /// Confidence as shown to the user, e.g. `87.00%`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", self.confidence * 100.0)
    }
}

/// Rejects classifications whose confidence falls below `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    pub threshold: f32,
}

impl ConfidenceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn check(&self, result: &Classification) -> Result<(), PipelineError> {
        if result.confidence < self.threshold {
            return Err(PipelineError::LowConfidence {
                confidence: result.confidence,
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

/// The recognition model together with its closed label vocabulary.
pub struct Classifier {
    model: Box<dyn Model>,
    labels: Vec<String>,
}

impl Classifier {
    pub fn new(model: Box<dyn Model>, labels: Vec<String>) -> Self {
        Self { model, labels }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Probability vector, one entry per label.
    pub fn predict(&self, tensor: &Array4<f32>) -> Result<Vec<f32>, ClassifyError> {
        let probabilities = self.model.predict(tensor)?;
        if probabilities.len() != self.labels.len() {
            return Err(ClassifyError::OutputSize {
                expected: self.labels.len(),
                got: probabilities.len(),
            });
        }
        Ok(probabilities)
    }

    pub fn classify(&self, tensor: &Array4<f32>) -> Result<Classification, ClassifyError> {
        let probabilities = self.predict(tensor)?;
        let (index, confidence) = decide(&probabilities).ok_or(ClassifyError::EmptyOutput)?;
        let label = self.labels[index].clone();
        log::info!("Predicted {label} ({:.2}%)", confidence * 100.0);
        Ok(Classification {
            label,
            index,
            confidence,
            probabilities,
        })
    }
}

/// Label vocabulary in model output order.
///
/// With a label map file the order is taken from it, one label per line. Otherwise
/// the table labels are sorted, which only matches the model if it was trained with
/// alphabetically ordered class directories.
pub fn load_labels(store: &RecordStore, label_map: Option<&Path>) -> Result<Vec<String>, StartupError> {
    let Some(path) = label_map else {
        log::warn!("No label map configured, assuming model classes are in sorted label order");
        return Ok(store.labels());
    };

    let data = std::fs::read_to_string(path)
        .map_err(|e| StartupError::LabelMap(format!("{}: {e}", path.display())))?;
    parse_label_map(&data, store)
}

fn parse_label_map(data: &str, store: &RecordStore) -> Result<Vec<String>, StartupError> {
    let mut labels: Vec<String> = Vec::new();
    for line in data.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !store.contains(line) {
            return Err(StartupError::LabelMap(format!("'{line}' has no record")));
        }
        if labels.iter().any(|l| l == line) {
            return Err(StartupError::LabelMap(format!("'{line}' listed twice")));
        }
        labels.push(line.to_string());
    }
    if labels.is_empty() {
        return Err(StartupError::LabelMap("no labels".into()));
    }
    Ok(labels)
}
