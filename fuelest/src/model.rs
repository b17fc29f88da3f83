//! Fuel-flow model contract, memoizing loader, and the bundled dense network.
//!
//! The pipelines depend only on [`FuelModel`]: a matrix of N samples by
//! [`crate::features::FEATURE_COUNT`] normalized features in, N single-engine
//! fuel-flow scalars out. [`ModelCache`] memoizes loaded artifacts by name so
//! repeated calls share one loaded model; the first load for a name is
//! serialized behind the cache mutex.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::FuelError;

/// Inference contract for a trained fuel-flow regression model.
pub trait FuelModel: Send + Sync {
    /// Predict one single-engine fuel-flow scalar per input row.
    fn predict(&self, inputs: ArrayView2<'_, f64>) -> Result<Array1<f64>, FuelError>;
}

/// Loader invoked on a cache miss, keyed by artifact name.
pub type ModelLoadFn = dyn Fn(&str) -> Result<Arc<dyn FuelModel>, FuelError> + Send + Sync;

/// Get-or-load cache mapping artifact name to a loaded model.
///
/// The mutex is held across the underlying load: concurrent first calls for
/// a cold name serialize rather than loading twice.
pub struct ModelCache {
    loader: Box<ModelLoadFn>,
    loaded: Mutex<HashMap<String, Arc<dyn FuelModel>>>,
}

impl ModelCache {
    pub fn new(loader: Box<ModelLoadFn>) -> Self {
        Self {
            loader,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// A cache whose loader reads [`DenseNetwork`] JSON artifacts, treating
    /// the artifact name as a file path.
    pub fn with_dense_loader() -> Self {
        Self::new(Box::new(|name| {
            let network = DenseNetwork::from_path(Path::new(name))?;
            Ok(Arc::new(network) as Arc<dyn FuelModel>)
        }))
    }

    pub fn get_or_load(&self, name: &str) -> Result<Arc<dyn FuelModel>, FuelError> {
        let mut loaded = match self.loaded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(model) = loaded.get(name) {
            return Ok(Arc::clone(model));
        }
        debug!(artifact = name, "loading model artifact");
        let model = (self.loader)(name)?;
        loaded.insert(name.to_string(), Arc::clone(&model));
        Ok(model)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Linear,
}

/// One fully-connected layer. `weights[j]` holds the incoming weights of
/// output unit `j`, so `weights.len()` is the layer width.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

/// Feed-forward dense network deserialized from a JSON artifact.
///
/// The final layer must be one unit wide: the network maps a feature matrix
/// to one fuel-flow scalar per row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    pub fn from_path(path: &Path) -> Result<Self, FuelError> {
        let text = fs::read_to_string(path).map_err(|e| {
            FuelError::ModelLoad(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, FuelError> {
        let network: DenseNetwork =
            serde_json::from_str(text).map_err(|e| FuelError::ModelLoad(e.to_string()))?;
        network.validate()?;
        Ok(network)
    }

    /// Width of the expected input feature vector.
    pub fn input_width(&self) -> usize {
        self.layers
            .first()
            .and_then(|layer| layer.weights.first())
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<(), FuelError> {
        if self.layers.is_empty() {
            return Err(FuelError::ModelLoad("model has no layers".to_string()));
        }
        let mut width = self.input_width();
        if width == 0 {
            return Err(FuelError::ModelLoad(
                "first layer has no input weights".to_string(),
            ));
        }
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.weights.is_empty() {
                return Err(FuelError::ModelLoad(format!(
                    "layer {index} has no units"
                )));
            }
            for row in &layer.weights {
                if row.len() != width {
                    return Err(FuelError::ModelLoad(format!(
                        "layer {index} expects inputs of width {width}, found a row of {}",
                        row.len()
                    )));
                }
            }
            if layer.bias.len() != layer.weights.len() {
                return Err(FuelError::ModelLoad(format!(
                    "layer {index} has {} units but {} bias values",
                    layer.weights.len(),
                    layer.bias.len()
                )));
            }
            width = layer.weights.len();
        }
        if width != 1 {
            return Err(FuelError::ModelLoad(format!(
                "final layer must be one unit wide, found {width}"
            )));
        }
        Ok(())
    }
}

impl FuelModel for DenseNetwork {
    fn predict(&self, inputs: ArrayView2<'_, f64>) -> Result<Array1<f64>, FuelError> {
        let expected = self.input_width();
        if inputs.ncols() != expected {
            return Err(FuelError::Model(format!(
                "model expects {expected} features, got {}",
                inputs.ncols()
            )));
        }
        let mut activations = inputs.to_owned();
        for layer in &self.layers {
            let in_width = activations.ncols();
            let out_width = layer.weights.len();
            let mut weight = Array2::zeros((in_width, out_width));
            for (j, row) in layer.weights.iter().enumerate() {
                for (i, value) in row.iter().enumerate() {
                    weight[(i, j)] = *value;
                }
            }
            let bias = Array1::from_vec(layer.bias.clone());
            let mut next = activations.dot(&weight) + &bias;
            if layer.activation == Activation::Relu {
                next.mapv_inplace(|v| v.max(0.0));
            }
            activations = next;
        }
        Ok(activations.column(0).to_owned())
    }
}
