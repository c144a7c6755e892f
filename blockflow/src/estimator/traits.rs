//! The capability contract every estimator satisfies.

use crate::blocks::{Batch, Block, Dataset};
use crate::errors::{BlockflowError, ParameterError};
use crate::params::{split_key, Params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Keyword arguments passed to `fit`.
pub type FitParams = BTreeMap<String, serde_json::Value>;

/// Which optional operations an estimator provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Can be fitted. Compositions reject estimators without this.
    pub fit: bool,
    /// Provides `transform`.
    pub transform: bool,
    /// Provides `predict`.
    pub predict: bool,
}

impl Capabilities {
    /// A fittable transformer.
    #[must_use]
    pub const fn transformer() -> Self {
        Self {
            fit: true,
            transform: true,
            predict: false,
        }
    }

    /// A fittable predictor.
    #[must_use]
    pub const fn predictor() -> Self {
        Self {
            fit: true,
            transform: false,
            predict: true,
        }
    }
}

/// How an estimator consumes blocked input during `fit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Reset, then one `partial_fit` per block in order, then `finish_fit`.
    #[default]
    Incremental,
    /// One `fit_distributed` call over the whole dataset.
    Distributed,
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => write!(f, "incremental"),
            Self::Distributed => write!(f, "distributed"),
        }
    }
}

/// A pluggable transformer or predictor.
///
/// Only [`kind`](Self::kind), [`capabilities`](Self::capabilities),
/// [`is_fitted`](Self::is_fitted) and the parameter methods are required;
/// every optional operation fails with [`BlockflowError::Unsupported`]
/// unless overridden. `transform` and `predict` take `&self` and may run on
/// many blocks at once.
pub trait Estimator: EstimatorClone + Send + Sync + fmt::Debug {
    /// Short type name, used for auto-naming and diagnostics.
    fn kind(&self) -> &'static str;

    /// Declared capabilities.
    fn capabilities(&self) -> Capabilities;

    /// How `fit` consumes blocks.
    fn fit_mode(&self) -> FitMode {
        FitMode::Incremental
    }

    /// Clears learned state before an incremental fit.
    fn reset(&mut self) {}

    /// Learns from one block.
    fn partial_fit(&mut self, batch: &Batch<'_>, params: &FitParams) -> Result<(), BlockflowError> {
        let _ = (batch, params);
        Err(BlockflowError::unsupported(self.kind(), "partial_fit"))
    }

    /// Finalizes learned state after every block has been seen.
    fn finish_fit(&mut self, params: &FitParams) -> Result<(), BlockflowError> {
        let _ = params;
        Ok(())
    }

    /// Learns from the whole dataset at once.
    fn fit_distributed(&mut self, data: &Dataset, params: &FitParams) -> Result<(), BlockflowError> {
        let _ = (data, params);
        Err(BlockflowError::unsupported(self.kind(), "fit_distributed"))
    }

    /// Returns true once a fit has completed.
    fn is_fitted(&self) -> bool;

    /// Transforms one block. Must preserve the row count.
    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        let _ = block;
        Err(BlockflowError::unsupported(self.kind(), "transform"))
    }

    /// Predicts one block. Must preserve the row count.
    fn predict(&self, block: &Block) -> Result<Block, BlockflowError> {
        let _ = block;
        Err(BlockflowError::unsupported(self.kind(), "predict"))
    }

    /// Returns parameters; with `deep`, nested estimators' parameters too.
    fn get_params(&self, deep: bool) -> Params;

    /// Applies parameters.
    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError>;

    /// Validates `params` without applying them.
    ///
    /// The default accepts exactly the keys of `get_params(true)`.
    fn check_params(&self, params: &Params) -> Result<(), BlockflowError> {
        let known = self.get_params(true);
        match params.keys().find(|k| !known.contains_key(k.as_str())) {
            None => Ok(()),
            Some(key) => {
                let owner = self.kind();
                Err(match split_key(key) {
                    Some((step, _)) => ParameterError::unknown_step(key.as_str(), step, owner),
                    None => ParameterError::unknown_parameter(
                        key.as_str(),
                        owner,
                        known.keys().map(String::as_str),
                    ),
                }
                .into())
            }
        }
    }

    /// Names of the output columns of `transform`.
    fn feature_names(&self) -> Result<Vec<String>, BlockflowError> {
        Err(BlockflowError::unsupported(self.kind(), "get_feature_names"))
    }
}

/// Object-safe deep copy for boxed estimators.
pub trait EstimatorClone {
    /// Returns an independent copy.
    fn clone_box(&self) -> Box<dyn Estimator>;
}

impl<T> EstimatorClone for T
where
    T: 'static + Estimator + Clone,
{
    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Estimator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
