//! Mock estimators for exercising composition behavior.

use super::reference::{set_all, unknown};
use crate::blocks::{Batch, Block, Dataset};
use crate::errors::{BlockflowError, EstimatorError, NotFittedError};
use crate::estimator::{Capabilities, Estimator, FitMode, FitParams};
use crate::params::{ParamValue, Params};
use ndarray::Array1;
use parking_lot::Mutex;
use std::sync::Arc;

/// A fittable estimator with two numeric parameters and nothing else.
#[derive(Debug, Clone)]
pub struct ParamStub {
    a: f64,
    b: f64,
    fitted: bool,
}

impl ParamStub {
    /// Creates a stub with parameters `a` and `b`.
    #[must_use]
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b, fitted: false }
    }

    fn set_param(&mut self, key: &str, value: &ParamValue) -> Result<(), BlockflowError> {
        match key {
            "a" => self.a = value.parse(key)?,
            "b" => self.b = value.parse(key)?,
            _ => return Err(unknown(key, "ParamStub", &["a", "b"])),
        }
        Ok(())
    }
}

impl Estimator for ParamStub {
    fn kind(&self) -> &'static str {
        "ParamStub"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            fit: true,
            transform: false,
            predict: false,
        }
    }

    fn reset(&mut self) {
        self.fitted = false;
    }

    fn partial_fit(&mut self, _batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        Ok(())
    }

    fn finish_fit(&mut self, _params: &FitParams) -> Result<(), BlockflowError> {
        self.fitted = true;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn get_params(&self, _deep: bool) -> Params {
        crate::params! { "a" => self.a, "b" => self.b }
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        set_all(self, params, Self::set_param)
    }

    fn check_params(&self, params: &Params) -> Result<(), BlockflowError> {
        self.clone().set_params(params.clone())
    }
}

/// Returns every block unchanged.
#[derive(Debug, Clone, Default)]
pub struct IdentityTransformer {
    fitted: bool,
}

impl IdentityTransformer {
    /// Creates an unfitted identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Estimator for IdentityTransformer {
    fn kind(&self) -> &'static str {
        "IdentityTransformer"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::transformer()
    }

    fn reset(&mut self) {
        self.fitted = false;
    }

    fn partial_fit(&mut self, _batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        Ok(())
    }

    fn finish_fit(&mut self, _params: &FitParams) -> Result<(), BlockflowError> {
        self.fitted = true;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        if !self.fitted {
            return Err(NotFittedError::new("IdentityTransformer").into());
        }
        Ok(block.clone())
    }

    fn get_params(&self, _deep: bool) -> Params {
        Params::new()
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        match params.keys().next() {
            Some(key) => Err(unknown(key, "IdentityTransformer", &[])),
            None => Ok(()),
        }
    }
}

/// Identity transformer fitted in one call over the whole dataset.
///
/// Every `fit_distributed` call appends `(rows, blocks)` to a log shared by
/// all clones, so a test can keep a clone and inspect what the fit saw.
#[derive(Debug, Clone, Default)]
pub struct WholeDatasetRecorder {
    seen: Arc<Mutex<Vec<(usize, usize)>>>,
    fitted: bool,
}

impl WholeDatasetRecorder {
    /// Creates an unfitted recorder with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `(rows, blocks)` of each dataset passed to `fit_distributed`.
    #[must_use]
    pub fn seen(&self) -> Vec<(usize, usize)> {
        self.seen.lock().clone()
    }
}

impl Estimator for WholeDatasetRecorder {
    fn kind(&self) -> &'static str {
        "WholeDatasetRecorder"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::transformer()
    }

    fn fit_mode(&self) -> FitMode {
        FitMode::Distributed
    }

    fn fit_distributed(&mut self, data: &Dataset, _params: &FitParams) -> Result<(), BlockflowError> {
        self.seen.lock().push((data.n_rows(), data.n_blocks()));
        self.fitted = true;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        if !self.fitted {
            return Err(NotFittedError::new("WholeDatasetRecorder").into());
        }
        Ok(block.clone())
    }

    fn get_params(&self, _deep: bool) -> Params {
        Params::new()
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        match params.keys().next() {
            Some(key) => Err(unknown(key, "WholeDatasetRecorder", &[])),
            None => Ok(()),
        }
    }
}

/// Predictor whose fit honors a `should_succeed` fit parameter.
///
/// `should_succeed` defaults to true; false fails the fit. Any other fit
/// parameter is rejected. Predictions are all ones.
#[derive(Debug, Clone, Default)]
pub struct FitParamStub {
    fitted: bool,
}

impl FitParamStub {
    /// Creates an unfitted stub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Estimator for FitParamStub {
    fn kind(&self) -> &'static str {
        "FitParamStub"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::predictor()
    }

    fn reset(&mut self) {
        self.fitted = false;
    }

    fn partial_fit(&mut self, _batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        Ok(())
    }

    fn finish_fit(&mut self, params: &FitParams) -> Result<(), BlockflowError> {
        if let Some(key) = params.keys().find(|k| k.as_str() != "should_succeed") {
            return Err(EstimatorError::new("FitParamStub", format!("unexpected fit parameter '{key}'")).into());
        }
        let succeed = params
            .get("should_succeed")
            .map_or(Some(true), serde_json::Value::as_bool)
            .ok_or_else(|| EstimatorError::new("FitParamStub", "should_succeed must be a bool"))?;
        if !succeed {
            return Err(EstimatorError::new("FitParamStub", "asked to fail").into());
        }
        self.fitted = true;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn predict(&self, block: &Block) -> Result<Block, BlockflowError> {
        if !self.fitted {
            return Err(NotFittedError::new("FitParamStub").into());
        }
        Ok(Block::Vector(Array1::ones(block.n_rows())))
    }

    fn get_params(&self, _deep: bool) -> Params {
        Params::new()
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        match params.keys().next() {
            Some(key) => Err(unknown(key, "FitParamStub", &[])),
            None => Ok(()),
        }
    }
}

/// Transformer that declares it cannot be fitted.
#[derive(Debug, Clone, Default)]
pub struct NoFitStub;

impl NoFitStub {
    /// Creates the stub.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Estimator for NoFitStub {
    fn kind(&self) -> &'static str {
        "NoFitStub"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            fit: false,
            transform: true,
            predict: false,
        }
    }

    fn is_fitted(&self) -> bool {
        false
    }

    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        Ok(block.clone())
    }

    fn get_params(&self, _deep: bool) -> Params {
        Params::new()
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        match params.keys().next() {
            Some(key) => Err(unknown(key, "NoFitStub", &[])),
            None => Ok(()),
        }
    }
}

/// Transformer that fails in fit or in transform.
#[derive(Debug, Clone)]
pub struct FailingTransformer {
    fail_fit: bool,
    fitted: bool,
}

impl FailingTransformer {
    /// Fails on the first block seen by fit.
    #[must_use]
    pub fn failing_fit() -> Self {
        Self {
            fail_fit: true,
            fitted: false,
        }
    }

    /// Fits, then fails every transform.
    #[must_use]
    pub fn failing_transform() -> Self {
        Self {
            fail_fit: false,
            fitted: false,
        }
    }
}

impl Estimator for FailingTransformer {
    fn kind(&self) -> &'static str {
        "FailingTransformer"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::transformer()
    }

    fn reset(&mut self) {
        self.fitted = false;
    }

    fn partial_fit(&mut self, _batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        if self.fail_fit {
            return Err(EstimatorError::new("FailingTransformer", "fit failed").into());
        }
        Ok(())
    }

    fn finish_fit(&mut self, _params: &FitParams) -> Result<(), BlockflowError> {
        self.fitted = true;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn transform(&self, _block: &Block) -> Result<Block, BlockflowError> {
        Err(EstimatorError::new("FailingTransformer", "transform failed").into())
    }

    fn get_params(&self, _deep: bool) -> Params {
        Params::new()
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        match params.keys().next() {
            Some(key) => Err(unknown(key, "FailingTransformer", &[])),
            None => Ok(()),
        }
    }
}

/// Transformer that drops the first row of every block.
#[derive(Debug, Clone, Default)]
pub struct RowDropper {
    fitted: bool,
}

impl RowDropper {
    /// Creates an unfitted dropper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Estimator for RowDropper {
    fn kind(&self) -> &'static str {
        "RowDropper"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::transformer()
    }

    fn reset(&mut self) {
        self.fitted = false;
    }

    fn partial_fit(&mut self, _batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        Ok(())
    }

    fn finish_fit(&mut self, _params: &FitParams) -> Result<(), BlockflowError> {
        self.fitted = true;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        let n = block.n_rows();
        block.slice_rows(n.min(1)..n)
    }

    fn get_params(&self, _deep: bool) -> Params {
        Params::new()
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        match params.keys().next() {
            Some(key) => Err(unknown(key, "RowDropper", &[])),
            None => Ok(()),
        }
    }
}

/// Multiplies every value by `factor`.
#[derive(Debug, Clone)]
pub struct Scaler {
    factor: f64,
    fitted: bool,
}

impl Scaler {
    /// Creates an unfitted scaler.
    #[must_use]
    pub fn new(factor: f64) -> Self {
        Self { factor, fitted: false }
    }

    fn set_param(&mut self, key: &str, value: &ParamValue) -> Result<(), BlockflowError> {
        match key {
            "factor" => {
                self.factor = value.parse(key)?;
                Ok(())
            }
            _ => Err(unknown(key, "Scaler", &["factor"])),
        }
    }
}

impl Estimator for Scaler {
    fn kind(&self) -> &'static str {
        "Scaler"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::transformer()
    }

    fn reset(&mut self) {
        self.fitted = false;
    }

    fn partial_fit(&mut self, _batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        Ok(())
    }

    fn finish_fit(&mut self, _params: &FitParams) -> Result<(), BlockflowError> {
        self.fitted = true;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        if !self.fitted {
            return Err(NotFittedError::new("Scaler").into());
        }
        block.scale(self.factor)
    }

    fn get_params(&self, _deep: bool) -> Params {
        crate::params! { "factor" => self.factor }
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        set_all(self, params, Self::set_param)
    }

    fn check_params(&self, params: &Params) -> Result<(), BlockflowError> {
        self.clone().set_params(params.clone())
    }
}
