//! Stage wrapper: runs an estimator against blocked input.
//!
//! A [`Stage`] pairs a step name with an [`EstimatorHandle`] and adapts the
//! estimator's per-block contract to whole [`Dataset`]s. Fitting follows the
//! estimator's [`FitMode`]; transforms and predictions are lazy
//! [`BlockStore::map_blocks`] calls over a frozen snapshot of the estimator.

use crate::blocks::{BlockStore, Dataset};
use crate::errors::{BlockflowError, NotFittedError};
use crate::estimator::{Capabilities, Estimator, EstimatorHandle, FitMode, FitParams};
use std::sync::Arc;
use tracing::debug;

/// A named estimator inside a composition.
#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    handle: EstimatorHandle,
}

impl Stage {
    /// Creates a stage.
    pub fn new(name: impl Into<String>, handle: EstimatorHandle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    /// Step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped estimator.
    #[must_use]
    pub fn handle(&self) -> &EstimatorHandle {
        &self.handle
    }

    pub(crate) fn set_handle(&mut self, handle: EstimatorHandle) {
        self.handle = handle;
    }

    /// Estimator kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.handle.kind()
    }

    /// Estimator capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.handle.read().capabilities()
    }

    /// Returns true once the estimator has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.handle.read().is_fitted()
    }

    /// Fits the estimator on `data`.
    ///
    /// Incremental estimators are fitted on a working copy and committed only
    /// if every block succeeds; distributed estimators receive the whole
    /// dataset in a single call.
    ///
    /// # Errors
    ///
    /// Propagates the estimator's error unchanged.
    pub fn fit(&self, data: &Dataset, params: &FitParams) -> Result<(), BlockflowError> {
        let mode = self.handle.read().fit_mode();
        debug!(
            stage = %self.name,
            kind = self.kind(),
            mode = %mode,
            blocks = data.n_blocks(),
            "Fitting stage"
        );
        match mode {
            FitMode::Incremental => {
                let batches = data.batches()?;
                let mut work = self.handle.read().clone_box();
                work.reset();
                for batch in &batches {
                    work.partial_fit(&batch.as_batch(), params)?;
                }
                work.finish_fit(params)?;
                *self.handle.write() = work;
            }
            FitMode::Distributed => {
                self.handle.write().fit_distributed(data, params)?;
            }
        }
        debug!(stage = %self.name, "Stage fitted");
        Ok(())
    }

    /// Returns a dataset whose features are this stage's transform of
    /// `data`'s features. Nothing executes until the result is consumed.
    ///
    /// # Errors
    ///
    /// Fails if the estimator cannot transform or is not fitted.
    pub fn transform(&self, data: &Dataset) -> Result<Dataset, BlockflowError> {
        let out = self.transform_store(data.features()?)?;
        data.with_features(out)
    }

    /// Transforms a single-column store.
    ///
    /// # Errors
    ///
    /// Fails if the estimator cannot transform or is not fitted.
    pub fn transform_store(&self, store: &BlockStore) -> Result<BlockStore, BlockflowError> {
        let estimator = self.frozen(self.capabilities().transform, "transform")?;
        Ok(store.map_blocks(format!("{}.transform", self.name), move |block| {
            estimator.transform(block)
        }))
    }

    /// Fits, then transforms the same data.
    ///
    /// # Errors
    ///
    /// See [`fit`](Self::fit) and [`transform`](Self::transform).
    pub fn fit_transform(&self, data: &Dataset, params: &FitParams) -> Result<Dataset, BlockflowError> {
        self.fit(data, params)?;
        self.transform(data)
    }

    /// Predicts every block of `data`'s features.
    ///
    /// # Errors
    ///
    /// Fails if the estimator cannot predict or is not fitted.
    pub fn predict(&self, data: &Dataset) -> Result<BlockStore, BlockflowError> {
        let estimator = self.frozen(self.capabilities().predict, "predict")?;
        Ok(data
            .features()?
            .map_blocks(format!("{}.predict", self.name), move |block| estimator.predict(block)))
    }

    /// Output feature names of the estimator.
    ///
    /// # Errors
    ///
    /// Fails if the estimator does not expose feature names.
    pub fn feature_names(&self) -> Result<Vec<String>, BlockflowError> {
        self.handle.read().feature_names()
    }

    pub(crate) fn deep_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handle: self.handle.deep_clone(),
        }
    }

    fn frozen(&self, capable: bool, operation: &str) -> Result<Arc<dyn Estimator>, BlockflowError> {
        if !capable {
            return Err(BlockflowError::unsupported(self.name.as_str(), operation));
        }
        let estimator = self.handle.snapshot();
        if !estimator.is_fitted() {
            return Err(NotFittedError::new(self.name.as_str()).into());
        }
        Ok(estimator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::Block;
    use crate::testing::{
        junkfood, CountVectorizer, FailingTransformer, NearestCentroid, Scaler, WholeDatasetRecorder,
    };
    use ndarray::array;

    #[test]
    fn test_transform_before_fit_fails() {
        let stage = Stage::new("vect", EstimatorHandle::new(CountVectorizer::new()));
        let data = Dataset::from(BlockStore::from_texts(["a b"], 1, None).unwrap());
        assert!(stage.transform(&data).unwrap_err().is_not_fitted());
    }

    #[test]
    fn test_incremental_fit_matches_single_block() {
        let data = junkfood(3).unwrap();
        let blocked = Stage::new("vect", EstimatorHandle::new(CountVectorizer::new()));
        blocked.fit(&data, &FitParams::new()).unwrap();

        let whole = Dataset::from(BlockStore::from_block(&data.collect_features().unwrap(), 1, None).unwrap());
        let single = Stage::new("vect", EstimatorHandle::new(CountVectorizer::new()));
        single.fit(&whole, &FitParams::new()).unwrap();

        assert_eq!(blocked.feature_names().unwrap(), single.feature_names().unwrap());
        assert_eq!(
            blocked.transform(&data).unwrap().collect_features().unwrap(),
            single.transform(&whole).unwrap().collect_features().unwrap()
        );
    }

    #[test]
    fn test_transform_preserves_layout() {
        let data = junkfood(2).unwrap();
        let stage = Stage::new("vect", EstimatorHandle::new(CountVectorizer::new()));
        let out = stage.fit_transform(&data, &FitParams::new()).unwrap();
        assert_eq!(out.layout(), data.layout());
        assert!(out.target().is_some());
    }

    #[test]
    fn test_distributed_fit_sees_whole_dataset_once() {
        let data = junkfood(3).unwrap();
        let recorder = WholeDatasetRecorder::new();
        let stage = Stage::new("record", EstimatorHandle::new(recorder.clone()));
        assert_eq!(stage.handle().read().fit_mode(), FitMode::Distributed);

        let out = stage.fit_transform(&data, &FitParams::new()).unwrap();
        assert!(stage.is_fitted());
        assert_eq!(recorder.seen(), vec![(6, 3)]);
        assert_eq!(out.collect_features().unwrap(), data.collect_features().unwrap());
    }

    #[test]
    fn test_failed_fit_leaves_estimator_untouched() {
        let handle = EstimatorHandle::new(FailingTransformer::failing_fit());
        let stage = Stage::new("bad", handle.clone());
        let data = Dataset::from(BlockStore::from_block(&Block::Dense(array![[1.0], [2.0]]), 2, None).unwrap());

        let err = stage.fit(&data, &FitParams::new()).unwrap_err();
        assert!(matches!(err, BlockflowError::Estimator(_)));
        assert!(!handle.read().is_fitted());
    }

    #[test]
    fn test_transform_uses_snapshot_taken_at_build_time() {
        let handle = EstimatorHandle::new(Scaler::new(2.0));
        let stage = Stage::new("scale", handle.clone());
        let data = Dataset::from(BlockStore::from_block(&Block::Dense(array![[1.0], [2.0]]), 1, None).unwrap());
        stage.fit(&data, &FitParams::new()).unwrap();

        let out = stage.transform(&data).unwrap();
        handle
            .write()
            .set_params(crate::params! { "factor" => 10.0 })
            .unwrap();
        assert_eq!(out.collect_features().unwrap(), Block::Dense(array![[2.0], [4.0]]));
    }

    #[test]
    fn test_predict_requires_capability() {
        let data = Dataset::from(BlockStore::from_block(&Block::Dense(array![[1.0]]), 1, None).unwrap());
        let stage = Stage::new("scale", EstimatorHandle::new(Scaler::new(1.0)));
        stage.fit(&data, &FitParams::new()).unwrap();
        let err = stage.predict(&data).unwrap_err();
        assert!(matches!(err, BlockflowError::Unsupported { .. }));

        let clf = Stage::new("clf", EstimatorHandle::new(NearestCentroid::new()));
        assert!(clf.predict(&data).unwrap_err().is_not_fitted());
    }
}
