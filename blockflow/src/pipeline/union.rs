//! Parallel composition of transformers.

use super::composition::{Composition, TransformRule};
use super::FitState;
use crate::blocks::{Block, BlockStore, Dataset};
use crate::config::ExecutionConfig;
use crate::errors::{AlignmentError, BlockflowError, CompositionError, NotFittedError, ParameterError};
use crate::estimator::{Capabilities, Estimator, EstimatorHandle, FitMode, FitParams};
use crate::events::{EventSink, RunEvents};
use crate::params::{join_key, route_fit_params, ParamValue, Params, RoutedParams};
use crate::stages::Stage;
use crate::utils::elapsed_ms;
use rayon::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const KIND: &str = "FeatureUnion";
const OWN_PARAMS: &[&str] = &["n_jobs", "transformer_weights", "verbose"];

/// Named transformers applied to the same input, their outputs
/// concatenated column-wise in declaration order.
///
/// Each branch output can be scaled by a weight before concatenation.
/// Branches are fitted in parallel unless `n_jobs` is 1.
pub struct FeatureUnion {
    branches: Composition,
    weights: BTreeMap<String, f64>,
    n_jobs: Option<usize>,
    verbose: bool,
    state: FitState,
    event_sink: Option<Arc<dyn EventSink>>,
}

struct Prepared {
    routed: RoutedParams,
    n_jobs: Option<Option<usize>>,
    weights: Option<BTreeMap<String, f64>>,
    verbose: Option<bool>,
}

impl FeatureUnion {
    /// Builds a union from `(name, transformer)` pairs, in order.
    ///
    /// # Errors
    ///
    /// Fails if there are no branches, a name is invalid or repeated, or a
    /// branch cannot fit and transform.
    pub fn new<S: Into<String>>(branches: Vec<(S, EstimatorHandle)>) -> Result<Self, CompositionError> {
        let branches = branches.into_iter().map(|(n, h)| (n.into(), h)).collect();
        Ok(Self {
            branches: Composition::new(KIND, TransformRule::All, branches)?,
            weights: BTreeMap::new(),
            n_jobs: None,
            verbose: false,
            state: FitState::Unfit,
            event_sink: None,
        })
    }

    /// Multiplies each named branch's output by its weight. Branches without
    /// a weight use 1.
    ///
    /// # Errors
    ///
    /// Fails if a weight names a branch that does not exist.
    pub fn with_weights<S, I>(mut self, weights: I) -> Result<Self, CompositionError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, f64)>,
    {
        let weights: BTreeMap<String, f64> = weights.into_iter().map(|(n, w)| (n.into(), w)).collect();
        self.check_weights(&weights)?;
        self.weights = weights;
        Ok(self)
    }

    /// Caps branch parallelism during `fit`; `Some(1)` fits sequentially.
    #[must_use]
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Logs branch progress at info level instead of debug.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sends lifecycle events to `sink` instead of the global sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Applies `n_jobs` and `verbose` from `config`.
    #[must_use]
    pub fn with_config(self, config: &ExecutionConfig) -> Self {
        self.with_n_jobs(config.n_jobs).with_verbose(config.verbose)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FitState {
        self.state
    }

    /// Branch parallelism.
    #[must_use]
    pub fn n_jobs(&self) -> Option<usize> {
        self.n_jobs
    }

    /// Weight applied to a branch's output.
    #[must_use]
    pub fn weight(&self, branch: &str) -> f64 {
        self.weights.get(branch).copied().unwrap_or(1.0)
    }

    /// Branches in order.
    #[must_use]
    pub fn branches(&self) -> &[Stage] {
        self.branches.stages()
    }

    /// Handles of every branch, by name.
    #[must_use]
    pub fn named_transformers(&self) -> BTreeMap<String, EstimatorHandle> {
        self.branches
            .stages()
            .iter()
            .map(|s| (s.name().to_string(), s.handle().clone()))
            .collect()
    }

    /// Handle of one branch.
    #[must_use]
    pub fn branch(&self, name: &str) -> Option<&EstimatorHandle> {
        self.branches.get(name).map(Stage::handle)
    }

    /// Fits every branch on the same input.
    ///
    /// `fit_params` keys must be `branch__param`. Branches run concurrently
    /// unless `n_jobs` is 1; when several fail, the error of the first
    /// failing branch in declaration order is returned.
    ///
    /// # Errors
    ///
    /// Fails before any branch runs if a fit parameter cannot be routed;
    /// otherwise propagates a branch error unchanged.
    pub fn fit(&mut self, data: &Dataset, fit_params: &FitParams) -> Result<&mut Self, BlockflowError> {
        let routed = route_fit_params(KIND, &self.branches.names(), fit_params.clone())?;
        let events = RunEvents::start(self.event_sink.as_ref(), KIND);
        self.state = FitState::Fitting;
        events.emit(
            "union.fit.started",
            json!({ "branches": self.branches.names(), "n_jobs": self.n_jobs }),
        );
        let started = Instant::now();

        match self.fit_branches(data, &routed, &events) {
            Ok(()) => {
                self.state = FitState::Fit;
                events.emit("union.fit.completed", json!({ "duration_ms": elapsed_ms(started) }));
                Ok(self)
            }
            Err(e) => {
                self.state = FitState::Unfit;
                warn!(run_id = events.run_id(), error = %e, "FeatureUnion fit failed");
                events.emit("union.fit.failed", json!({ "error": e.to_string() }));
                Err(e)
            }
        }
    }

    fn fit_branches(
        &self,
        data: &Dataset,
        routed: &BTreeMap<String, FitParams>,
        events: &RunEvents,
    ) -> Result<(), BlockflowError> {
        let no_params = FitParams::new();
        let total = self.branches.len();
        let fit_one = |(index, stage): (usize, &Stage)| -> Result<(), BlockflowError> {
            let params = routed.get(stage.name()).unwrap_or(&no_params);
            if self.verbose {
                info!("[FeatureUnion] ({} of {}) fitting {}", index + 1, total, stage.name());
            } else {
                debug!(branch = stage.name(), index, "Fitting union branch");
            }
            events.emit("stage.fit.started", json!({ "stage": stage.name(), "index": index }));
            let started = Instant::now();
            match stage.fit(data, params) {
                Ok(()) => {
                    events.emit(
                        "stage.fit.completed",
                        json!({ "stage": stage.name(), "duration_ms": elapsed_ms(started) }),
                    );
                    Ok(())
                }
                Err(e) => {
                    warn!(branch = stage.name(), error = %e, "Union branch fit failed");
                    events.emit(
                        "stage.fit.failed",
                        json!({ "stage": stage.name(), "error": e.to_string() }),
                    );
                    Err(e)
                }
            }
        };

        let stages = self.branches.stages();
        let results: Vec<Result<(), BlockflowError>> = match self.n_jobs {
            Some(1) => stages.iter().enumerate().map(fit_one).collect(),
            Some(n) => ExecutionConfig::new()
                .with_n_jobs(Some(n))
                .thread_pool()?
                .install(|| stages.par_iter().enumerate().map(fit_one).collect()),
            None => stages.par_iter().enumerate().map(fit_one).collect(),
        };
        results.into_iter().collect()
    }

    /// Transforms the input with every branch and concatenates the
    /// (weighted) outputs block by block, in declaration order.
    ///
    /// # Errors
    ///
    /// Fails if the union is not fitted. A branch whose output row count
    /// differs from its input surfaces as an alignment error on execution.
    pub fn transform(&self, data: &Dataset) -> Result<Dataset, BlockflowError> {
        if !self.state.is_fit() {
            return Err(NotFittedError::new(KIND).into());
        }
        let features = data.features()?;
        let outputs = self
            .branches
            .stages()
            .iter()
            .map(|stage| stage.transform_store(features))
            .collect::<Result<Vec<BlockStore>, _>>()?;
        let weights: Vec<f64> = self
            .branches
            .stages()
            .iter()
            .map(|s| self.weight(s.name()))
            .collect();

        let (first, rest) = outputs
            .split_first()
            .ok_or_else(|| BlockflowError::Internal("union has no branches".into()))?;
        let rest: Vec<&BlockStore> = rest.iter().collect();
        let combined = first.zip_with(&rest, "union.hstack", move |blocks| {
            concat_weighted(blocks, &weights)
        })?;
        data.with_features(combined)
    }

    /// Fits, then transforms the same data.
    ///
    /// # Errors
    ///
    /// See [`fit`](Self::fit) and [`transform`](Self::transform).
    pub fn fit_transform(&mut self, data: &Dataset, fit_params: &FitParams) -> Result<Dataset, BlockflowError> {
        self.fit(data, fit_params)?;
        self.transform(data)
    }

    /// `branch__feature` for every output column, in output order.
    ///
    /// # Errors
    ///
    /// Fails if any branch does not expose feature names.
    pub fn get_feature_names(&self) -> Result<Vec<String>, BlockflowError> {
        let mut names = Vec::new();
        for stage in self.branches.stages() {
            names.extend(
                stage
                    .feature_names()?
                    .into_iter()
                    .map(|f| join_key(stage.name(), &f)),
            );
        }
        Ok(names)
    }

    /// Own parameters (`n_jobs`, `transformer_weights`, `verbose`); with
    /// `deep`, every branch and branch parameter as well.
    #[must_use]
    pub fn get_params(&self, deep: bool) -> Params {
        let mut own = Params::new();
        own.insert("n_jobs".to_string(), ParamValue::from(json!(self.n_jobs)));
        let weights = if self.weights.is_empty() {
            Value::Null
        } else {
            json!(self.weights)
        };
        own.insert("transformer_weights".to_string(), ParamValue::from(weights));
        own.insert("verbose".to_string(), ParamValue::from(self.verbose));
        self.branches.params(own, deep)
    }

    /// Sets own parameters, replaces branches, and routes `branch__param`
    /// keys. Nothing is applied unless every key is valid.
    ///
    /// # Errors
    ///
    /// Fails on unknown keys, unknown branch prefixes, invalid values, or
    /// weights naming unknown branches.
    pub fn set_params(&mut self, params: Params) -> Result<&mut Self, BlockflowError> {
        let prepared = self.prepare(params)?;
        self.branches.apply(prepared.routed)?;
        if let Some(n_jobs) = prepared.n_jobs {
            self.n_jobs = n_jobs;
        }
        if let Some(weights) = prepared.weights {
            self.weights = weights;
        }
        if let Some(verbose) = prepared.verbose {
            self.verbose = verbose;
        }
        Ok(self)
    }

    fn prepare(&self, params: Params) -> Result<Prepared, BlockflowError> {
        let routed = self.branches.route(KIND, OWN_PARAMS, params)?;
        let n_jobs = routed
            .own
            .get("n_jobs")
            .map(|v| v.parse::<Option<usize>>("n_jobs"))
            .transpose()?;
        let weights = routed
            .own
            .get("transformer_weights")
            .map(|v| v.parse::<Option<BTreeMap<String, f64>>>("transformer_weights"))
            .transpose()?
            .map(Option::unwrap_or_default);
        if let Some(weights) = &weights {
            self.check_weights(weights).map_err(|e| {
                ParameterError::invalid_value("transformer_weights", e.message)
            })?;
        }
        let verbose = routed
            .own
            .get("verbose")
            .map(|v| v.parse::<bool>("verbose"))
            .transpose()?;
        Ok(Prepared {
            routed,
            n_jobs,
            weights,
            verbose,
        })
    }

    fn check_weights(&self, weights: &BTreeMap<String, f64>) -> Result<(), CompositionError> {
        match weights.keys().find(|name| self.branches.get(name).is_none()) {
            Some(name) => Err(CompositionError::unknown_weight(name)),
            None => Ok(()),
        }
    }
}

fn concat_weighted(blocks: &[&Block], weights: &[f64]) -> Result<Block, BlockflowError> {
    let rows = blocks.first().map_or(0, |b| b.n_rows());
    if let Some(bad) = blocks.iter().find(|b| b.n_rows() != rows) {
        return Err(AlignmentError::new("union.hstack", format!("{rows} rows"), format!("{} rows", bad.n_rows())).into());
    }
    let scaled = blocks
        .iter()
        .zip(weights)
        .map(|(block, &w)| block.scale(w))
        .collect::<Result<Vec<Block>, _>>()?;
    let refs: Vec<&Block> = scaled.iter().collect();
    Block::hstack(&refs)
}

impl Clone for FeatureUnion {
    fn clone(&self) -> Self {
        Self {
            branches: self.branches.deep_clone(),
            weights: self.weights.clone(),
            n_jobs: self.n_jobs,
            verbose: self.verbose,
            state: self.state,
            event_sink: self.event_sink.clone(),
        }
    }
}

impl fmt::Debug for FeatureUnion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureUnion")
            .field("branches", &self.branches.stages())
            .field("weights", &self.weights)
            .field("n_jobs", &self.n_jobs)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FeatureUnion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeatureUnion(")?;
        for (i, stage) in self.branches.stages().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", stage.name(), stage.kind())?;
            if let Some(w) = self.weights.get(stage.name()) {
                write!(f, "*{w}")?;
            }
        }
        write!(f, ")")
    }
}

impl Estimator for FeatureUnion {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::transformer()
    }

    fn fit_mode(&self) -> FitMode {
        FitMode::Distributed
    }

    fn fit_distributed(&mut self, data: &Dataset, params: &FitParams) -> Result<(), BlockflowError> {
        self.fit(data, params).map(|_| ())
    }

    fn is_fitted(&self) -> bool {
        self.state.is_fit()
    }

    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        if !self.state.is_fit() {
            return Err(NotFittedError::new(KIND).into());
        }
        let outputs = self
            .branches
            .stages()
            .iter()
            .map(|s| s.handle().read().transform(block))
            .collect::<Result<Vec<Block>, _>>()?;
        let weights: Vec<f64> = self
            .branches
            .stages()
            .iter()
            .map(|s| self.weight(s.name()))
            .collect();
        let refs: Vec<&Block> = outputs.iter().collect();
        concat_weighted(&refs, &weights)
    }

    fn get_params(&self, deep: bool) -> Params {
        FeatureUnion::get_params(self, deep)
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        FeatureUnion::set_params(self, params).map(|_| ())
    }

    fn check_params(&self, params: &Params) -> Result<(), BlockflowError> {
        self.prepare(params.clone()).map(|_| ())
    }

    fn feature_names(&self) -> Result<Vec<String>, BlockflowError> {
        self.get_feature_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::params;
    use crate::testing::{
        assert_dense_close, junkfood, CountVectorizer, FailingTransformer, IdentityTransformer,
        NearestCentroid, RowDropper, Scaler,
    };
    use ndarray::array;

    fn dense_data() -> Dataset {
        Dataset::from(
            BlockStore::from_block(&Block::Dense(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]), 2, None)
                .unwrap(),
        )
    }

    #[test]
    fn test_rejects_predictors_and_unknown_weights() {
        let err = FeatureUnion::new(vec![("clf", EstimatorHandle::new(NearestCentroid::new()))]).unwrap_err();
        assert_eq!(err.error_info.code, "COMPOSE-004-NOT_TRANSFORMER");

        let err = FeatureUnion::new(vec![("id", EstimatorHandle::new(IdentityTransformer::new()))])
            .unwrap()
            .with_weights([("missing", 2.0)])
            .unwrap_err();
        assert_eq!(err.error_info.code, "COMPOSE-006-UNKNOWN_WEIGHT");
    }

    #[test]
    fn test_concatenates_in_declaration_order_with_weights() {
        let mut union = FeatureUnion::new(vec![
            ("id", EstimatorHandle::new(IdentityTransformer::new())),
            ("double", EstimatorHandle::new(Scaler::new(2.0))),
        ])
        .unwrap()
        .with_weights([("double", 10.0)])
        .unwrap();

        let out = union.fit_transform(&dense_data(), &FitParams::new()).unwrap();
        let dense = out.collect_features().unwrap().to_dense().unwrap();
        assert_dense_close(
            &dense,
            &array![[1.0, 2.0, 20.0, 40.0], [3.0, 4.0, 60.0, 80.0], [5.0, 6.0, 100.0, 120.0]],
            1e-12,
        );
    }

    #[test]
    fn test_sequential_and_parallel_fits_agree() {
        let build = |n_jobs| {
            FeatureUnion::new(vec![
                ("words", EstimatorHandle::new(CountVectorizer::new())),
                ("chars", EstimatorHandle::new(CountVectorizer::char_wb(2, 3))),
            ])
            .unwrap()
            .with_n_jobs(n_jobs)
        };
        let data = junkfood(3).unwrap();
        let mut sequential = build(Some(1));
        let mut parallel = build(Some(2));
        let a = sequential.fit_transform(&data, &FitParams::new()).unwrap();
        let b = parallel.fit_transform(&data, &FitParams::new()).unwrap();
        assert_eq!(a.collect_features().unwrap(), b.collect_features().unwrap());
        assert_eq!(sequential.get_feature_names().unwrap(), parallel.get_feature_names().unwrap());
    }

    #[test]
    fn test_row_dropping_branch_is_alignment_error() {
        let mut union = FeatureUnion::new(vec![
            ("id", EstimatorHandle::new(IdentityTransformer::new())),
            ("drop", EstimatorHandle::new(RowDropper::new())),
        ])
        .unwrap();
        let out = union.fit_transform(&dense_data(), &FitParams::new()).unwrap();
        assert!(out.collect_features().unwrap_err().is_alignment());
    }

    #[test]
    fn test_first_failing_branch_is_reported() {
        let sink = Arc::new(CollectingEventSink::new());
        let mut union = FeatureUnion::new(vec![
            ("ok", EstimatorHandle::new(IdentityTransformer::new())),
            ("bad", EstimatorHandle::new(FailingTransformer::failing_fit())),
        ])
        .unwrap()
        .with_event_sink(sink.clone());
        let err = union.fit(&dense_data(), &FitParams::new()).unwrap_err();
        assert!(err.to_string().contains("FailingTransformer"));
        assert_eq!(union.state(), FitState::Unfit);
        assert_eq!(sink.events_of_type("union.fit.failed").len(), 1);
    }

    #[test]
    fn test_params_round_trip_and_weight_validation() {
        let mut union = FeatureUnion::new(vec![("id", EstimatorHandle::new(IdentityTransformer::new()))]).unwrap();
        union
            .set_params(params! { "transformer_weights" => json!({"id": 0.5}), "n_jobs" => 1 })
            .unwrap();
        assert_eq!(union.weight("id"), 0.5);
        assert_eq!(union.n_jobs(), Some(1));

        let err = union
            .set_params(params! { "transformer_weights" => json!({"nope": 1.0}) })
            .unwrap_err();
        assert!(matches!(err, BlockflowError::Parameter(ParameterError::InvalidValue { .. })));
        assert_eq!(union.weight("id"), 0.5);

        let snapshot = union.get_params(true);
        union.set_params(snapshot.clone()).unwrap();
        assert_eq!(union.get_params(true), snapshot);
    }

    #[test]
    fn test_transform_before_fit() {
        let union = FeatureUnion::new(vec![("id", EstimatorHandle::new(IdentityTransformer::new()))]).unwrap();
        assert!(union.transform(&dense_data()).unwrap_err().is_not_fitted());
        assert_eq!(union.to_string(), "FeatureUnion(id=IdentityTransformer)");
    }
}
