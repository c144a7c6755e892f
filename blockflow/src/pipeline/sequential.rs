//! Sequential composition of stages.

use super::composition::{Composition, TransformRule};
use super::FitState;
use crate::blocks::{Block, BlockStore, Dataset};
use crate::config::ExecutionConfig;
use crate::errors::{BlockflowError, CompositionError, NotFittedError};
use crate::estimator::{Capabilities, Estimator, EstimatorHandle, FitMode, FitParams};
use crate::events::{EventSink, RunEvents};
use crate::params::{route_fit_params, ParamValue, Params, RoutedParams};
use crate::stages::Stage;
use crate::utils::elapsed_ms;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const KIND: &str = "Pipeline";
const OWN_PARAMS: &[&str] = &["verbose"];

/// An ordered chain of named stages.
///
/// `fit` fits each stage on the output of the previous stage's transform;
/// the last stage is only fitted. Every stage but the last must implement
/// `transform`. A pipeline is itself an [`Estimator`], so it can be nested
/// inside other pipelines and unions.
///
/// Cloning copies every step's estimator; the clone shares no learned
/// state with the original.
pub struct Pipeline {
    steps: Composition,
    state: FitState,
    verbose: bool,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl Pipeline {
    /// Builds a pipeline from `(name, estimator)` pairs, in order.
    ///
    /// The pipeline shares the given handles: parameters set through the
    /// pipeline are visible through them, and fitting the pipeline fits them.
    ///
    /// # Errors
    ///
    /// Fails if there are no steps, a name is empty, repeated or contains
    /// `"__"`, a step cannot fit, or an intermediate step cannot transform.
    pub fn new<S: Into<String>>(steps: Vec<(S, EstimatorHandle)>) -> Result<Self, CompositionError> {
        let steps = steps.into_iter().map(|(n, h)| (n.into(), h)).collect();
        Ok(Self {
            steps: Composition::new(KIND, TransformRule::AllButLast, steps)?,
            state: FitState::Unfit,
            verbose: false,
            event_sink: None,
        })
    }

    /// Logs stage progress at info level instead of debug.
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

    /// Applies the relevant settings of `config`.
    #[must_use]
    pub fn with_config(self, config: &ExecutionConfig) -> Self {
        self.with_verbose(config.verbose)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FitState {
        self.state
    }

    /// Whether progress is logged at info level.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Stages in order.
    #[must_use]
    pub fn steps(&self) -> &[Stage] {
        self.steps.stages()
    }

    /// Step names in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.names()
    }

    /// Handles of every step, by name.
    #[must_use]
    pub fn named_steps(&self) -> BTreeMap<String, EstimatorHandle> {
        self.steps
            .stages()
            .iter()
            .map(|s| (s.name().to_string(), s.handle().clone()))
            .collect()
    }

    /// Handle of one step.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&EstimatorHandle> {
        self.steps.get(name).map(Stage::handle)
    }

    /// Fits every stage in order.
    ///
    /// `fit_params` keys must be `step__param`; each reaches its own step.
    /// On failure the pipeline returns to [`FitState::Unfit`], but stages
    /// that already finished fitting keep their learned state.
    ///
    /// # Errors
    ///
    /// Fails before any stage runs if a fit parameter cannot be routed;
    /// otherwise propagates the first stage error unchanged.
    pub fn fit(&mut self, data: &Dataset, fit_params: &FitParams) -> Result<&mut Self, BlockflowError> {
        let routed = route_fit_params(KIND, &self.steps.names(), fit_params.clone())?;
        let events = RunEvents::start(self.event_sink.as_ref(), KIND);
        self.state = FitState::Fitting;
        events.emit(
            "pipeline.fit.started",
            json!({ "steps": self.steps.names(), "blocks": data.n_blocks() }),
        );
        let started = Instant::now();

        match self.fit_stages(data, &routed, &events) {
            Ok(()) => {
                self.state = FitState::Fit;
                events.emit(
                    "pipeline.fit.completed",
                    json!({ "duration_ms": elapsed_ms(started) }),
                );
                Ok(self)
            }
            Err(e) => {
                self.state = FitState::Unfit;
                warn!(run_id = events.run_id(), error = %e, "Pipeline fit failed");
                events.emit("pipeline.fit.failed", json!({ "error": e.to_string() }));
                Err(e)
            }
        }
    }

    fn fit_stages(
        &self,
        data: &Dataset,
        routed: &BTreeMap<String, FitParams>,
        events: &RunEvents,
    ) -> Result<(), BlockflowError> {
        let no_params = FitParams::new();
        let last = self.steps.len() - 1;
        let mut current = data.clone();
        for (index, stage) in self.steps.stages().iter().enumerate() {
            let params = routed.get(stage.name()).unwrap_or(&no_params);
            self.log_stage(stage, index, "fitting");
            events.emit(
                "stage.fit.started",
                json!({ "stage": stage.name(), "kind": stage.kind(), "index": index }),
            );
            let started = Instant::now();

            let outcome = if index < last {
                match stage.fit_transform(&current, params).and_then(|next| next.cache()) {
                    Ok(next) => {
                        current = next;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            } else {
                stage.fit(&current, params)
            };

            match outcome {
                Ok(()) => events.emit(
                    "stage.fit.completed",
                    json!({ "stage": stage.name(), "duration_ms": elapsed_ms(started) }),
                ),
                Err(e) => {
                    warn!(stage = stage.name(), error = %e, "Stage fit failed");
                    events.emit(
                        "stage.fit.failed",
                        json!({ "stage": stage.name(), "error": e.to_string() }),
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Applies every stage's transform in order. Nothing executes until the
    /// result is consumed.
    ///
    /// # Errors
    ///
    /// Fails if the pipeline is not fitted or the last step cannot transform.
    pub fn transform(&self, data: &Dataset) -> Result<Dataset, BlockflowError> {
        self.check_fitted()?;
        self.steps
            .stages()
            .iter()
            .try_fold(data.clone(), |current, stage| stage.transform(&current))
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

    /// Transforms through every stage but the last, then predicts with the
    /// last.
    ///
    /// # Errors
    ///
    /// Fails if the pipeline is not fitted or the last step cannot predict.
    pub fn predict(&self, data: &Dataset) -> Result<BlockStore, BlockflowError> {
        self.check_fitted()?;
        let (last, head) = self
            .steps
            .stages()
            .split_last()
            .ok_or_else(|| BlockflowError::Internal("pipeline has no steps".into()))?;
        let features = head
            .iter()
            .try_fold(data.clone(), |current, stage| stage.transform(&current))?;
        last.predict(&features)
    }

    /// Output feature names of the last step.
    ///
    /// # Errors
    ///
    /// Fails if the last step does not expose feature names.
    pub fn get_feature_names(&self) -> Result<Vec<String>, BlockflowError> {
        self.steps.last().feature_names()
    }

    /// Own parameters (`verbose`); with `deep`, every step under its name
    /// and every step parameter under `step__param`.
    #[must_use]
    pub fn get_params(&self, deep: bool) -> Params {
        let mut own = Params::new();
        own.insert("verbose".to_string(), ParamValue::from(self.verbose));
        self.steps.params(own, deep)
    }

    /// Sets own parameters, replaces steps, and routes `step__param` keys.
    ///
    /// Every key is validated before anything is applied, so an unknown key
    /// leaves all parameters unchanged.
    ///
    /// # Errors
    ///
    /// Fails on unknown keys, unknown step prefixes, or invalid values.
    pub fn set_params(&mut self, params: Params) -> Result<&mut Self, BlockflowError> {
        let (routed, verbose) = self.prepare(params)?;
        self.steps.apply(routed)?;
        if let Some(verbose) = verbose {
            self.verbose = verbose;
        }
        Ok(self)
    }

    fn prepare(&self, params: Params) -> Result<(RoutedParams, Option<bool>), BlockflowError> {
        let routed = self.steps.route(KIND, OWN_PARAMS, params)?;
        let verbose = routed
            .own
            .get("verbose")
            .map(|v| v.parse::<bool>("verbose"))
            .transpose()?;
        Ok((routed, verbose))
    }

    fn check_fitted(&self) -> Result<(), NotFittedError> {
        if self.state.is_fit() {
            Ok(())
        } else {
            Err(NotFittedError::new(KIND))
        }
    }

    fn log_stage(&self, stage: &Stage, index: usize, action: &str) {
        if self.verbose {
            info!(
                "[Pipeline] ({} of {}) {} {}",
                index + 1,
                self.steps.len(),
                action,
                stage.name()
            );
        } else {
            debug!(stage = stage.name(), index, action, "Pipeline stage");
        }
    }
}

impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.deep_clone(),
            state: self.state,
            verbose: self.verbose,
            event_sink: self.event_sink.clone(),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps.stages())
            .field("state", &self.state)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline(")?;
        for (i, stage) in self.steps.stages().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", stage.name(), stage.kind())?;
        }
        write!(f, ")")
    }
}

impl Estimator for Pipeline {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn capabilities(&self) -> Capabilities {
        let last = self.steps.last().capabilities();
        Capabilities {
            fit: true,
            transform: last.transform,
            predict: last.predict,
        }
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
        self.check_fitted()?;
        let mut current = block.clone();
        for stage in self.steps.stages() {
            current = stage.handle().read().transform(&current)?;
        }
        Ok(current)
    }

    fn predict(&self, block: &Block) -> Result<Block, BlockflowError> {
        self.check_fitted()?;
        let (last, head) = self
            .steps
            .stages()
            .split_last()
            .ok_or_else(|| BlockflowError::Internal("pipeline has no steps".into()))?;
        let mut current = block.clone();
        for stage in head {
            current = stage.handle().read().transform(&current)?;
        }
        last.handle().read().predict(&current)
    }

    fn get_params(&self, deep: bool) -> Params {
        Pipeline::get_params(self, deep)
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        Pipeline::set_params(self, params).map(|_| ())
    }

    fn check_params(&self, params: &Params) -> Result<(), BlockflowError> {
        self.prepare(params.clone()).map(|_| ())
    }

    fn feature_names(&self) -> Result<Vec<String>, BlockflowError> {
        self.get_feature_names()
    }
}
