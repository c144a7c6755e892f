//! Builders and auto-naming constructors.

use super::{FeatureUnion, Pipeline};
use crate::config::ExecutionConfig;
use crate::errors::CompositionError;
use crate::estimator::EstimatorHandle;
use crate::events::EventSink;
use std::collections::HashMap;
use std::sync::Arc;

/// Names estimators by their lowercased kind. Kinds that occur more than
/// once get `-1`, `-2`, ... suffixes in order of appearance.
#[must_use]
pub fn name_estimators(estimators: Vec<EstimatorHandle>) -> Vec<(String, EstimatorHandle)> {
    let names: Vec<String> = estimators.iter().map(|e| e.kind().to_lowercase()).collect();
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for name in &names {
        *totals.entry(name.as_str()).or_default() += 1;
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let unique: Vec<String> = names
        .iter()
        .map(|name| {
            if totals[name.as_str()] > 1 {
                let count = seen.entry(name.as_str()).or_default();
                *count += 1;
                format!("{name}-{count}")
            } else {
                name.clone()
            }
        })
        .collect();
    unique.into_iter().zip(estimators).collect()
}

/// Builds a [`Pipeline`] with generated step names.
///
/// # Errors
///
/// See [`Pipeline::new`].
pub fn make_pipeline(estimators: Vec<EstimatorHandle>) -> Result<Pipeline, CompositionError> {
    Pipeline::new(name_estimators(estimators))
}

/// Builds a [`FeatureUnion`] with generated branch names.
///
/// # Errors
///
/// See [`FeatureUnion::new`].
pub fn make_union(estimators: Vec<EstimatorHandle>) -> Result<FeatureUnion, CompositionError> {
    FeatureUnion::new(name_estimators(estimators))
}

/// Fluent builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    steps: Vec<(String, EstimatorHandle)>,
    config: ExecutionConfig,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, name: impl Into<String>, estimator: EstimatorHandle) -> Self {
        self.steps.push((name.into(), estimator));
        self
    }

    /// Sets the execution configuration.
    #[must_use]
    pub fn config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Validates and builds the pipeline.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::new`].
    pub fn build(self) -> Result<Pipeline, CompositionError> {
        let pipeline = Pipeline::new(self.steps)?.with_config(&self.config);
        Ok(match self.event_sink {
            Some(sink) => pipeline.with_event_sink(sink),
            None => pipeline,
        })
    }
}

/// Fluent builder for [`FeatureUnion`].
#[derive(Default)]
pub struct FeatureUnionBuilder {
    branches: Vec<(String, EstimatorHandle)>,
    weights: Vec<(String, f64)>,
    config: ExecutionConfig,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl FeatureUnionBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unweighted branch.
    #[must_use]
    pub fn branch(mut self, name: impl Into<String>, transformer: EstimatorHandle) -> Self {
        self.branches.push((name.into(), transformer));
        self
    }

    /// Appends a branch whose output is scaled by `weight`.
    #[must_use]
    pub fn weighted_branch(mut self, name: impl Into<String>, transformer: EstimatorHandle, weight: f64) -> Self {
        let name = name.into();
        self.weights.push((name.clone(), weight));
        self.branches.push((name, transformer));
        self
    }

    /// Sets the execution configuration.
    #[must_use]
    pub fn config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Validates and builds the union.
    ///
    /// # Errors
    ///
    /// See [`FeatureUnion::new`].
    pub fn build(self) -> Result<FeatureUnion, CompositionError> {
        let union = FeatureUnion::new(self.branches)?
            .with_weights(self.weights)?
            .with_config(&self.config);
        Ok(match self.event_sink {
            Some(sink) => union.with_event_sink(sink),
            None => union,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountVectorizer, IdentityTransformer, VarianceThreshold};

    #[test]
    fn test_name_estimators_suffixes_duplicates() {
        let named = name_estimators(vec![
            EstimatorHandle::new(CountVectorizer::new()),
            EstimatorHandle::new(VarianceThreshold::new(0.0)),
            EstimatorHandle::new(CountVectorizer::new()),
        ]);
        let names: Vec<&str> = named.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["countvectorizer-1", "variancethreshold", "countvectorizer-2"]);
    }

    #[test]
    fn test_make_pipeline_and_union() {
        let pipe = make_pipeline(vec![
            EstimatorHandle::new(CountVectorizer::new()),
            EstimatorHandle::new(VarianceThreshold::new(0.0)),
        ])
        .unwrap();
        assert_eq!(pipe.step_names(), vec!["countvectorizer", "variancethreshold"]);

        let union = make_union(vec![
            EstimatorHandle::new(IdentityTransformer::new()),
            EstimatorHandle::new(IdentityTransformer::new()),
        ])
        .unwrap();
        assert!(union.branch("identitytransformer-2").is_some());
        assert!(make_union(Vec::new()).is_err());
    }

    #[test]
    fn test_builders_apply_config() {
        let config = ExecutionConfig::new().with_n_jobs(Some(1)).with_verbose(true);
        let pipe = PipelineBuilder::new()
            .step("id", EstimatorHandle::new(IdentityTransformer::new()))
            .config(config.clone())
            .build()
            .unwrap();
        assert!(pipe.verbose());

        let union = FeatureUnionBuilder::new()
            .branch("a", EstimatorHandle::new(IdentityTransformer::new()))
            .weighted_branch("b", EstimatorHandle::new(IdentityTransformer::new()), 3.0)
            .config(config)
            .build()
            .unwrap();
        assert_eq!(union.n_jobs(), Some(1));
        assert!((union.weight("b") - 3.0).abs() < f64::EPSILON);
        assert!((union.weight("a") - 1.0).abs() < f64::EPSILON);

        let err = PipelineBuilder::new()
            .step("x", EstimatorHandle::new(IdentityTransformer::new()))
            .step("x", EstimatorHandle::new(IdentityTransformer::new()))
            .build()
            .unwrap_err();
        assert_eq!(err.error_info.code, "COMPOSE-002-DUPLICATE");
    }
}
