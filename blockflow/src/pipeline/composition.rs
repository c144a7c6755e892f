//! Step bookkeeping shared by [`Pipeline`](super::Pipeline) and
//! [`FeatureUnion`](super::FeatureUnion).

use crate::errors::{BlockflowError, CompositionError};
use crate::estimator::EstimatorHandle;
use crate::params::{join_key, route, validate_names, ParamValue, Params, RoutedParams};
use crate::stages::Stage;

/// Which steps must implement `transform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransformRule {
    /// Every step but the last (pipelines).
    AllButLast,
    /// Every step (union branches).
    All,
}

/// An ordered, validated list of named stages.
#[derive(Debug)]
pub(crate) struct Composition {
    kind: &'static str,
    rule: TransformRule,
    stages: Vec<Stage>,
}

impl Composition {
    /// Validates and wraps `steps`. Never touches data.
    pub(crate) fn new(
        kind: &'static str,
        rule: TransformRule,
        steps: Vec<(String, EstimatorHandle)>,
    ) -> Result<Self, CompositionError> {
        if steps.is_empty() {
            return Err(CompositionError::empty(kind));
        }
        validate_names(kind, steps.iter().map(|(name, _)| name.as_str()))?;
        let composition = Self {
            kind,
            rule,
            stages: steps
                .into_iter()
                .map(|(name, handle)| Stage::new(name, handle))
                .collect(),
        };
        for (index, stage) in composition.stages.iter().enumerate() {
            composition.check_step(index, stage.name(), stage.handle())?;
        }
        Ok(composition)
    }

    fn check_step(&self, index: usize, name: &str, handle: &EstimatorHandle) -> Result<(), CompositionError> {
        let estimator = handle.read();
        let capabilities = estimator.capabilities();
        if !capabilities.fit {
            return Err(CompositionError::missing_fit(name, estimator.kind()));
        }
        let must_transform = match self.rule {
            TransformRule::All => true,
            TransformRule::AllButLast => index + 1 < self.stages.len(),
        };
        if must_transform && !capabilities.transform {
            return Err(CompositionError::not_transformer(self.kind, name, estimator.kind()));
        }
        Ok(())
    }

    pub(crate) fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }

    pub(crate) fn names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name() == name)
    }

    pub(crate) fn last(&self) -> &Stage {
        // non-empty by construction
        &self.stages[self.stages.len() - 1]
    }

    /// `own` plus, with `deep`, every step under its name and every nested
    /// parameter under `step__key`.
    pub(crate) fn params(&self, mut own: Params, deep: bool) -> Params {
        if deep {
            for stage in &self.stages {
                own.insert(
                    stage.name().to_string(),
                    ParamValue::Estimator(stage.handle().clone()),
                );
                let nested = stage.handle().read().get_params(true);
                for (key, value) in nested {
                    own.insert(join_key(stage.name(), &key), value);
                }
            }
        }
        own
    }

    /// Routes `params` and validates every destination without applying
    /// anything: nested keys are checked against the step that will receive
    /// them, including a replacement supplied in the same call.
    pub(crate) fn route(
        &self,
        owner: &str,
        own_keys: &[&str],
        params: Params,
    ) -> Result<RoutedParams, BlockflowError> {
        let routed = route(owner, own_keys, &self.names(), params)?;
        for (index, stage) in self.stages.iter().enumerate() {
            if let Some(replacement) = routed.replace.get(stage.name()) {
                self.check_step(index, stage.name(), replacement)?;
            }
        }
        for (name, nested) in &routed.nested {
            let target = routed
                .replace
                .get(name)
                .or_else(|| self.get(name).map(Stage::handle));
            if let Some(handle) = target {
                handle.read().check_params(nested)?;
            }
        }
        Ok(routed)
    }

    /// Applies step replacements, then nested parameters.
    pub(crate) fn apply(&mut self, routed: RoutedParams) -> Result<(), BlockflowError> {
        let RoutedParams {
            mut replace, nested, ..
        } = routed;
        for stage in &mut self.stages {
            if let Some(handle) = replace.remove(stage.name()) {
                stage.set_handle(handle);
            }
        }
        for (name, params) in nested {
            if let Some(stage) = self.get(&name) {
                stage.handle().write().set_params(params)?;
            }
        }
        Ok(())
    }

    pub(crate) fn deep_clone(&self) -> Self {
        Self {
            kind: self.kind,
            rule: self.rule,
            stages: self.stages.iter().map(Stage::deep_clone).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ParameterError;
    use crate::params;
    use crate::testing::{IdentityTransformer, NearestCentroid, NoFitStub, ParamStub};

    fn steps(pairs: Vec<(&str, EstimatorHandle)>) -> Vec<(String, EstimatorHandle)> {
        pairs.into_iter().map(|(n, h)| (n.to_string(), h)).collect()
    }

    #[test]
    fn test_construction_checks() {
        let err = Composition::new("Pipeline", TransformRule::AllButLast, Vec::new()).unwrap_err();
        assert_eq!(err.error_info.code, "COMPOSE-001-EMPTY");

        let err = Composition::new(
            "Pipeline",
            TransformRule::AllButLast,
            steps(vec![("a", EstimatorHandle::new(NoFitStub::new()))]),
        )
        .unwrap_err();
        assert_eq!(err.error_info.code, "COMPOSE-003-NO_FIT");

        let err = Composition::new(
            "Pipeline",
            TransformRule::AllButLast,
            steps(vec![
                ("clf", EstimatorHandle::new(NearestCentroid::new())),
                ("id", EstimatorHandle::new(IdentityTransformer::new())),
            ]),
        )
        .unwrap_err();
        assert_eq!(err.error_info.code, "COMPOSE-004-NOT_TRANSFORMER");

        assert!(Composition::new(
            "Pipeline",
            TransformRule::AllButLast,
            steps(vec![
                ("id", EstimatorHandle::new(IdentityTransformer::new())),
                ("clf", EstimatorHandle::new(NearestCentroid::new())),
            ]),
        )
        .is_ok());
    }

    #[test]
    fn test_deep_params_prefix_nested_keys() {
        let handle = EstimatorHandle::new(ParamStub::new(1.0, 2.0));
        let composition = Composition::new(
            "Pipeline",
            TransformRule::AllButLast,
            steps(vec![("stub", handle.clone())]),
        )
        .unwrap();

        let shallow = composition.params(params! { "verbose" => false }, false);
        assert_eq!(shallow.len(), 1);

        let deep = composition.params(Params::new(), true);
        assert_eq!(deep["stub__a"], ParamValue::from(1.0));
        assert_eq!(deep["stub"], ParamValue::Estimator(handle));
    }

    #[test]
    fn test_route_validates_nested_keys_before_applying() {
        let handle = EstimatorHandle::new(ParamStub::new(1.0, 2.0));
        let mut composition = Composition::new(
            "Pipeline",
            TransformRule::AllButLast,
            steps(vec![("stub", handle.clone())]),
        )
        .unwrap();

        let err = composition
            .route("Pipeline", &[], params! { "stub__a" => 5.0, "stub__zzz" => 1 })
            .unwrap_err();
        assert!(matches!(
            err,
            BlockflowError::Parameter(ParameterError::UnknownParameter { .. })
        ));
        assert_eq!(handle.read().get_params(false)["a"], ParamValue::from(1.0));

        let routed = composition
            .route("Pipeline", &[], params! { "stub__a" => 5.0 })
            .unwrap();
        composition.apply(routed).unwrap();
        assert_eq!(handle.read().get_params(false)["a"], ParamValue::from(5.0));
    }

    #[test]
    fn test_replacement_is_checked_and_applied() {
        let mut composition = Composition::new(
            "Pipeline",
            TransformRule::AllButLast,
            steps(vec![
                ("first", EstimatorHandle::new(IdentityTransformer::new())),
                ("last", EstimatorHandle::new(IdentityTransformer::new())),
            ]),
        )
        .unwrap();

        let err = composition
            .route("Pipeline", &[], params! { "first" => EstimatorHandle::new(NearestCentroid::new()) })
            .unwrap_err();
        assert!(matches!(err, BlockflowError::Composition(_)));

        let replacement = EstimatorHandle::new(ParamStub::new(0.0, 0.0));
        let routed = composition
            .route("Pipeline", &[], params! { "last" => replacement.clone(), "last__b" => 3.0 })
            .unwrap();
        composition.apply(routed).unwrap();
        assert!(composition.last().handle().ptr_eq(&replacement));
        assert_eq!(replacement.read().get_params(false)["b"], ParamValue::from(3.0));
    }

    #[test]
    fn test_deep_clone_copies_estimators() {
        let composition = Composition::new(
            "FeatureUnion",
            TransformRule::All,
            steps(vec![("id", EstimatorHandle::new(IdentityTransformer::new()))]),
        )
        .unwrap();
        let copy = composition.deep_clone();
        assert!(!copy.stages()[0].handle().ptr_eq(composition.stages()[0].handle()));
        assert_eq!(copy.names(), composition.names());
        assert_eq!(copy.len(), 1);
    }
}
