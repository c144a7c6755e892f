//! Routing of `step__param` keys to nested steps.
//!
//! Keys are split on the first `"__"`: `"union__vect__min_df"` addresses
//! `"vect__min_df"` inside the step named `"union"`, which routes it again.

use super::{ParamValue, Params};
use crate::errors::{CompositionError, ParameterError};
use crate::estimator::{EstimatorHandle, FitParams};
use std::collections::{BTreeMap, HashSet};

/// Separator between a step name and the nested key.
pub const SEPARATOR: &str = "__";

/// Splits `key` on the first separator into `(step, remainder)`.
#[must_use]
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(SEPARATOR)
}

/// Joins a step name and a nested key.
#[must_use]
pub fn join_key(step: &str, key: &str) -> String {
    format!("{step}{SEPARATOR}{key}")
}

/// Checks that step names are non-empty, free of the separator, and unique.
///
/// # Errors
///
/// Returns the first invalid name, or every duplicated name at once.
pub fn validate_names<'a, I>(kind: &str, names: I) -> Result<(), CompositionError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for name in names {
        if name.is_empty() {
            return Err(CompositionError::invalid_name(name, "step names must not be empty"));
        }
        if name.contains(SEPARATOR) {
            return Err(CompositionError::invalid_name(
                name,
                "step names must not contain '__'",
            ));
        }
        if !seen.insert(name) && !duplicates.iter().any(|d| d == name) {
            duplicates.push(name.to_string());
        }
    }
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(CompositionError::duplicate(kind, duplicates))
    }
}

/// A parameter map split by destination.
#[derive(Debug, Default, PartialEq)]
pub struct RoutedParams {
    /// Keys owned by the composition itself.
    pub own: Params,
    /// Steps to replace, by step name.
    pub replace: BTreeMap<String, EstimatorHandle>,
    /// Nested keys with the step prefix stripped, by step name.
    pub nested: BTreeMap<String, Params>,
}

impl RoutedParams {
    /// Returns true if nothing was routed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.own.is_empty() && self.replace.is_empty() && self.nested.is_empty()
    }
}

/// Splits `params` into own keys, step replacements and nested keys.
///
/// # Errors
///
/// Returns an error for a dotted key naming an undeclared step, a bare key
/// that is neither an own parameter nor a step, or a step name bound to a
/// plain value. Nothing is applied here, so a failure leaves state unchanged.
pub fn route(
    owner: &str,
    own_keys: &[&str],
    step_names: &[&str],
    params: Params,
) -> Result<RoutedParams, ParameterError> {
    let mut routed = RoutedParams::default();
    for (key, value) in params {
        if let Some((step, rest)) = split_key(&key) {
            if !step_names.contains(&step) {
                return Err(ParameterError::unknown_step(key.as_str(), step, owner));
            }
            routed
                .nested
                .entry(step.to_string())
                .or_default()
                .insert(rest.to_string(), value);
        } else if own_keys.contains(&key.as_str()) {
            routed.own.insert(key, value);
        } else if step_names.contains(&key.as_str()) {
            match value {
                ParamValue::Estimator(handle) => {
                    routed.replace.insert(key, handle);
                }
                ParamValue::Value(_) => {
                    return Err(ParameterError::invalid_value(
                        key,
                        "a step name can only be set to an estimator",
                    ))
                }
            }
        } else {
            return Err(ParameterError::unknown_parameter(
                key,
                owner,
                own_keys.iter().copied().chain(step_names.iter().copied()),
            ));
        }
    }
    Ok(routed)
}

/// Splits `step__param` fit parameters by step.
///
/// # Errors
///
/// Returns an error for keys without a step prefix or naming an undeclared
/// step; no stage has run when this fails.
pub fn route_fit_params(
    owner: &str,
    step_names: &[&str],
    fit_params: FitParams,
) -> Result<BTreeMap<String, FitParams>, ParameterError> {
    let mut routed: BTreeMap<String, FitParams> = BTreeMap::new();
    for (key, value) in fit_params {
        let Some((step, rest)) = split_key(&key) else {
            return Err(ParameterError::invalid_value(
                key.as_str(),
                format!("fit parameters of {owner} must be prefixed with a step name, e.g. 'step__{key}'"),
            ));
        };
        if !step_names.contains(&step) {
            return Err(ParameterError::unknown_step(key.as_str(), step, owner));
        }
        routed
            .entry(step.to_string())
            .or_default()
            .insert(rest.to_string(), value);
    }
    Ok(routed)
}
