//! Error types for blockflow.
//!
//! Errors are grouped by the point at which they surface: construction of a
//! composition, parameter routing, use before fit, block alignment, column
//! schema, and failures delegated from an estimator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for blockflow operations.
#[derive(Debug, Error)]
pub enum BlockflowError {
    /// A composition could not be constructed.
    #[error("{0}")]
    Composition(#[from] CompositionError),

    /// A parameter key could not be routed or applied.
    #[error("{0}")]
    Parameter(#[from] ParameterError),

    /// A stage or composition was used before `fit` completed.
    #[error("{0}")]
    NotFitted(#[from] NotFittedError),

    /// Block counts or per-block row counts disagree.
    #[error("{0}")]
    Alignment(#[from] AlignmentError),

    /// A column was missing or duplicated in a multi-column store.
    #[error("{0}")]
    Schema(#[from] SchemaError),

    /// An estimator failed; the error is propagated unchanged.
    #[error("{0}")]
    Estimator(#[from] EstimatorError),

    /// The estimator does not provide the requested capability.
    #[error("Unsupported operation: '{estimator}' does not implement {operation}")]
    Unsupported {
        /// The estimator kind or stage name.
        estimator: String,
        /// The missing operation (e.g. "transform").
        operation: String,
    },

    /// Input data was malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BlockflowError {
    /// Creates an unsupported-operation error.
    #[must_use]
    pub fn unsupported(estimator: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            estimator: estimator.into(),
            operation: operation.into(),
        }
    }

    /// Creates an invalid-input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns true if this is a not-fitted error.
    #[must_use]
    pub const fn is_not_fitted(&self) -> bool {
        matches!(self, Self::NotFitted(_))
    }

    /// Returns true if this is an alignment error.
    #[must_use]
    pub const fn is_alignment(&self) -> bool {
        matches!(self, Self::Alignment(_))
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "COMPOSE-002-DUPLICATE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::Value::String(self.code.clone()));
        map.insert("summary".to_string(), serde_json::Value::String(self.summary.clone()));

        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::Value::String(hint.clone()));
        }
        if !self.context.is_empty() {
            let context_map: serde_json::Map<String, serde_json::Value> = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            map.insert("context".to_string(), serde_json::Value::Object(context_map));
        }

        map
    }
}

/// Error raised when a pipeline or union cannot be constructed.
///
/// Always raised before any data is touched.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CompositionError {
    /// The error message.
    pub message: String,
    /// The step names involved in the error.
    pub steps: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CompositionError {
    /// Creates a new composition error.
    #[must_use]
    pub fn new(message: impl Into<String>, error_info: ContractErrorInfo) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
            error_info,
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// A composition was given no steps.
    #[must_use]
    pub fn empty(kind: &str) -> Self {
        Self::new(
            format!("{kind} requires at least one step"),
            ContractErrorInfo::new("COMPOSE-001-EMPTY", format!("Cannot build an empty {kind}"))
                .with_fix_hint("Pass at least one (name, estimator) pair."),
        )
    }

    /// Two or more steps share a name.
    #[must_use]
    pub fn duplicate(kind: &str, names: Vec<String>) -> Self {
        Self::new(
            format!("Names provided are not unique in {kind}: {}", names.join(", ")),
            ContractErrorInfo::new(
                "COMPOSE-002-DUPLICATE",
                "Step names must be unique within one composition",
            )
            .with_fix_hint("Rename one of the steps."),
        )
        .with_steps(names)
    }

    /// A step does not implement `fit`.
    #[must_use]
    pub fn missing_fit(step: &str, estimator: &str) -> Self {
        Self::new(
            format!("Step '{step}' ({estimator}) does not implement fit"),
            ContractErrorInfo::new("COMPOSE-003-NO_FIT", "Every step must implement fit")
                .with_context_entry("estimator", estimator),
        )
        .with_steps(vec![step.to_string()])
    }

    /// A step that must transform does not implement `transform`.
    #[must_use]
    pub fn not_transformer(kind: &str, step: &str, estimator: &str) -> Self {
        Self::new(
            format!("{kind} step '{step}' ({estimator}) does not implement transform"),
            ContractErrorInfo::new(
                "COMPOSE-004-NOT_TRANSFORMER",
                "Intermediate pipeline steps and union branches must implement transform",
            )
            .with_fix_hint("Only the final pipeline step may be a pure predictor.")
            .with_context_entry("estimator", estimator),
        )
        .with_steps(vec![step.to_string()])
    }

    /// A step name is not usable as a parameter prefix.
    #[must_use]
    pub fn invalid_name(step: &str, reason: &str) -> Self {
        Self::new(
            format!("Invalid step name '{step}': {reason}"),
            ContractErrorInfo::new("COMPOSE-005-INVALID_NAME", reason.to_string()),
        )
        .with_steps(vec![step.to_string()])
    }

    /// A branch weight names a branch that does not exist.
    #[must_use]
    pub fn unknown_weight(branch: &str) -> Self {
        Self::new(
            format!("Attempting to weight branch '{branch}', but it is not present in the union"),
            ContractErrorInfo::new("COMPOSE-006-UNKNOWN_WEIGHT", "Weight names an unknown branch"),
        )
        .with_steps(vec![branch.to_string()])
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::Value::String(self.message.clone()));
        map.insert(
            "steps".to_string(),
            serde_json::Value::Array(
                self.steps
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        );
        let info_map: serde_json::Map<String, serde_json::Value> =
            self.error_info.to_dict().into_iter().collect();
        map.insert("error_info".to_string(), serde_json::Value::Object(info_map));
        map
    }
}

/// Errors raised while routing or applying parameters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParameterError {
    /// A key without a step prefix is not a parameter of the owner.
    #[error("Invalid parameter '{key}' for {owner}. Valid parameters are: {valid}")]
    UnknownParameter {
        /// The rejected key.
        key: String,
        /// The estimator or composition that rejected it.
        owner: String,
        /// Comma-separated list of accepted keys.
        valid: String,
    },

    /// A dotted key names a step that is not declared.
    #[error("Invalid parameter '{key}' for {owner}: no step named '{step}'")]
    UnknownStep {
        /// The rejected key.
        key: String,
        /// The step prefix that did not match.
        step: String,
        /// The composition that rejected it.
        owner: String,
    },

    /// The key is known but the value has the wrong shape.
    #[error("Invalid value for parameter '{key}': {message}")]
    InvalidValue {
        /// The key.
        key: String,
        /// What was wrong.
        message: String,
    },
}

impl ParameterError {
    /// Creates an unknown-parameter error.
    #[must_use]
    pub fn unknown_parameter<'a>(
        key: impl Into<String>,
        owner: impl Into<String>,
        valid: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::UnknownParameter {
            key: key.into(),
            owner: owner.into(),
            valid: valid.into_iter().collect::<Vec<_>>().join(", "),
        }
    }

    /// Creates an unknown-step error.
    #[must_use]
    pub fn unknown_step(
        key: impl Into<String>,
        step: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self::UnknownStep {
            key: key.into(),
            step: step.into(),
            owner: owner.into(),
        }
    }

    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Error raised when `transform` or `predict` runs before `fit`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{stage}' is not fitted yet; call fit before using this method")]
pub struct NotFittedError {
    /// The stage or composition name.
    pub stage: String,
}

impl NotFittedError {
    /// Creates a new not-fitted error.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self { stage: stage.into() }
    }
}

/// Error raised when block layouts disagree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Alignment error in {context}: expected {expected}, got {got}")]
pub struct AlignmentError {
    /// Where the mismatch was found.
    pub context: String,
    /// The expected shape.
    pub expected: String,
    /// The observed shape.
    pub got: String,
}

impl AlignmentError {
    /// Creates a new alignment error.
    #[must_use]
    pub fn new(
        context: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Block counts differ.
    #[must_use]
    pub fn block_count(context: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::new(context, format!("{expected} blocks"), format!("{got} blocks"))
    }

    /// A block's row count differs.
    #[must_use]
    pub fn block_rows(context: impl Into<String>, block: usize, expected: usize, got: usize) -> Self {
        Self::new(
            context,
            format!("{expected} rows in block {block}"),
            format!("{got} rows"),
        )
    }
}

/// Errors raised by multi-column stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A requested column does not exist.
    #[error("Column '{column}' not found; available columns: {available:?}")]
    MissingColumn {
        /// The requested column.
        column: String,
        /// Columns that do exist.
        available: Vec<String>,
    },

    /// The same column name appears twice.
    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    /// A multi-column store was built with no columns.
    #[error("A multi-column store needs at least one column")]
    Empty,
}

/// An error raised by an estimator's own fit, transform or predict.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{estimator}: {message}")]
pub struct EstimatorError {
    /// The estimator kind.
    pub estimator: String,
    /// The failure message.
    pub message: String,
}

impl EstimatorError {
    /// Creates a new estimator error.
    #[must_use]
    pub fn new(estimator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            estimator: estimator.into(),
            message: message.into(),
        }
    }
}

/// Provides default suggestions for composition error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "COMPOSE-001-EMPTY" => Some("Add at least one step before constructing the composition."),
            "COMPOSE-002-DUPLICATE" => Some(
                "Step names double as parameter prefixes and must be unique. \
                 Use make_pipeline or make_union to generate unique names.",
            ),
            "COMPOSE-003-NO_FIT" => Some(
                "Every step must declare the fit capability; wrap stateless functions \
                 in an estimator whose fit is a no-op.",
            ),
            "COMPOSE-004-NOT_TRANSFORMER" => Some(
                "Move the predictor to the end of the pipeline, or remove it from the union.",
            ),
            "COMPOSE-005-INVALID_NAME" => Some(
                "Step names must be non-empty and must not contain '__'.",
            ),
            "COMPOSE-006-UNKNOWN_WEIGHT" => Some("Check the weight keys against the branch names."),
            _ => None,
        }
    }
}
