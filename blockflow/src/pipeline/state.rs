//! Fit lifecycle of a composition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a pipeline or union is in its fit lifecycle.
///
/// `Unfit -> Fitting -> Fit`. A failed fit returns to `Unfit`; steps that
/// finished fitting before the failure keep their learned state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitState {
    /// Not fitted, or the last fit failed.
    #[default]
    Unfit,
    /// A fit is in progress.
    Fitting,
    /// The last fit completed.
    Fit,
}

impl fmt::Display for FitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unfit => write!(f, "unfit"),
            Self::Fitting => write!(f, "fitting"),
            Self::Fit => write!(f, "fit"),
        }
    }
}

impl FitState {
    /// Returns true once a fit has completed.
    #[must_use]
    pub fn is_fit(&self) -> bool {
        matches!(self, Self::Fit)
    }
}
