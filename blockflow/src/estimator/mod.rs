//! Estimator capability contract and shared handles.

mod handle;
mod traits;

pub use crate::blocks::Batch;
pub use handle::EstimatorHandle;
pub use traits::{Capabilities, Estimator, EstimatorClone, FitMode, FitParams};
