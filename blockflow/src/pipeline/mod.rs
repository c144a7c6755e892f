//! Pipeline and feature-union composition.
//!
//! This module provides:
//! - Sequential pipelines whose last step may be a predictor
//! - Feature unions that fit branches in parallel and concatenate columns
//! - Auto-naming constructors and fluent builders

mod builder;
mod composition;
mod integration_tests;
mod sequential;
mod state;
mod union;

pub use builder::{make_pipeline, make_union, name_estimators, FeatureUnionBuilder, PipelineBuilder};
pub use sequential::Pipeline;
pub use state::FitState;
pub use union::FeatureUnion;
