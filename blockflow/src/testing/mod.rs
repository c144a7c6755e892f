//! Testing utilities for blockflow compositions.
//!
//! This module provides:
//! - Reference estimators (`CountVectorizer`, `VarianceThreshold`, `NearestCentroid`)
//! - Mock estimators with controllable failures
//! - Seeded datasets and block assertions

mod assertions;
mod fixtures;
mod mocks;
mod reference;

pub use assertions::{assert_blocks_equal, assert_dense_close};
pub use fixtures::{classification_frame, junkfood, junkfood_texts, make_classification};
pub use mocks::{
    FailingTransformer, FitParamStub, IdentityTransformer, NoFitStub, ParamStub, RowDropper, Scaler,
    WholeDatasetRecorder,
};
pub use reference::{Analyzer, CountVectorizer, Metric, MinDf, NearestCentroid, VarianceThreshold};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test-writer tracing subscriber filtered by `RUST_LOG`, once
/// per process.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
