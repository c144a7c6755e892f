//! # Blockflow
//!
//! Pipeline and feature-union composition of estimators over partitioned,
//! block-structured data.
//!
//! Blockflow provides:
//!
//! - **Block stores**: lazily evaluated collections of row blocks, split
//!   into partitions, with single- and multi-column forms
//! - **Stages**: named estimators that fit incrementally block by block
//!   or over the whole dataset, and transform every block in parallel
//! - **Pipelines**: ordered chains whose last step may be a predictor
//! - **Feature unions**: parallel branches whose outputs are weighted and
//!   concatenated column-wise within each aligned block
//! - **Parameter routing**: `step__param` keys resolved through any depth of
//!   nesting
//!
//! ## Quick Start
//!
//! ```rust
//! use blockflow::prelude::*;
//! use blockflow::testing::{junkfood_texts, CountVectorizer, VarianceThreshold};
//!
//! let data = Dataset::from(BlockStore::from_texts(junkfood_texts(), 2, None)?);
//! let mut pipeline = Pipeline::new(vec![
//!     ("vect", EstimatorHandle::new(CountVectorizer::new())),
//!     ("filter", EstimatorHandle::new(VarianceThreshold::new(0.0))),
//! ])?;
//! pipeline.set_params(blockflow::params! { "vect__min_df" => 2 })?;
//!
//! let features = pipeline.fit_transform(&data, &FitParams::new())?;
//! assert_eq!(features.collect_features()?.n_rows(), 6);
//! # Ok::<(), BlockflowError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod blocks;
pub mod config;
pub mod errors;
pub mod estimator;
pub mod events;
pub mod params;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blocks::{Block, BlockFrame, BlockStore, CsrMatrix, Dataset, Layout};
    pub use crate::config::ExecutionConfig;
    pub use crate::errors::{
        AlignmentError, BlockflowError, CompositionError, ContractErrorInfo, EstimatorError,
        NotFittedError, ParameterError, SchemaError,
    };
    pub use crate::estimator::{Capabilities, Estimator, EstimatorHandle, FitMode, FitParams};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::params::{ParamValue, Params};
    pub use crate::pipeline::{
        make_pipeline, make_union, FeatureUnion, FeatureUnionBuilder, FitState, Pipeline,
        PipelineBuilder,
    };
    pub use crate::stages::Stage;
    pub use crate::utils::{generate_run_id, generate_uuid, iso_timestamp};
}
