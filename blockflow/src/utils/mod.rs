//! Small helpers for event payloads: run identifiers and timestamps.

mod ids;
pub mod timestamps;

pub use ids::{generate_run_id, generate_uuid};
pub use timestamps::{elapsed_ms, iso_timestamp};
