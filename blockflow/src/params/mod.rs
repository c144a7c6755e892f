//! Parameter maps and the dotted-key router used by compositions.

pub mod router;
mod value;

pub use router::{join_key, route, route_fit_params, split_key, validate_names, RoutedParams, SEPARATOR};
pub use value::{params, ParamValue, Params};
