//! Parameter values.

use crate::errors::ParameterError;
use crate::estimator::EstimatorHandle;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A parameter map, ordered by key.
pub type Params = BTreeMap<String, ParamValue>;

/// One parameter value: plain data, or a nested estimator.
///
/// Estimator values compare by identity, so two handles to the same
/// estimator are equal while two equal-looking copies are not.
#[derive(Clone)]
pub enum ParamValue {
    /// A plain value.
    Value(Value),
    /// A nested estimator, as exposed by compositions under the step name.
    Estimator(EstimatorHandle),
}

impl ParamValue {
    /// Returns the plain value, if this is not an estimator.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Estimator(_) => None,
        }
    }

    /// Returns the estimator handle, if this is an estimator.
    #[must_use]
    pub const fn as_estimator(&self) -> Option<&EstimatorHandle> {
        match self {
            Self::Estimator(h) => Some(h),
            Self::Value(_) => None,
        }
    }

    /// Deserializes the plain value into `T`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-value error naming `key` if this is an estimator
    /// or the value has the wrong shape.
    pub fn parse<T: DeserializeOwned>(&self, key: &str) -> Result<T, ParameterError> {
        match self {
            Self::Value(v) => serde_json::from_value(v.clone())
                .map_err(|e| ParameterError::invalid_value(key, e.to_string())),
            Self::Estimator(_) => Err(ParameterError::invalid_value(
                key,
                "expected a plain value, got an estimator",
            )),
        }
    }

    /// Renders the value as JSON; estimators render as `{"estimator": kind}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Estimator(h) => serde_json::json!({ "estimator": h.kind() }),
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Estimator(a), Self::Estimator(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Estimator(h) => write!(f, "Estimator({})", h.kind()),
        }
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<EstimatorHandle> for ParamValue {
    fn from(h: EstimatorHandle) -> Self {
        Self::Estimator(h)
    }
}

macro_rules! impl_from_json {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    Self::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_from_json!(bool, i32, i64, u32, u64, usize, f64, &str, String);

/// Builds a [`Params`] map from key/value pairs.
pub fn params<K, V, I>(pairs: I) -> Params
where
    K: Into<String>,
    V: Into<ParamValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Builds a [`Params`] map with heterogeneous values.
///
/// ```
/// use blockflow::params;
/// let p = params! { "vect__min_df" => 2, "verbose" => true };
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::params::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::params::Params::new();
        $(
            map.insert(::std::string::String::from($key), $crate::params::ParamValue::from($value));
        )+
        map
    }};
}
