//! Shared, lockable estimator references.

use super::Estimator;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// A shared reference to a boxed estimator.
///
/// A composition keeps the handles it was built from, so parameters set
/// through the composition are visible through the caller's handle.
/// `clone` shares; [`deep_clone`](Self::deep_clone) copies.
#[derive(Clone)]
pub struct EstimatorHandle(Arc<RwLock<Box<dyn Estimator>>>);

impl EstimatorHandle {
    /// Wraps an estimator.
    pub fn new<E: Estimator + 'static>(estimator: E) -> Self {
        Self::from_box(Box::new(estimator))
    }

    /// Wraps a boxed estimator.
    #[must_use]
    pub fn from_box(estimator: Box<dyn Estimator>) -> Self {
        Self(Arc::new(RwLock::new(estimator)))
    }

    /// Locks for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<dyn Estimator>> {
        self.0.read()
    }

    /// Locks for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<dyn Estimator>> {
        self.0.write()
    }

    /// The estimator kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.read().kind()
    }

    /// An immutable copy of the current state, safe to share across blocks.
    #[must_use]
    pub fn snapshot(&self) -> Arc<dyn Estimator> {
        Arc::from(self.read().clone_box())
    }

    /// A new handle to an independent copy.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self::from_box(self.read().clone_box())
    }

    /// Returns true if both handles refer to the same estimator.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for EstimatorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EstimatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(estimator) => write!(f, "EstimatorHandle({estimator:?})"),
            None => write!(f, "EstimatorHandle(<locked>)"),
        }
    }
}
