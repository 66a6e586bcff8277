//! Hamiltonian values: constants or named parameterized functions.
//!
//! A [`Value`] is generic over what it is evaluated on: a single [`Site`]
//! for per-site systems ([`SiteValue`]) or a whole [`SiteArray`] for
//! vectorized systems ([`ArrayValue`]).

use std::fmt;
use std::sync::Arc;

use crate::site::{Site, SiteArray};
use crate::system::SystemError;
use crate::types::{MatrixBlocks, Params};

/// Signature of an onsite value function.
pub type OnsiteFn<S> = dyn Fn(&S, &Params) -> Result<MatrixBlocks, SystemError> + Send + Sync;

/// Signature of a hopping value function, called with `(to, from)`.
pub type HoppingFn<S> = dyn Fn(&S, &S, &Params) -> Result<MatrixBlocks, SystemError> + Send + Sync;

/// A function together with the name used in error messages and the
/// parameters it consumes.
pub struct ValueFunction<F: ?Sized> {
    name: String,
    parameters: Vec<String>,
    func: Arc<F>,
}

impl<F: ?Sized> Clone for ValueFunction<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<F: ?Sized> ValueFunction<F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    fn check_params(&self, params: &Params) -> Result<(), SystemError> {
        for p in &self.parameters {
            if !params.contains(p) {
                return Err(SystemError::MissingParameter(format!("{} (needed by {})", p, self.name)));
            }
        }
        Ok(())
    }
}

/// A matrix element: either a constant or a function of sites.
pub enum Value<S> {
    Constant(MatrixBlocks),
    Onsite(ValueFunction<OnsiteFn<S>>),
    Hopping(ValueFunction<HoppingFn<S>>),
}

pub type SiteValue = Value<Site>;
pub type ArrayValue = Value<SiteArray>;

impl<S> Clone for Value<S> {
    fn clone(&self) -> Self {
        match self {
            Value::Constant(c) => Value::Constant(c.clone()),
            Value::Onsite(f) => Value::Onsite(f.clone()),
            Value::Hopping(f) => Value::Hopping(f.clone()),
        }
    }
}

impl<S: 'static> Value<S> {
    pub fn constant(value: impl Into<MatrixBlocks>) -> Self {
        Value::Constant(value.into())
    }

    /// An onsite function of the named parameters.
    pub fn onsite<F>(name: &str, parameters: &[&str], func: F) -> Self
    where
        F: Fn(&S, &Params) -> Result<MatrixBlocks, SystemError> + Send + Sync + 'static,
    {
        Value::Onsite(ValueFunction {
            name: name.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            func: Arc::new(func),
        })
    }

    /// A hopping function of the named parameters.
    pub fn hopping<F>(name: &str, parameters: &[&str], func: F) -> Self
    where
        F: Fn(&S, &S, &Params) -> Result<MatrixBlocks, SystemError> + Send + Sync + 'static,
    {
        Value::Hopping(ValueFunction {
            name: name.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            func: Arc::new(func),
        })
    }
}

impl<S> Value<S> {
    /// Parameters consumed by this value; empty for constants.
    pub fn parameters(&self) -> &[String] {
        match self {
            Value::Constant(_) => &[],
            Value::Onsite(f) => f.parameters(),
            Value::Hopping(f) => f.parameters(),
        }
    }

    /// Function name for diagnostics; `None` for constants.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Value::Constant(_) => None,
            Value::Onsite(f) => Some(f.name()),
            Value::Hopping(f) => Some(f.name()),
        }
    }

    /// Evaluate on the `(to, from)` pair. Onsite functions only see `to`.
    pub fn evaluate(&self, to: &S, from: &S, params: &Params) -> Result<MatrixBlocks, SystemError> {
        match self {
            Value::Constant(c) => Ok(c.clone()),
            Value::Onsite(f) => {
                f.check_params(params)?;
                (f.func)(to, params)
            }
            Value::Hopping(f) => {
                f.check_params(params)?;
                (f.func)(to, from, params)
            }
        }
    }
}

impl<S> fmt::Debug for Value<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(c) => write!(f, "Constant({:?})", c.shape()),
            Value::Onsite(func) => write!(f, "Onsite({}{:?})", func.name, func.parameters),
            Value::Hopping(func) => write!(f, "Hopping({}{:?})", func.name, func.parameters),
        }
    }
}
