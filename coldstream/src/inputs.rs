//! Restartable input sequences.

use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::transform::Scalar;

/// One pass over the inputs.  Items are fallible so that sources which
/// interpret raw data can report bad elements in position.
pub type InputIter<T> = Box<dyn Iterator<Item = Result<T, PipelineError>>>;

/// A sequence of numbers that can be replayed from the start any number
/// of times.  Nothing is read until [Inputs::iter] is called, which only
/// happens when a pipeline is activated.
pub struct Inputs<T> {
    factory: Arc<dyn Fn() -> InputIter<T> + Send + Sync>,
}

impl<T> Clone for Inputs<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
        }
    }
}

impl<T> Debug for Inputs<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Inputs<{}>", tynm::type_name::<T>())
    }
}

impl<T: Scalar> Inputs<T> {
    pub fn from_vec(values: Vec<T>) -> Self {
        let values = Arc::new(values);
        Self {
            factory: Arc::new(move || -> InputIter<T> {
                let values = values.clone();
                Box::new((0..values.len()).map(move |i| Ok::<T, PipelineError>(values[i])))
            }),
        }
    }

    /// Inputs produced by `generate`, which is called once per activation.
    /// The sequence may be infinite.
    /// ```
    /// # use coldstream::*;
    /// let naturals: Inputs<u64> = Inputs::from_fn(|| 1..);
    /// assert_eq!(naturals.iter().take(3).count(), 3);
    /// ```
    pub fn from_fn<I, F>(generate: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self {
            factory: Arc::new(move || -> InputIter<T> {
                Box::new(generate().into_iter().map(Ok::<T, PipelineError>))
            }),
        }
    }

    /// Inputs parsed from text, one token per element.  Tokens that do not
    /// parse are reported as [PipelineError::InvalidInput] when the run
    /// reaches them, after every earlier element has been emitted.
    pub fn parse<S>(tokens: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        let tokens: Arc<Vec<String>> = Arc::new(tokens.into_iter().map(Into::into).collect());
        Self {
            factory: Arc::new(move || -> InputIter<T> {
                let tokens = tokens.clone();
                Box::new((0..tokens.len()).map(move |index| {
                    let token = tokens[index].trim();
                    token.parse::<T>().map_err(|err| {
                        trace!("token {index} {token:?} rejected: {err}");
                        PipelineError::InvalidInput {
                            index,
                            value: token.to_string(),
                        }
                    })
                }))
            }),
        }
    }

    /// Starts a fresh pass from the first element.
    pub fn iter(&self) -> InputIter<T> {
        (self.factory)()
    }
}

impl<T: Scalar> From<Vec<T>> for Inputs<T> {
    fn from(values: Vec<T>) -> Self {
        Self::from_vec(values)
    }
}
