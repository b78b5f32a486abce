//! Element-wise scaling, the only arithmetic a pipeline performs.

use num_traits::CheckedMul;

use crate::error::PipelineError;
use crate::types::Element;

/// A numeric element a pipeline can scale.
pub trait Scalar: Element + Copy + PartialEq + Send + Sync {
    /// `self * factor`, or `None` when the product is not representable.
    fn checked_scale(self, factor: Self) -> Option<Self>;

    /// False for values that are not numbers at all, such as NaN.
    fn is_number(&self) -> bool {
        true
    }
}

macro_rules! integer_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                fn checked_scale(self, factor: Self) -> Option<Self> {
                    CheckedMul::checked_mul(&self, &factor)
                }
            }
        )*
    };
}

macro_rules! float_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                fn checked_scale(self, factor: Self) -> Option<Self> {
                    let product = self * factor;
                    product.is_finite().then_some(product)
                }

                fn is_number(&self) -> bool {
                    self.is_finite()
                }
            }
        )*
    };
}

integer_scalar!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
float_scalar!(f32, f64);

pub(crate) fn check_factor<T: Scalar>(factor: T) -> Result<T, PipelineError> {
    if factor.is_number() {
        Ok(factor)
    } else {
        Err(PipelineError::InvalidFactor {
            value: format!("{factor:?}"),
        })
    }
}

/// Scales the element found at `index`.
pub fn scale_at<T: Scalar>(index: usize, factor: T, value: T) -> Result<T, PipelineError> {
    if !value.is_number() {
        return Err(PipelineError::InvalidInput {
            index,
            value: format!("{value:?}"),
        });
    }
    value
        .checked_scale(factor)
        .ok_or_else(|| PipelineError::Overflow {
            index,
            value: format!("{value:?}"),
            factor: format!("{factor:?}"),
        })
}

/// Multiplies every element of `inputs` by `factor`, keeping order and
/// length.  Fails on the first element that is not a number or whose
/// product overflows.
pub fn transform<T: Scalar>(factor: T, inputs: &[T]) -> Result<Vec<T>, PipelineError> {
    let factor = check_factor(factor)?;
    inputs
        .iter()
        .enumerate()
        .map(|(index, value)| scale_at(index, factor, *value))
        .collect()
}
