use crate::time::NanoTime;
use derive_new::new;

/// A value scheduled for a specific engine time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, new)]
pub(crate) struct ValueAt<T> {
    pub value: T,
    pub time: NanoTime,
}
