mod hash_by_ref;
mod time_queue;
mod value_at;

pub(crate) use hash_by_ref::HashByRef;
pub(crate) use time_queue::TimeQueue;
