//! The scheduler driving every task on the current thread.

pub(crate) mod scheduler;
pub(crate) use scheduler::{Handle, Scheduler};

#[cfg(test)]
mod tests;

pub(crate) mod worker;
