pub mod clock;
#[cfg(test)]
pub(crate) mod fakes;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod result;
pub mod session;
pub mod worker_pool;
