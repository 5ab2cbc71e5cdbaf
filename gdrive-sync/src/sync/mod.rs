pub mod backoff;
pub mod engine;
pub mod paths;
pub mod pool;
pub mod queue;
pub mod remote;
pub mod resolver;
pub mod state;
pub mod tasks;
#[cfg(test)]
pub(crate) mod testing;
