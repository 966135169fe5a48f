pub mod pool;
pub mod queue;
