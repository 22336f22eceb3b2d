//! In-memory adapters for tests.

mod task;

pub use task::InMemoryTaskRepository;
