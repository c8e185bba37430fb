pub mod lock;
pub mod workflow;

pub use lock::{MergeLock, MergeLockGuard};
pub use workflow::{MergeConfig, MergePassRequest, MergeWorkflow};
