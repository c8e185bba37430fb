pub mod executor;
pub mod snapshot;

pub use executor::{MountExecutor, MountExecutorConfig};
pub use snapshot::parse_findmnt_line;
