//! Trait surfaces at the daemon's system seams: filesystem, external process, HTTP, wall clock.
//!
//! Keeping these as traits (rather than concrete structs wired everywhere) lets the test suite
//! substitute fakes at exactly the boundaries where behavior needs to be driven deterministically,
//! without reaching for a mocking framework on every seam.

pub mod clock;
pub mod fs;
pub mod http;
pub mod process;

pub use clock::{Clock, SystemClock};
pub use fs::FileSystem;
pub use http::{HttpClient, HttpError, HttpResponse};
pub use process::{ProcessOutcome, ProcessRunner, ProcessSpec, ScopedProcess};
