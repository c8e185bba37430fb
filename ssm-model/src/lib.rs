//! Shared data model for the ssm merge daemon.
//!
//! Every type here is plain data: constructors validate the invariants the rest of the workspace
//! relies on, but nothing in this crate performs I/O.

pub mod catalog;
pub mod comick;
pub mod error;
pub mod matcher;
pub mod metadata_state;
pub mod mount;
pub mod outcomes;
pub mod rename_queue;
pub mod title;

pub use catalog::EquivalentTitleGroup;
pub use comick::{ComickAltTitle, ComickComicResponse, ComickCover, ComickSearchCandidate, ComickStatus, MuCategoryVote};
pub use error::{ModelError, Result};
pub use matcher::{CandidateMatchResult, NO_INDEX};
pub use metadata_state::{CooldownMap, MetadataStateSnapshot};
pub use mount::{BranchLink, BranchLinkKind, DesiredMountDefinition, MountAction, MountActionKind, MountSnapshotEntry};
pub use outcomes::{ActionOutcome, DispatchOutcome, MergePassOutcome, PollOutcome};
pub use rename_queue::ChapterRenameQueueEntry;
pub use title::{SourceBranch, TitleGroup};
