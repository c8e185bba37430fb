/// Errors produced by model constructors and validation routines.
///
/// Mirrors the taxonomy kinds from the daemon's error-handling design
/// (`Configuration | Parse | Filesystem | Conflict`) but only the variants
/// that model-level construction can actually raise.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid title group: {0}")]
    InvalidTitleGroup(String),

    #[error("invalid branch link: {0}")]
    InvalidBranchLink(String),

    #[error("invalid metadata state: {0}")]
    InvalidMetadataState(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
