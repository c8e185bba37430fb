pub mod comick;
pub mod comicinfo;
pub mod coordinator;
pub mod cover;
pub mod details;
pub mod flaresolverr;
pub mod gateway;
pub mod matcher;
pub mod state_store;

pub use comick::{ComickClient, ComickOutcome};
pub use comicinfo::{parse_comicinfo_xml, ComicInfoDocument};
pub use coordinator::{EnsureMetadataRequest, EnsureMetadataResult, MetadataCoordinator};
pub use cover::{ensure_cover_jpg, CoverOutcome, EnsureCoverJpgRequest};
pub use details::{ensure_details_json, DetailsDocument, DetailsOutcome, EnsureDetailsJsonRequest};
pub use flaresolverr::{FlareSolverrClient, FlareSolverrOutcome};
pub use gateway::{detect_cloudflare_block, CloudflareGateway, GatewayOutcome};
pub use matcher::{match_candidates, DetailProbeOutcome, MatchOutcome};
pub use state_store::MetadataStateStore;
