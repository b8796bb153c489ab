//! Gated delivery of produced artifacts
//!
//! A principal confirmed by a [`PrincipalDirectory`] receives, by mail, a
//! signed claim for an artifact held in the [`ArtifactRegistry`]. Redeeming
//! the claim later releases the artifact to its owner only.

pub mod directory;
pub mod error;
pub mod graph;
pub mod mailer;
pub mod registry;
pub mod token;

pub use directory::{GraphDirectory, Principal, PrincipalDirectory, StaticDirectory};
pub use error::GateError;
pub use graph::{GraphClient, GraphConfig};
pub use mailer::{download_notice, GraphMailer, LogMailer, MailMessage, Mailer, ResendMailer};
pub use registry::{ArtifactEntry, ArtifactRegistry};
pub use token::{
    default_claim_ttl, DownloadClaims, IssuedClaim, RedemptionPolicy, SigningKey, TokenService,
    DOWNLOAD_PURPOSE, MIN_SECRET_LEN,
};
