//! Shared application state

use std::path::PathBuf;
use std::sync::Arc;

use download_gate::{ArtifactRegistry, Mailer, PrincipalDirectory, TokenService};

use crate::convert::DocxRenderer;
use crate::pool::WorkerPool;

/// Collaborators for gated delivery. Absent when no signing secret is set.
pub struct GatedDelivery {
    pub tokens: TokenService,
    pub directory: Arc<dyn PrincipalDirectory>,
    pub mailer: Arc<dyn Mailer>,
    /// Base URL placed in download links, without trailing slash
    pub public_url: String,
    /// Where converted files wait for download
    pub artifact_dir: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: WorkerPool,
    pub renderer: Arc<dyn DocxRenderer>,
    pub registry: Arc<ArtifactRegistry>,
    pub gated: Option<Arc<GatedDelivery>>,
    /// Parent of per-request scratch directories
    pub work_dir: PathBuf,
}

impl AppState {
    pub fn new(
        pool: WorkerPool,
        renderer: Arc<dyn DocxRenderer>,
        registry: Arc<ArtifactRegistry>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            pool,
            renderer,
            registry,
            gated: None,
            work_dir,
        }
    }

    pub fn with_gated_delivery(mut self, gated: GatedDelivery) -> Self {
        self.gated = Some(Arc::new(gated));
        self
    }
}
