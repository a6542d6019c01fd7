pub mod answer;
pub mod attachment;
pub mod capture;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod models;
pub mod session;
pub mod shortcuts;
pub mod translator;
pub mod transport;
pub mod visual;

use std::sync::Arc;

use crate::answer::AnswerService;
use crate::capture::Composer;
use crate::config::Config;
use crate::error::Result;
use crate::identity::{IdentityHub, IdentityProvider, LocalIdentity};
use crate::session::SessionController;
use crate::transport::{GeminiTransport, Transport};

/// Everything one overlay window needs, wired from a loaded [`Config`].
pub struct Overlay {
    pub session: SessionController,
    pub composer: Composer,
    pub identity: Arc<IdentityHub>,
}

impl Overlay {
    pub fn new(cfg: &Config) -> Result<Self> {
        let transport = Arc::new(GeminiTransport::new(&cfg.gemini)?);
        let identity = Arc::new(LocalIdentity::new(&cfg.identity));
        Ok(Self::with_parts(
            transport as Arc<dyn Transport>,
            identity as Arc<dyn IdentityProvider>,
            cfg,
        ))
    }

    pub fn with_parts(
        transport: Arc<dyn Transport>,
        provider: Arc<dyn IdentityProvider>,
        cfg: &Config,
    ) -> Self {
        let answers = Arc::new(AnswerService::new(transport));
        Self {
            session: SessionController::new(answers, &cfg.session),
            composer: Composer::new(cfg.capture),
            identity: Arc::new(IdentityHub::new(provider)),
        }
    }
}
