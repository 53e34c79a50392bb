//! Collaborators shared by a session and the tasks it spawns.

use crate::config::ClientConfig;
use crate::media::MediaEngine;
use crate::signaling::{SignalingChannel, SignalingTransport};
use crate::ui::UiAdapter;
use std::sync::Arc;

/// Everything a session talks to. Cheap to clone.
#[derive(Clone)]
pub struct SessionContext {
    pub signaling: SignalingChannel,
    pub media: Arc<dyn MediaEngine>,
    pub ui: Arc<dyn UiAdapter>,
    pub config: Arc<ClientConfig>,
}

impl SessionContext {
    pub fn new(
        transport: Arc<dyn SignalingTransport>,
        media: Arc<dyn MediaEngine>,
        ui: Arc<dyn UiAdapter>,
        config: ClientConfig,
    ) -> Self {
        Self {
            signaling: SignalingChannel::new(transport),
            media,
            ui,
            config: Arc::new(config),
        }
    }
}
