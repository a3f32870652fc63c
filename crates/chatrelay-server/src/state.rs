use chatrelay::providers::base::Provider;
use std::sync::Arc;

use crate::configuration::ChatSettings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub chat: Arc<ChatSettings>,
}

impl AppState {
    pub fn new(provider: Arc<dyn Provider>, chat: ChatSettings) -> Self {
        Self {
            provider,
            chat: Arc::new(chat),
        }
    }
}
