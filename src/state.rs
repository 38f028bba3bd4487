// Application state shared with request handlers
use std::sync::Arc;

use crate::relay::RelayHandle;
use crate::settings::ServerSettings;

#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub settings: Arc<ServerSettings>,
}

impl AppState {
    pub fn new(relay: RelayHandle, settings: ServerSettings) -> Self {
        Self {
            relay,
            settings: Arc::new(settings),
        }
    }
}
