use market_data::bus::MessageBus;
use market_data::query::HistoryService;
use market_data::registry::ClientRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<HistoryService>,
    pub registry: Arc<ClientRegistry>,
    pub bus: Arc<dyn MessageBus>,
}

impl AppState {
    pub fn new(
        history: Arc<HistoryService>,
        registry: Arc<ClientRegistry>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            history,
            registry,
            bus,
        }
    }
}
