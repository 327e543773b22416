//! Entry point used by the host: one call per event.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::RelayConfig;
use crate::dispatch::{DeliveryReport, Dispatcher};
use crate::event::Event;
use crate::registry::{Destination, DestinationRegistry};
use crate::router::{dedupe_targets, route};
use crate::sender::{MessageSender, TelegramSender};
use crate::InternalResult;

/// Routes events and delivers them. Read-only after construction, so a
/// single `Relay` can serve concurrent calls behind an `Arc`.
pub struct Relay {
    registry: Arc<DestinationRegistry>,
    dispatcher: Dispatcher,
}

impl Relay {
    pub fn new(registry: Arc<DestinationRegistry>, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    /// Loads the registry and wires the Telegram sender.
    pub fn from_config(config: &RelayConfig) -> InternalResult<Self> {
        let registry = DestinationRegistry::load(config)?;
        let sender = TelegramSender::new(config.delivery.timeout)?;
        Ok(Self::with_sender(config, registry, Arc::new(sender)))
    }

    pub fn with_sender(
        config: &RelayConfig,
        registry: DestinationRegistry,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self::new(
            Arc::new(registry),
            Dispatcher::from_config(sender, &config.delivery),
        )
    }

    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    /// Destinations `event` would be delivered to, without sending anything.
    pub fn route<'a>(&'a self, event: &Event) -> Vec<&'a Destination> {
        route(event, self.registry.all())
    }

    /// Routes `event`, drops routed destinations that repeat an earlier chat
    /// thread and bot, then dispatches to the rest.
    #[instrument(skip_all, fields(level = %event.level, project = ?event.project, event_id = ?event.event_id))]
    pub async fn process(&self, event: &Event) -> Vec<DeliveryReport> {
        let matched = dedupe_targets(self.route(event));
        if matched.is_empty() {
            info!("Event matched no destination");
            return Vec::new();
        }
        self.dispatcher.dispatch(event, &matched).await
    }
}
