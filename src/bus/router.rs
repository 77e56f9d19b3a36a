//! Routable bus: picks a named bus per envelope.
//!
//! Resolution order for each envelope:
//! 1. the bus named on the envelope (`bus_name`)
//! 2. the bus routed for its message type
//! 3. the fallback bus

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::bus::{HandlerError, MessageBus, RoutableBus};
use crate::transport::Envelope;

#[derive(Default, Clone)]
pub struct BusRouter {
    buses: BTreeMap<String, Arc<dyn MessageBus>>,
    routes: HashMap<String, String>,
    fallback: Option<String>,
}

impl BusRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named bus.
    pub fn with_bus(mut self, name: impl Into<String>, bus: Arc<dyn MessageBus>) -> Self {
        self.buses.insert(name.into(), bus);
        self
    }

    /// Route a message type to a named bus.
    pub fn route(mut self, message_type: impl Into<String>, bus_name: impl Into<String>) -> Self {
        self.routes.insert(message_type.into(), bus_name.into());
        self
    }

    /// Bus used when neither the envelope nor the routing table names one.
    pub fn with_fallback(mut self, bus_name: impl Into<String>) -> Self {
        self.fallback = Some(bus_name.into());
        self
    }

    fn select(&self, envelope: &Envelope) -> Result<(&str, &Arc<dyn MessageBus>), HandlerError> {
        let name = envelope
            .bus_name
            .as_deref()
            .or_else(|| self.routes.get(&envelope.message_type).map(String::as_str))
            .or(self.fallback.as_deref())
            .ok_or_else(|| {
                HandlerError::new(&envelope.message_type, "no bus is routed for this message type")
            })?;

        self.buses
            .get_key_value(name)
            .map(|(name, bus)| (name.as_str(), bus))
            .ok_or_else(|| {
                HandlerError::new(&envelope.message_type, format!("bus \"{}\" does not exist", name))
            })
    }
}

#[async_trait]
impl MessageBus for BusRouter {
    async fn dispatch(&self, envelope: Envelope) -> Result<Envelope, HandlerError> {
        let (name, bus) = self.select(&envelope)?;
        debug!("Routing {} ({}) to bus {}", envelope.id, envelope.message_type, name);
        bus.dispatch(envelope).await
    }
}

impl RoutableBus for BusRouter {
    fn named(&self, name: &str) -> Option<Arc<dyn MessageBus>> {
        self.buses.get(name).cloned()
    }

    fn bus_names(&self) -> Vec<String> {
        self.buses.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FnBus;
    use serde_json::json;

    fn tagging_bus(tag: &'static str) -> Arc<dyn MessageBus> {
        Arc::new(FnBus::new(move |_envelope: &Envelope| {
            Err(HandlerError::new("tag", tag))
        }))
    }

    async fn routed_to(router: &BusRouter, envelope: Envelope) -> String {
        router.dispatch(envelope).await.unwrap_err().reason
    }

    fn router() -> BusRouter {
        BusRouter::new()
            .with_bus("command.bus", tagging_bus("command"))
            .with_bus("event.bus", tagging_bus("event"))
            .route("UserRegistered", "event.bus")
            .with_fallback("command.bus")
    }

    #[tokio::test]
    async fn test_routes_by_message_type() {
        let envelope = Envelope::new("UserRegistered", json!({}));
        assert_eq!(routed_to(&router(), envelope).await, "event");
    }

    #[tokio::test]
    async fn test_falls_back_for_unrouted_types() {
        let envelope = Envelope::new("SendEmail", json!({}));
        assert_eq!(routed_to(&router(), envelope).await, "command");
    }

    #[tokio::test]
    async fn test_envelope_bus_name_wins() {
        let envelope = Envelope::new("UserRegistered", json!({})).on_bus("command.bus");
        assert_eq!(routed_to(&router(), envelope).await, "command");
    }

    #[tokio::test]
    async fn test_missing_route_is_a_handler_error() {
        let router = BusRouter::new().with_bus("command.bus", tagging_bus("command"));
        let err = router
            .dispatch(Envelope::new("Unknown", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.message_type, "Unknown");
        assert!(err.reason.contains("no bus"));
    }

    #[tokio::test]
    async fn test_unknown_bus_name_is_a_handler_error() {
        let err = router()
            .dispatch(Envelope::new("A", json!({})).on_bus("query.bus"))
            .await
            .unwrap_err();
        assert!(err.reason.contains("query.bus"));
    }

    #[test]
    fn test_named_lookup() {
        let router = router();
        assert!(router.named("event.bus").is_some());
        assert!(router.named("query.bus").is_none());
        assert_eq!(
            router.bus_names(),
            vec!["command.bus".to_string(), "event.bus".to_string()]
        );
    }
}
