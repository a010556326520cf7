use std::collections::HashMap;
use std::sync::Arc;

use domain::GatewayKind;

use crate::{GatewayAdapter, GatewayError};

/// Maps each gateway kind to the adapter that serves it.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    adapters: HashMap<GatewayKind, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under its own kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn GatewayAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn GatewayAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn GatewayAdapter>, GatewayError> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or(GatewayError::NotRegistered(kind))
    }

    pub fn kinds(&self) -> impl Iterator<Item = GatewayKind> + '_ {
        self.adapters.keys().copied()
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("kinds", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryGateway;

    #[test]
    fn lookup_by_kind() {
        let registry = GatewayRegistry::new().with(Arc::new(InMemoryGateway::new()));
        assert!(registry.get(GatewayKind::Razorpay).is_ok());
        assert_eq!(registry.kinds().count(), 1);
    }

    #[test]
    fn missing_adapter_is_an_error() {
        let registry = GatewayRegistry::new();
        assert!(matches!(
            registry.get(GatewayKind::Razorpay),
            Err(GatewayError::NotRegistered(GatewayKind::Razorpay))
        ));
    }
}
