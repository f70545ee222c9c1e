use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{EdgeboxError, EdgeboxResult};

use super::{ServiceInfoSet, ServiceInstance, ServiceOptions, ServiceType};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A factory creating a service from its context.
pub type ServiceFactory =
    Arc<dyn Fn(ServiceContext) -> BoxFuture<'static, anyhow::Result<ServiceInstance>> + Send + Sync>;

/// The description of a service.
#[derive(Clone)]
pub struct Registration {
    id: String,
    service_type: ServiceType,
    factory: ServiceFactory,
}

/// What a factory gets to build its service from.
#[derive(Clone)]
pub struct ServiceContext {
    /// Cancelled when the daemon shuts down.
    pub cancel: CancellationToken,

    /// The service's typed options.
    pub options: ServiceOptions,

    /// The registration being initialized.
    pub registration: Arc<Registration>,

    /// Every service initialized so far.
    pub services: ServiceInfoSet,
}

/// The set of registrations, in insertion order.
#[derive(Default)]
pub struct Registry {
    registrations: RwLock<Vec<Arc<Registration>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Registration {
    /// Creates a registration.
    pub fn new<F, Fut>(service_type: ServiceType, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<ServiceInstance>> + Send + 'static,
    {
        Self {
            id: id.into(),
            service_type,
            factory: Arc::new(move |ctx| Box::pin(factory(ctx))),
        }
    }

    /// The service id, unique within its type.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The service type.
    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// Runs the factory.
    pub async fn init(&self, ctx: ServiceContext) -> anyhow::Result<ServiceInstance> {
        (self.factory)(ctx).await
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registration. A second registration with the same type and id is rejected.
    pub fn register(&self, registration: Registration) -> EdgeboxResult<()> {
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if registrations.iter().any(|existing| {
            existing.service_type == registration.service_type && existing.id == registration.id
        }) {
            return Err(EdgeboxError::DuplicateService(
                registration.service_type,
                registration.id,
            ));
        }

        tracing::debug!(
            "registered service {} of type {}",
            registration.id,
            registration.service_type
        );
        registrations.push(Arc::new(registration));
        Ok(())
    }

    /// All registrations in insertion order.
    pub fn registrations(&self) -> Vec<Arc<Registration>> {
        self.registrations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Registrations grouped by type, each group in insertion order.
    pub fn registrations_map(&self) -> HashMap<ServiceType, Vec<Arc<Registration>>> {
        let mut map: HashMap<ServiceType, Vec<Arc<Registration>>> = HashMap::new();
        for registration in self.registrations() {
            map.entry(registration.service_type)
                .or_default()
                .push(registration);
        }
        map
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("service_type", &self.service_type)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registrations", &self.registrations())
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventsManager;

    fn events_registration(id: &str) -> Registration {
        Registration::new(ServiceType::Events, id, |_ctx| async {
            Ok(ServiceInstance::Events(Arc::new(EventsManager::default())))
        })
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = Registry::new();
        registry.register(events_registration("a")).unwrap();
        registry
            .register(Registration::new(ServiceType::Twin, "a", |_ctx| async {
                anyhow::bail!("unused")
            }))
            .unwrap();

        assert!(matches!(
            registry.register(events_registration("a")),
            Err(EdgeboxError::DuplicateService(ServiceType::Events, _))
        ));
    }

    #[test]
    fn test_registrations_map_preserves_order() {
        let registry = Registry::new();
        registry.register(events_registration("first")).unwrap();
        registry.register(events_registration("second")).unwrap();

        let map = registry.registrations_map();
        let ids: Vec<&str> = map[&ServiceType::Events].iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert!(!map.contains_key(&ServiceType::Net));
    }

    #[tokio::test]
    async fn test_init_runs_factory() -> anyhow::Result<()> {
        let registration = Arc::new(events_registration("bus"));
        let ctx = ServiceContext {
            cancel: CancellationToken::new(),
            options: ServiceOptions::Empty,
            registration: registration.clone(),
            services: ServiceInfoSet::new(),
        };

        let instance = registration.init(ctx).await?;
        assert_eq!(instance.kind(), "events");
        Ok(())
    }
}
