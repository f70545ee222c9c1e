use std::sync::Arc;

use crate::{
    container::{ContainerManager, ContainerRuntime},
    events::EventsManager,
    network::NetworkManager,
    EdgeboxError, EdgeboxResult,
};

use super::{Registration, RpcServer, ServiceContext, ServiceInstance, ServiceType, TwinConnector};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The outcome of initializing one registration.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// The registration.
    pub registration: Arc<Registration>,

    /// The instance, when the factory succeeded.
    pub instance: Option<ServiceInstance>,

    /// The factory's error, when it failed.
    pub error: Option<String>,
}

/// The initialized services of one boot, in initialization order.
#[derive(Debug, Clone, Default)]
pub struct ServiceInfoSet {
    infos: Vec<Arc<ServiceInfo>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServiceInfo {
    /// Runs the registration's factory, capturing a failure instead of returning it.
    pub async fn initialize(registration: Arc<Registration>, ctx: ServiceContext) -> Self {
        match registration.init(ctx).await {
            Ok(instance) => {
                tracing::debug!(
                    "initialized service {} of type {}",
                    registration.id(),
                    registration.service_type()
                );
                Self {
                    registration,
                    instance: Some(instance),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(
                    "failed to initialize service {} of type {}: {:#}",
                    registration.id(),
                    registration.service_type(),
                    e
                );
                Self {
                    registration,
                    instance: None,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }

    /// The service id.
    pub fn id(&self) -> &str {
        self.registration.id()
    }

    /// The service type.
    pub fn service_type(&self) -> ServiceType {
        self.registration.service_type()
    }
}

impl ServiceInfoSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an outcome. A second outcome for the same type and id is rejected.
    pub fn add(&mut self, info: ServiceInfo) -> EdgeboxResult<()> {
        if self
            .infos
            .iter()
            .any(|existing| existing.service_type() == info.service_type() && existing.id() == info.id())
        {
            return Err(EdgeboxError::DuplicateService(
                info.service_type(),
                info.id().to_string(),
            ));
        }

        self.infos.push(Arc::new(info));
        Ok(())
    }

    /// Any one successfully initialized instance of a type.
    pub fn get(&self, service_type: ServiceType) -> Option<&ServiceInstance> {
        self.get_all(service_type).into_iter().next()
    }

    /// Every successfully initialized instance of a type, in insertion order.
    pub fn get_all(&self, service_type: ServiceType) -> Vec<&ServiceInstance> {
        self.infos
            .iter()
            .filter(|info| info.service_type() == service_type)
            .filter_map(|info| info.instance.as_ref())
            .collect()
    }

    /// Every outcome in insertion order, failed ones included.
    pub fn infos(&self) -> impl DoubleEndedIterator<Item = &ServiceInfo> {
        self.infos.iter().map(|info| info.as_ref())
    }

    /// Number of outcomes.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// The events bus.
    pub fn events(&self) -> Option<Arc<EventsManager>> {
        self.get_all(ServiceType::Events)
            .into_iter()
            .find_map(|instance| match instance {
                ServiceInstance::Events(events) => Some(events.clone()),
                _ => None,
            })
    }

    /// The network manager.
    pub fn network_manager(&self) -> Option<Arc<dyn NetworkManager>> {
        self.get_all(ServiceType::Net)
            .into_iter()
            .find_map(|instance| match instance {
                ServiceInstance::Net(net) => Some(net.clone()),
                _ => None,
            })
    }

    /// The container runtime client.
    pub fn container_runtime(&self) -> Option<Arc<dyn ContainerRuntime>> {
        self.get_all(ServiceType::ContainerClient)
            .into_iter()
            .find_map(|instance| match instance {
                ServiceInstance::ContainerClient(runtime) => Some(runtime.clone()),
                _ => None,
            })
    }

    /// Every container manager.
    pub fn container_managers(&self) -> Vec<Arc<dyn ContainerManager>> {
        self.get_all(ServiceType::ContainerManager)
            .into_iter()
            .filter_map(|instance| match instance {
                ServiceInstance::ContainerManager(manager) => Some(manager.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every twin connection.
    pub fn twin_connectors(&self) -> Vec<Arc<dyn TwinConnector>> {
        self.get_all(ServiceType::Twin)
            .into_iter()
            .filter_map(|instance| match instance {
                ServiceInstance::Twin(twin) => Some(twin.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every RPC server.
    pub fn rpc_servers(&self) -> Vec<Arc<dyn RpcServer>> {
        self.get_all(ServiceType::GrpcServer)
            .into_iter()
            .filter_map(|instance| match instance {
                ServiceInstance::RpcServer(server) => Some(server.clone()),
                _ => None,
            })
            .collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
