use std::{any::Any, fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::{DeploymentConfig, GrpcServerConfig, ManagerConfig, ThingsConfig},
    container::{ContainerManager, ContainerRuntime},
    events::EventsManager,
    network::{NetworkConfig, NetworkManager},
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The order in which service types are initialized.
pub const BOOT_ORDER: [ServiceType; 9] = [
    ServiceType::Events,
    ServiceType::SystemInfo,
    ServiceType::ContainerClient,
    ServiceType::Net,
    ServiceType::ContainerManager,
    ServiceType::Twin,
    ServiceType::Deployment,
    ServiceType::GrpcService,
    ServiceType::GrpcServer,
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The kind of a daemon service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// The container events bus.
    Events,

    /// The network manager.
    Net,

    /// The client of the OCI runtime.
    ContainerClient,

    /// The container manager.
    ContainerManager,

    /// Host information.
    SystemInfo,

    /// The deployment agent.
    Deployment,

    /// The twin connection.
    Twin,

    /// An RPC service mounted on an RPC server.
    GrpcService,

    /// The RPC server.
    GrpcServer,
}

/// Options handed to a service factory, one variant per configurable service type.
#[derive(Debug, Clone, Default)]
pub enum ServiceOptions {
    /// The service takes no options.
    #[default]
    Empty,

    /// Network manager options.
    Net(NetworkConfig),

    /// Container manager options.
    ContainerManager(ManagerConfig),

    /// Twin options.
    Twin(ThingsConfig),

    /// Deployment options.
    Deployment(DeploymentConfig),

    /// RPC server options.
    GrpcServer(GrpcServerConfig),
}

/// An initialized service.
#[derive(Clone)]
pub enum ServiceInstance {
    /// The events bus.
    Events(Arc<EventsManager>),

    /// A network manager.
    Net(Arc<dyn NetworkManager>),

    /// A container runtime client.
    ContainerClient(Arc<dyn ContainerRuntime>),

    /// A container manager.
    ContainerManager(Arc<dyn ContainerManager>),

    /// A twin connection.
    Twin(Arc<dyn TwinConnector>),

    /// An RPC server.
    RpcServer(Arc<dyn RpcServer>),

    /// Any other service.
    Opaque(Arc<dyn Any + Send + Sync>),
}

/// A service connecting the daemon to its remote twin.
#[async_trait]
pub trait TwinConnector: Send + Sync {
    /// Connects to the broker and starts synchronizing.
    async fn connect(&self) -> anyhow::Result<()>;

    /// Disconnects from the broker.
    async fn disconnect(&self) -> anyhow::Result<()>;
}

/// A server exposing the daemon's local RPC surface.
#[async_trait]
pub trait RpcServer: Send + Sync {
    /// Starts serving. Returns once the listener is bound.
    async fn start(&self) -> anyhow::Result<()>;

    /// Stops serving and releases the listener.
    async fn stop(&self) -> anyhow::Result<()>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServiceType {
    /// The type's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Events => "events",
            ServiceType::Net => "net",
            ServiceType::ContainerClient => "container-client",
            ServiceType::ContainerManager => "container-manager",
            ServiceType::SystemInfo => "system-info",
            ServiceType::Deployment => "deployment",
            ServiceType::Twin => "twin",
            ServiceType::GrpcService => "grpc-service",
            ServiceType::GrpcServer => "grpc-server",
        }
    }
}

impl ServiceInstance {
    /// The variant's name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceInstance::Events(_) => "events",
            ServiceInstance::Net(_) => "net",
            ServiceInstance::ContainerClient(_) => "container-client",
            ServiceInstance::ContainerManager(_) => "container-manager",
            ServiceInstance::Twin(_) => "twin",
            ServiceInstance::RpcServer(_) => "rpc-server",
            ServiceInstance::Opaque(_) => "opaque",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceInstance::{}", self.kind())
    }
}
