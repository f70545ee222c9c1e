//! The default service registrations of the daemon.
//!
//! Each registration builds its service from the typed options the daemon extracted for its
//! type and from the services initialized before it.

use std::sync::Arc;

use anyhow::Context;
use edgebox_core::{
    container::FileContainerManager,
    events::{EventsManager, DEFAULT_EVENTS_CAPACITY},
    network::{controller::IpLinkDriver, LocalNetworkManager, SystemInterfaces},
    registry::{Registration, ServiceContext, ServiceInstance, ServiceOptions, ServiceType},
};
use edgebox_server::{ServerConfig, UnixRpcServer};

use crate::twin::{client_configuration, TwinManager};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Id of the default events service.
pub const EVENTS_SERVICE_ID: &str = "edgebox.events";

/// Id of the default network manager.
pub const NET_SERVICE_ID: &str = "edgebox.net";

/// Id of the default container manager.
pub const CONTAINER_MANAGER_SERVICE_ID: &str = "edgebox.containers";

/// Id of the default twin connector.
pub const TWIN_SERVICE_ID: &str = "edgebox.twin";

/// Id of the default RPC server.
pub const RPC_SERVER_SERVICE_ID: &str = "edgebox.rpc";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the registrations the daemon runs with by default.
pub fn default_registrations() -> Vec<Registration> {
    vec![
        Registration::new(ServiceType::Events, EVENTS_SERVICE_ID, events_service),
        Registration::new(ServiceType::Net, NET_SERVICE_ID, net_service),
        Registration::new(
            ServiceType::ContainerManager,
            CONTAINER_MANAGER_SERVICE_ID,
            container_manager_service,
        ),
        Registration::new(ServiceType::Twin, TWIN_SERVICE_ID, twin_service),
        Registration::new(ServiceType::GrpcServer, RPC_SERVER_SERVICE_ID, rpc_server_service),
    ]
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn events_service(_ctx: ServiceContext) -> anyhow::Result<ServiceInstance> {
    Ok(ServiceInstance::Events(Arc::new(EventsManager::new(
        DEFAULT_EVENTS_CAPACITY,
    ))))
}

async fn net_service(ctx: ServiceContext) -> anyhow::Result<ServiceInstance> {
    let ServiceOptions::Net(config) = ctx.options else {
        anyhow::bail!("network manager requires network options");
    };

    let manager = LocalNetworkManager::new(
        config,
        Arc::new(IpLinkDriver::new()),
        Arc::new(SystemInterfaces),
    );
    Ok(ServiceInstance::Net(Arc::new(manager)))
}

async fn container_manager_service(ctx: ServiceContext) -> anyhow::Result<ServiceInstance> {
    let ServiceOptions::ContainerManager(config) = ctx.options else {
        anyhow::bail!("container manager requires manager options");
    };

    let net = ctx
        .services
        .network_manager()
        .context("container manager requires a network manager")?;

    let mut manager =
        FileContainerManager::new(config.meta_path.clone(), net).with_stop_timeout(config.stop_timeout());
    if let Some(runtime) = ctx.services.container_runtime() {
        manager = manager.with_runtime(runtime);
    }
    if let Some(events) = ctx.services.events() {
        manager = manager.with_events(events);
    }

    Ok(ServiceInstance::ContainerManager(Arc::new(manager)))
}

async fn twin_service(ctx: ServiceContext) -> anyhow::Result<ServiceInstance> {
    let ServiceOptions::Twin(config) = ctx.options else {
        anyhow::bail!("twin connector requires things options");
    };

    let mut twin = TwinManager::new(client_configuration(&config));
    if let Some(containers) = ctx.services.container_managers().into_iter().next() {
        twin = twin.with_containers(containers);
    }
    if let Some(events) = ctx.services.events() {
        twin = twin.with_events(events);
    }

    Ok(ServiceInstance::Twin(Arc::new(twin)))
}

async fn rpc_server_service(ctx: ServiceContext) -> anyhow::Result<ServiceInstance> {
    let ServiceOptions::GrpcServer(config) = ctx.options else {
        anyhow::bail!("rpc server requires server options");
    };

    let socket_path = config
        .address
        .clone()
        .context("rpc server requires a socket path")?;
    let containers = ctx
        .services
        .container_managers()
        .into_iter()
        .next()
        .context("rpc server requires a container manager")?;

    let server = UnixRpcServer::new(ServerConfig::from_daemon(&config, socket_path)?, containers);
    Ok(ServiceInstance::RpcServer(Arc::new(server)))
}
