//! The daemon orchestrator.
//!
//! Boot takes the run-lock, clears a stale RPC socket, initializes every registered service in
//! [`BOOT_ORDER`], loads and restores containers, connects the twin and starts the RPC servers.
//! Shutdown stops the RPC servers, disposes the container managers, disconnects the twin and
//! releases the run-lock, in that order.

use std::path::{Path, PathBuf};

use edgebox_core::{
    config::DaemonConfig,
    registry::{
        Registration, Registry, ServiceContext, ServiceInfo, ServiceInfoSet, ServiceOptions,
        ServiceType, BOOT_ORDER,
    },
};
use edgebox_utils::{remove_file_if_exists, run_lock_path, RunLock};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::{services, twin::client_configuration, CliResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Collects the service registrations the daemon boots with.
pub struct DaemonBuilder {
    config: DaemonConfig,
    registry: Registry,
}

/// A configured daemon.
pub struct Daemon {
    config: DaemonConfig,
    registry: Registry,
    services: ServiceInfoSet,
    cancel: CancellationToken,
    lock: RunLock,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DaemonBuilder {
    /// Creates a builder without registrations.
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
        }
    }

    /// Adds the default services.
    pub fn with_default_services(self) -> CliResult<Self> {
        services::default_registrations()
            .into_iter()
            .try_fold(self, |builder, registration| builder.register(registration))
    }

    /// Adds a registration. Type and id must be unique.
    pub fn register(self, registration: Registration) -> CliResult<Self> {
        self.registry.register(registration)?;
        Ok(self)
    }

    /// Builds the daemon.
    pub fn build(self) -> Daemon {
        let lock = RunLock::new(run_lock_path(&self.config.socket_path()));
        Daemon {
            config: self.config,
            registry: self.registry,
            services: ServiceInfoSet::new(),
            cancel: CancellationToken::new(),
            lock,
        }
    }
}

impl Daemon {
    /// The daemon configuration.
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// The services of the current boot.
    pub fn services(&self) -> &ServiceInfoSet {
        &self.services
    }

    /// The RPC socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path()
    }

    /// Boots the daemon. The run-lock is released again when boot fails after taking it.
    pub async fn start(&mut self) -> CliResult<()> {
        if self.config.things.enable {
            client_configuration(&self.config.things).validate()?;
        }

        let socket_path = self.socket_path();
        let socket_dir = socket_path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(socket_dir)?;

        self.lock.try_lock()?;
        tracing::info!("acquired run-lock {}", self.lock.path().display());

        if let Err(e) = self.boot(&socket_path).await {
            self.release_lock();
            return Err(e);
        }

        tracing::info!("edgeboxd started");
        Ok(())
    }

    /// Shuts the daemon down. Failures are logged and the remaining steps still run.
    pub async fn stop(&mut self) {
        for server in self.services.rpc_servers() {
            if let Err(e) = server.stop().await {
                tracing::error!("failed to stop rpc server: {:#}", e);
            }
        }

        for manager in self.services.container_managers() {
            if let Err(e) = manager.dispose().await {
                tracing::error!("failed to dispose container manager: {}", e);
            }
        }

        for twin in self.services.twin_connectors() {
            if let Err(e) = twin.disconnect().await {
                tracing::error!("failed to disconnect twin: {:#}", e);
            }
        }

        self.cancel.cancel();
        self.release_lock();
        tracing::info!("edgeboxd stopped");
    }

    async fn boot(&mut self, socket_path: &Path) -> CliResult<()> {
        remove_file_if_exists(socket_path)?;
        self.init_services().await?;

        for manager in self.services.container_managers() {
            manager.load().await?;
            if let Err(e) = manager.restore().await {
                tracing::error!("failed to restore containers: {}", e);
            }
        }

        if self.config.things.enable {
            for twin in self.services.twin_connectors() {
                if let Err(e) = twin.connect().await {
                    tracing::error!("failed to connect twin: {:#}", e);
                }
            }
        }

        for server in self.services.rpc_servers() {
            if let Err(e) = server.start().await {
                tracing::error!("failed to start rpc server: {:#}", e);
            }
        }

        Ok(())
    }

    async fn init_services(&mut self) -> CliResult<()> {
        let registrations = self.registry.registrations_map();

        for service_type in BOOT_ORDER {
            if !self.is_enabled(service_type) {
                tracing::debug!("skipping disabled service type {}", service_type);
                continue;
            }

            let Some(group) = registrations.get(&service_type) else {
                continue;
            };

            for registration in group {
                let ctx = ServiceContext {
                    cancel: self.cancel.clone(),
                    options: self.options_for(service_type),
                    registration: registration.clone(),
                    services: self.services.clone(),
                };
                let info = ServiceInfo::initialize(registration.clone(), ctx).await;
                self.services.add(info)?;
            }
        }

        Ok(())
    }

    fn is_enabled(&self, service_type: ServiceType) -> bool {
        match service_type {
            ServiceType::Twin => self.config.things.enable,
            ServiceType::Deployment => self.config.deployment.enable,
            _ => true,
        }
    }

    /// The options handed to factories of `service_type`.
    pub fn options_for(&self, service_type: ServiceType) -> ServiceOptions {
        match service_type {
            ServiceType::Net => ServiceOptions::Net(self.config.network_config()),
            ServiceType::ContainerManager => {
                ServiceOptions::ContainerManager(self.config.manager.clone())
            }
            ServiceType::Twin => ServiceOptions::Twin(self.config.things.clone()),
            ServiceType::Deployment => ServiceOptions::Deployment(self.config.deployment.clone()),
            ServiceType::GrpcServer => {
                let mut grpc = self.config.grpc_server.clone();
                grpc.address = Some(self.socket_path());
                ServiceOptions::GrpcServer(grpc)
            }
            _ => ServiceOptions::Empty,
        }
    }

    fn release_lock(&self) {
        if let Err(e) = self.lock.unlock() {
            tracing::warn!("failed to release run-lock: {}", e);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Waits for INT, QUIT, TERM or HUP and returns the name of the signal received.
pub async fn wait_for_signal() -> CliResult<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = quit.recv() => "SIGQUIT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    };
    Ok(name)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use edgebox_core::registry::{RpcServer, ServiceInstance, TwinConnector};
    use edgebox_utils::UtilsError;
    use tempfile::TempDir;

    use super::*;
    use crate::CliError;

    type Calls = Arc<Mutex<Vec<String>>>;

    struct RecordingServer {
        calls: Calls,
    }

    struct RecordingTwin {
        calls: Calls,
    }

    #[async_trait]
    impl RpcServer for RecordingServer {
        async fn start(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("rpc:start".to_string());
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("rpc:stop".to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl TwinConnector for RecordingTwin {
        async fn connect(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("twin:connect".to_string());
            Ok(())
        }

        async fn disconnect(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("twin:disconnect".to_string());
            Ok(())
        }
    }

    fn config(dir: &TempDir) -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.manager.meta_path = dir.path().join("meta");
        config.manager.exec_root = dir.path().join("run");
        config
    }

    fn server_registration(calls: &Calls) -> Registration {
        let calls = calls.clone();
        Registration::new(ServiceType::GrpcServer, "test.rpc", move |ctx: ServiceContext| {
            let calls = calls.clone();
            async move {
                let ServiceOptions::GrpcServer(options) = ctx.options else {
                    anyhow::bail!("unexpected options");
                };
                anyhow::ensure!(options.address.is_some(), "socket path is missing");
                Ok::<_, anyhow::Error>(ServiceInstance::RpcServer(Arc::new(RecordingServer {
                    calls,
                })))
            }
        })
    }

    fn twin_registration(calls: &Calls) -> Registration {
        let calls = calls.clone();
        Registration::new(ServiceType::Twin, "test.twin", move |_ctx: ServiceContext| {
            let calls = calls.clone();
            async move {
                Ok::<_, anyhow::Error>(ServiceInstance::Twin(Arc::new(RecordingTwin { calls })))
            }
        })
    }

    #[test_log::test(tokio::test)]
    async fn test_second_instance_fails_fast() -> anyhow::Result<()> {
        let dir = TempDir::new()?;

        let mut first = DaemonBuilder::new(config(&dir)).build();
        first.start().await?;

        let mut second = DaemonBuilder::new(config(&dir)).build();
        let result = second.start().await;
        assert!(matches!(
            result,
            Err(CliError::UtilsError(UtilsError::AlreadyRunning(_)))
        ));

        first.stop().await;
        second.start().await?;
        second.stop().await;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_stale_socket_is_removed() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut daemon = DaemonBuilder::new(config(&dir)).build();

        std::fs::create_dir_all(dir.path().join("run"))?;
        std::fs::write(daemon.socket_path(), b"stale")?;

        daemon.start().await?;
        assert!(!daemon.socket_path().exists());
        assert!(dir.path().join("run").join("lock").exists());
        daemon.stop().await;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_services_boot_in_order_and_stop_in_sequence() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let calls: Calls = Arc::default();

        let mut config = config(&dir);
        config.things.enable = true;

        let mut daemon = DaemonBuilder::new(config)
            .register(server_registration(&calls))?
            .register(twin_registration(&calls))?
            .build();

        daemon.start().await?;
        let types: Vec<ServiceType> = daemon
            .services()
            .infos()
            .map(|info| info.service_type())
            .collect();
        assert_eq!(types, vec![ServiceType::Twin, ServiceType::GrpcServer]);

        daemon.stop().await;
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["twin:connect", "rpc:start", "rpc:stop", "twin:disconnect"]
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_disabled_twin_is_not_initialized() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let calls: Calls = Arc::default();

        let mut daemon = DaemonBuilder::new(config(&dir))
            .register(twin_registration(&calls))?
            .build();

        daemon.start().await?;
        assert!(daemon.services().is_empty());
        daemon.stop().await;
        assert!(calls.lock().unwrap().is_empty());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_factory_does_not_abort_boot() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let calls: Calls = Arc::default();

        let failing =
            Registration::new(ServiceType::Events, "test.failing", |_ctx: ServiceContext| async {
                Err::<ServiceInstance, _>(anyhow::anyhow!("boom"))
            });
        let mut daemon = DaemonBuilder::new(config(&dir))
            .register(failing)?
            .register(server_registration(&calls))?
            .build();

        daemon.start().await?;
        let infos: Vec<&ServiceInfo> = daemon.services().infos().collect();
        assert_eq!(infos.len(), 2);
        assert!(infos[0].instance.is_none());
        assert!(infos[0].error.as_deref().is_some_and(|e| e.contains("boom")));
        assert_eq!(*calls.lock().unwrap(), vec!["rpc:start"]);
        daemon.stop().await;
        Ok(())
    }

    #[test]
    fn test_duplicate_registration_is_rejected() -> anyhow::Result<()> {
        let calls: Calls = Arc::default();
        let result = DaemonBuilder::new(DaemonConfig::default())
            .register(twin_registration(&calls))?
            .register(twin_registration(&calls));
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_options_follow_configuration() {
        let dir = TempDir::new().unwrap();
        let daemon = DaemonBuilder::new(config(&dir)).build();

        match daemon.options_for(ServiceType::GrpcServer) {
            ServiceOptions::GrpcServer(options) => {
                assert_eq!(options.address, Some(dir.path().join("run").join("edgebox.sock")))
            }
            other => panic!("unexpected options {:?}", other),
        }
        match daemon.options_for(ServiceType::Net) {
            ServiceOptions::Net(options) => {
                assert_eq!(options.get_meta_path(), &dir.path().join("meta"))
            }
            other => panic!("unexpected options {:?}", other),
        }
        assert!(matches!(
            daemon.options_for(ServiceType::Events),
            ServiceOptions::Empty
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_default_services_are_registered() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let daemon = DaemonBuilder::new(config(&dir)).with_default_services()?.build();

        let ids: Vec<String> = daemon
            .registry
            .registrations()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids.len(), 5);
        assert!(ids.contains(&services::TWIN_SERVICE_ID.to_string()));
        Ok(())
    }
}
