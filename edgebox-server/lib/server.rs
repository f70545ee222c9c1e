//! The Unix socket listener.

use std::sync::Arc;

use async_trait::async_trait;
use edgebox_core::{container::ContainerManager, registry::RpcServer};
use edgebox_utils::{ensure_dir_with_mode, remove_file_if_exists};
use tokio::{net::UnixListener, sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{config::ServerConfig, route::create_router, state::AppState, ServerError, ServerResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Mode of the socket's directory.
const SOCKET_DIR_MODE: u32 = 0o755;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Serves the local API on a Unix socket until stopped.
pub struct UnixRpcServer {
    state: AppState,
    running: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UnixRpcServer {
    /// Creates a stopped server.
    pub fn new(config: ServerConfig, containers: Arc<dyn ContainerManager>) -> Self {
        Self {
            state: AppState::new(Arc::new(config), containers),
            running: Mutex::new(None),
        }
    }

    /// The handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Binds the socket and starts serving in the background.
    pub async fn serve(&self) -> ServerResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let socket_path = self.state.get_config().get_socket_path().clone();
        if let Some(parent) = socket_path.parent() {
            ensure_dir_with_mode(parent, SOCKET_DIR_MODE)
                .map_err(|e| ServerError::ConfigError(e.to_string()))?;
        }
        remove_file_if_exists(&socket_path)
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        let listener = UnixListener::bind(&socket_path)?;
        tracing::info!("local api listening on {}", socket_path.display());

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let router = create_router(self.state.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!("local api server failed: {e}");
            }
        });

        *running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Stops serving, waits for in-flight requests and removes the socket.
    pub async fn shutdown(&self) -> ServerResult<()> {
        let Some(Running { cancel, handle }) = self.running.lock().await.take() else {
            return Ok(());
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::warn!("local api server task ended abnormally: {e}");
        }

        let socket_path = self.state.get_config().get_socket_path();
        remove_file_if_exists(socket_path).map_err(|e| ServerError::ConfigError(e.to_string()))?;
        tracing::info!("local api stopped");
        Ok(())
    }

    /// Whether the server is serving.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl RpcServer for UnixRpcServer {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(self.serve().await?)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(self.shutdown().await?)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
