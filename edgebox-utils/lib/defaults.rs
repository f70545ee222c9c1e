//! Default paths and well-known file names shared by the edgebox crates.

use std::{path::PathBuf, sync::LazyLock};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default root for persisted daemon state (containers, networks).
pub static DEFAULT_META_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from("/var/lib/edgebox"));

/// Default root for runtime state (sockets, run-lock).
pub static DEFAULT_EXEC_ROOT: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from("/var/run/edgebox"));

/// Default location of the daemon configuration file.
pub static DEFAULT_CONFIG_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from("/etc/edgebox/config.json"));

/// File name of the local RPC socket inside the exec root.
pub const RPC_SOCKET_FILENAME: &str = "edgebox.sock";

/// File name of the run-lock placed beside the RPC socket.
pub const RUN_LOCK_FILENAME: &str = "lock";

/// Sub directory holding per-container state.
pub const CONTAINERS_SUBDIR: &str = "containers";

/// Sub directory holding the network controller state.
pub const NETWORK_SUBDIR: &str = "network";

/// Sub directory of the network exec root used by the network controller.
pub const NETWORK_EXEC_SUBDIR: &str = "libnetwork";

/// Name of the persisted container descriptor file.
pub const CONTAINER_CONFIG_FILENAME: &str = "config.json";

/// Name of the per-container hostname file.
pub const HOSTNAME_FILENAME: &str = "hostname";

/// Name of the per-container hosts file.
pub const HOSTS_FILENAME: &str = "hosts";

/// Name of the per-container resolv.conf file.
pub const RESOLV_CONF_FILENAME: &str = "resolv.conf";

/// The host's hosts file, used by host-mode containers.
pub const HOST_HOSTS_PATH: &str = "/etc/hosts";

/// The host's resolver configuration, used by host-mode containers.
pub const HOST_RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

/// Default name of the Linux bridge interface managed by the daemon.
pub const DEFAULT_BRIDGE_NAME: &str = "edgebox0";

/// Default network name containers in bridge mode attach to.
pub const DEFAULT_BRIDGE_NETWORK: &str = "bridge";

/// Network name containers in host mode attach to.
pub const DEFAULT_HOST_NETWORK: &str = "host";
