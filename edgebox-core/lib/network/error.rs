use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a network operation.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// The result of resolving an extra-host value.
pub type ResolverResult<T> = Result<T, ResolverError>;

/// An error raised by the network manager or its controller.
#[derive(pretty_error_debug::Debug, Error)]
pub enum NetworkError {
    /// An I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An error from the utils crate.
    #[error(transparent)]
    UtilsError(#[from] edgebox_utils::UtilsError),

    /// The controller has not been created yet (restore/initialize did not run).
    #[error("network controller is not initialized")]
    ControllerNotInitialized,

    /// No network with the given name or id.
    #[error("network not found: {0}")]
    NetworkNotFound(String),

    /// A network with the same name already exists.
    #[error("network already exists: {0}")]
    NetworkExists(String),

    /// The network still has endpoints.
    #[error("network {0} has active endpoints")]
    ActiveEndpoints(String),

    /// No sandbox for the given container or id.
    #[error("sandbox not found for {0}")]
    SandboxNotFound(String),

    /// The container already has a sandbox.
    #[error("container {0} already has sandbox {1}")]
    SandboxExists(String, String),

    /// No endpoint with the given id.
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    /// The endpoint is still joined to a sandbox.
    #[error("endpoint {0} is still joined to sandbox {1}")]
    EndpointInUse(String, String),

    /// The endpoint is already joined to a sandbox.
    #[error("endpoint {0} is already joined to sandbox {1}")]
    EndpointAlreadyJoined(String, String),

    /// The container is not connected to the network.
    #[error("container {0} is not connected to network {1}")]
    NotConnected(String, String),

    /// The address pool of a network has no free addresses.
    #[error("no available addresses in network {0}")]
    AddressPoolExhausted(String),

    /// An address or prefix could not be parsed or used.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The link driver failed.
    #[error("link driver error: {0}")]
    DriverError(String),

    /// The host name could not be read.
    #[error("failed to read host name: {0}")]
    HostnameError(#[from] nix::errno::Errno),
}

/// An error raised while resolving a symbolic extra-host value.
#[derive(pretty_error_debug::Debug, Error)]
pub enum ResolverError {
    /// `host_ip_` was given without an interface name.
    #[error("an interface name is required after host_ip_")]
    InterfaceNameRequired,

    /// `host_ip` is only valid for containers in bridge mode.
    #[error("host_ip is only supported for containers in bridge network mode")]
    HostIpRequiresBridgeMode,

    /// The host interface does not exist.
    #[error("interface {0} not found")]
    InterfaceNotFound(String),

    /// The host interface has no non-loopback IPv4 address.
    #[error("interface {0} has no suitable IPv4 address")]
    NoSuitableAddress(String),

    /// The host interface reported an address that is not an IP address.
    #[error("interface {0} has an address of unsupported family {1}")]
    UnsupportedAddressFamily(String, String),

    /// No other container has the requested hostname.
    #[error("no container with hostname {0} found")]
    ContainerNotFound(String),

    /// More than one other container has the requested hostname.
    #[error("{1} containers with hostname {0} found")]
    AmbiguousContainer(String, usize),

    /// The referenced container is not in bridge mode.
    #[error("container with hostname {0} is not in bridge network mode")]
    ContainerNotInBridgeMode(String),

    /// The referenced container has no bridge address yet.
    #[error("container with hostname {0} has no bridge address")]
    ContainerNotConnected(String),

    /// Enumerating host interfaces failed.
    #[error("failed to list host interfaces: {0}")]
    InterfaceLookupFailed(String),
}
