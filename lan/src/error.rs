use thiserror::Error;

#[derive(Debug, Error)]
pub enum LanError {
    #[error("failed to bind discovery socket: {0}")]
    DiscoveryBind(std::io::Error),

    #[error("failed to create enet host: {0}")]
    HostCreate(#[source] std::io::Error),

    #[error("failed to connect to host at {0}: {1}")]
    Connect(std::net::SocketAddr, std::io::Error),

    #[error("enet host read failed: {0}")]
    HostRead(std::io::Error),

    #[error("a session is already active")]
    AlreadyActive,

    #[error("no session is active")]
    NotActive,

    #[error(transparent)]
    Proto(#[from] nifi_proto::ProtoError),
}
