// Device link contract - how the session reaches the hardware
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial access is not available on this host")]
    Unsupported,

    #[error("no device was selected")]
    SelectionCancelled,

    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opened device: one inbound byte path and one outbound byte path.
pub struct DeviceLink<R, W> {
    pub port_name: String,
    pub reader: R,
    pub writer: W,
}

#[async_trait]
pub trait DeviceConnector: Send + Sync + 'static {
    type Reader: AsyncRead + Send + Unpin + 'static;
    type Writer: AsyncWrite + Send + Unpin + 'static;

    /// Capability check, run before every connect.
    async fn is_supported(&self) -> bool;

    /// Select and open a device.
    async fn open(&self) -> Result<DeviceLink<Self::Reader, Self::Writer>, LinkError>;

    /// Close the device handle. A half is `None` when its task was lost.
    async fn release(
        &self,
        reader: Option<Self::Reader>,
        writer: Option<Self::Writer>,
    ) -> Result<(), LinkError>;
}
