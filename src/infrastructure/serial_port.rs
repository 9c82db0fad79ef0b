// Serial port adapter - tokio-serial implementation of the device link
use crate::application::device_link::{DeviceConnector, DeviceLink, LinkError};
use crate::application::serial_session::SessionHandle;
use crate::infrastructure::config::SerialSettings;
use async_trait::async_trait;
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::{
    ClearBuffer, DataBits, ErrorKind, FlowControl, Parity, SerialPort, SerialPortBuilderExt,
    SerialPortInfo, SerialStream, StopBits,
};

pub struct SerialPortConnector {
    port: Option<String>,
    baud_rate: u32,
}

impl SerialPortConnector {
    pub fn new(settings: &SerialSettings) -> Self {
        Self {
            port: settings.port().map(str::to_string),
            baud_rate: settings.baud_rate,
        }
    }

    async fn select_port(&self) -> Result<String, LinkError> {
        if let Some(port) = &self.port {
            return Ok(port.clone());
        }

        let ports = list_ports().await.map_err(|_| LinkError::Unsupported)?;
        ports
            .into_iter()
            .map(|p| p.port_name)
            .next()
            .ok_or(LinkError::SelectionCancelled)
    }
}

#[async_trait]
impl DeviceConnector for SerialPortConnector {
    type Reader = ReadHalf<SerialStream>;
    type Writer = WriteHalf<SerialStream>;

    async fn is_supported(&self) -> bool {
        list_ports().await.is_ok()
    }

    async fn open(&self) -> Result<DeviceLink<Self::Reader, Self::Writer>, LinkError> {
        let port_name = self.select_port().await?;

        tracing::info!("Opening serial port: {} at {} baud", port_name, self.baud_rate);

        let stream = tokio_serial::new(&port_name, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| LinkError::Open {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        let (reader, writer) = tokio::io::split(stream);
        Ok(DeviceLink {
            port_name,
            reader,
            writer,
        })
    }

    async fn release(
        &self,
        reader: Option<Self::Reader>,
        writer: Option<Self::Writer>,
    ) -> Result<(), LinkError> {
        // Without both halves the stream cannot be reassembled; dropping the
        // remaining half is then the last reference and closes the port.
        let (Some(reader), Some(writer)) = (reader, writer) else {
            return Ok(());
        };

        let stream = reader.unsplit(writer);
        stream
            .clear(ClearBuffer::All)
            .map_err(|e| LinkError::Io(e.into()))?;
        drop(stream);
        Ok(())
    }
}

/// Enumerate ports on the blocking pool; the lookup walks the OS device tree.
async fn list_ports() -> tokio_serial::Result<Vec<SerialPortInfo>> {
    tokio::task::spawn_blocking(tokio_serial::available_ports)
        .await
        .map_err(|e| tokio_serial::Error::new(ErrorKind::Unknown, e.to_string()))?
}

/// Poll the host's port list and report the connected port to the session
/// once it disappears. Ends when the session shuts down.
pub async fn watch_port_presence(session: SessionHandle, settings: SerialSettings) {
    let mut ticker = tokio::time::interval(settings.presence_poll_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if session.is_closed() {
            break;
        }

        let view = session.view();
        if !view.is_connected() {
            continue;
        }
        let Some(port) = view.port else {
            continue;
        };

        let present = match list_ports().await {
            Ok(ports) => ports.iter().any(|p| p.port_name == port),
            Err(e) => {
                tracing::debug!("Failed to list serial ports: {}", e);
                continue;
            }
        };

        if !present && session.device_removed(port).await.is_err() {
            tracing::debug!("session closed, stopping port watcher");
            break;
        }
    }
}
