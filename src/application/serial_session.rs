// Serial session - connection lifecycle actor for the device link
//
// One task owns the link state. User actions, device events and read-loop
// exits all arrive as commands on the same channel, so teardown is decided by
// the current state alone and runs at most once per connection.
use crate::application::clock::Clock;
use crate::application::device_link::{DeviceConnector, LinkError};
use crate::application::ingestion::{IngestionPipeline, IngestionSettings};
use crate::application::notifier::{Notification, Notifier};
use crate::domain::rolling_window::WindowSnapshot;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const COMMAND_CAPACITY: usize = 32;
const READ_BUFFER_SIZE: usize = 1024;
const WRITE_QUEUE_CAPACITY: usize = 8;
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("serial access is not supported on this host")]
    CapabilityUnavailable,

    #[error("a device is already connected")]
    AlreadyConnected,

    #[error("device selection was cancelled")]
    SelectionCancelled,

    #[error("could not connect to the serial device: {0}")]
    OpenFailure(String),

    #[error("serial device is not connected for writing")]
    NotConnected,

    #[error("could not send data to the device: {0}")]
    WriteFailure(String),

    #[error("serial session has shut down")]
    SessionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// What observers see: replaced wholesale on every change.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub state: ConnectionState,
    pub port: Option<String>,
    pub anomaly: bool,
    pub readings: WindowSnapshot,
}

impl SessionView {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            port: None,
            anomaly: false,
            readings: WindowSnapshot::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LoopExit {
    Cancelled,
    EndOfStream,
    ReadFailed(String),
}

enum Command {
    Connect {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Write {
        message: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    DeviceRemoved {
        port: String,
    },
    LoopExited {
        generation: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// One framed outbound message, answered by the writer task.
struct WriteRequest {
    framed: String,
    reply: oneshot::Sender<Result<(), SessionError>>,
}

/// Cloneable front door to the session actor.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// No-op when already disconnected.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub async fn write(&self, message: impl Into<String>) -> Result<(), SessionError> {
        let message = message.into();
        self.request(|reply| Command::Write { message, reply })
            .await?
    }

    /// Actuator toggle: `"1"` for on, `"0"` for off.
    pub async fn set_fan(&self, on: bool) -> Result<(), SessionError> {
        self.write(if on { "1" } else { "0" }).await
    }

    /// Hardware removal reported by the host.
    pub async fn device_removed(&self, port: impl Into<String>) -> Result<(), SessionError> {
        self.commands
            .send(Command::DeviceRemoved { port: port.into() })
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Tear down any connection and stop the actor.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// True once the actor has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        response.await.map_err(|_| SessionError::SessionClosed)
    }
}

struct ActiveLink<C: DeviceConnector> {
    generation: u64,
    port_name: String,
    writes: mpsc::Sender<WriteRequest>,
    cancel: CancellationToken,
    reader_task: JoinHandle<Option<C::Reader>>,
    writer_task: JoinHandle<C::Writer>,
}

enum LinkState<C: DeviceConnector> {
    Disconnected,
    Connected(ActiveLink<C>),
}

pub struct SerialSession<C: DeviceConnector> {
    connector: Arc<C>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: IngestionSettings,
    view: Arc<watch::Sender<SessionView>>,
    commands: mpsc::WeakSender<Command>,
    state: LinkState<C>,
    generation: u64,
}

impl<C: DeviceConnector> SerialSession<C> {
    /// Start the actor and return a handle to it. The actor stops after an
    /// explicit shutdown or once every handle has been dropped, releasing the
    /// device either way.
    pub fn spawn(
        connector: Arc<C>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: IngestionSettings,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (view_tx, view_rx) = watch::channel(SessionView::default());

        let session = SerialSession {
            connector,
            notifier,
            clock,
            settings,
            view: Arc::new(view_tx),
            commands: tx.downgrade(),
            state: LinkState::Disconnected,
            generation: 0,
        };
        tokio::spawn(session.run(rx));

        SessionHandle {
            commands: tx,
            view: view_rx,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Connect { reply } => {
                    let result = self.connect().await;
                    let _ = reply.send(result);
                }
                Command::Disconnect { reply } => {
                    self.teardown().await;
                    let _ = reply.send(());
                }
                Command::Write { message, reply } => self.write(message, reply),
                Command::DeviceRemoved { port } => {
                    if matches!(&self.state, LinkState::Connected(link) if link.port_name == port) {
                        tracing::info!(%port, "device removed");
                        self.teardown().await;
                    }
                }
                Command::LoopExited { generation } => {
                    // a stale exit from an earlier connection is ignored
                    if matches!(&self.state, LinkState::Connected(link) if link.generation == generation)
                    {
                        self.teardown().await;
                    }
                }
                Command::Shutdown { reply } => {
                    self.teardown().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }

        // covers the case where every handle was dropped
        self.teardown().await;
        tracing::debug!("serial session stopped");
    }

    fn publish_state(&self, state: ConnectionState, port: Option<String>) {
        self.view.send_modify(|view| {
            view.state = state;
            view.port = port;
            if state == ConnectionState::Disconnected {
                view.anomaly = false;
            }
        });
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, LinkState::Disconnected) {
            return Err(SessionError::AlreadyConnected);
        }

        if !self.connector.is_supported().await {
            self.notifier.notify(Notification::error(
                "Unsupported Device Access",
                "Serial port access is not available on this host.",
            ));
            return Err(SessionError::CapabilityUnavailable);
        }

        self.publish_state(ConnectionState::Connecting, None);

        let link = match self.connector.open().await {
            Ok(link) => link,
            Err(LinkError::SelectionCancelled) => {
                tracing::debug!("device selection cancelled");
                self.publish_state(ConnectionState::Disconnected, None);
                return Err(SessionError::SelectionCancelled);
            }
            Err(e) => {
                tracing::error!("Failed to connect: {}", e);
                self.publish_state(ConnectionState::Disconnected, None);
                self.notifier.notify(Notification::error(
                    "Connection Failed",
                    "Could not connect to the serial device.",
                ));
                return Err(SessionError::OpenFailure(e.to_string()));
            }
        };

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();

        let pipeline = IngestionPipeline::new(&self.settings, &self.view.borrow().readings);
        let read_loop = ReadLoop {
            generation,
            pipeline,
            clock: self.clock.clone(),
            notifier: self.notifier.clone(),
            view: self.view.clone(),
            commands: self.commands.clone(),
            cancel: cancel.clone(),
        };
        let reader_task = tokio::spawn(read_loop.run(link.reader));

        let (writes, requests) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let write_loop = WriteLoop {
            writer: link.writer,
            requests,
            notifier: self.notifier.clone(),
            cancel: cancel.clone(),
        };
        let writer_task = tokio::spawn(write_loop.run());

        tracing::info!(port = %link.port_name, generation, "serial device connected");
        self.publish_state(ConnectionState::Connected, Some(link.port_name.clone()));
        self.state = LinkState::Connected(ActiveLink {
            generation,
            port_name: link.port_name,
            writes,
            cancel,
            reader_task,
            writer_task,
        });
        self.notifier.notify(Notification::info(
            "Connected!",
            "Successfully connected to the serial device.",
        ));

        Ok(())
    }

    /// Release everything held for the current connection. Safe to call in
    /// any state; only a connected link is torn down.
    async fn teardown(&mut self) {
        let LinkState::Connected(link) =
            std::mem::replace(&mut self.state, LinkState::Disconnected)
        else {
            return;
        };
        let ActiveLink {
            generation,
            port_name,
            writes,
            cancel,
            reader_task,
            writer_task,
        } = link;
        drop(writes);

        self.publish_state(ConnectionState::Disconnecting, Some(port_name.clone()));

        cancel.cancel();
        let reader = match reader_task.await {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(generation, "read loop ended abnormally: {}", e);
                None
            }
        };

        let writer = match writer_task.await {
            Ok(mut writer) => {
                match tokio::time::timeout(WRITER_CLOSE_TIMEOUT, writer.shutdown()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!(generation, "ignoring writer close error: {}", e),
                    Err(_) => tracing::debug!(generation, "writer close timed out"),
                }
                Some(writer)
            }
            Err(e) => {
                tracing::warn!(generation, "write loop ended abnormally: {}", e);
                None
            }
        };

        if let Err(e) = self.connector.release(reader, writer).await {
            tracing::warn!(port = %port_name, "Error closing port: {}", e);
        }

        self.publish_state(ConnectionState::Disconnected, None);
        tracing::info!(port = %port_name, generation, "serial device disconnected");
        self.notifier.notify(Notification::info(
            "Disconnected",
            "Serial device has been disconnected.",
        ));
    }

    /// Hand the message to the writer task. The reply is sent from there, so
    /// a slow device never holds up the command loop.
    fn write(&self, message: String, reply: oneshot::Sender<Result<(), SessionError>>) {
        let LinkState::Connected(link) = &self.state else {
            self.notifier.notify(Notification::error(
                "Write Error",
                "Serial device is not connected for writing.",
            ));
            let _ = reply.send(Err(SessionError::NotConnected));
            return;
        };

        let request = WriteRequest {
            framed: format!("{}\n", message),
            reply,
        };
        let (request, reason) = match link.writes.try_send(request) {
            Ok(()) => return,
            Err(TrySendError::Full(request)) => (request, "write queue is full"),
            Err(TrySendError::Closed(request)) => (request, "writer has stopped"),
        };

        tracing::warn!(generation = link.generation, "Dropping serial write: {}", reason);
        self.notifier.notify(Notification::error(
            "Write Error",
            "Could not send data to the device.",
        ));
        let _ = request.reply.send(Err(SessionError::WriteFailure(reason.to_string())));
    }
}

struct WriteLoop<W> {
    writer: W,
    requests: mpsc::Receiver<WriteRequest>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
}

impl<W> WriteLoop<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    /// Returns the writer so the session can close the device with it.
    async fn run(mut self) -> W {
        loop {
            let request = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.requests.recv() => match next {
                    Some(request) => request,
                    None => break,
                },
            };

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "device disconnected during write",
                )),
                written = write_framed(&mut self.writer, request.framed.as_bytes()) => written,
            };

            let result = result.map_err(|e| {
                tracing::error!("Failed to write to serial port: {}", e);
                self.notifier.notify(Notification::error(
                    "Write Error",
                    "Could not send data to the device.",
                ));
                SessionError::WriteFailure(e.to_string())
            });
            let _ = request.reply.send(result);
        }

        // anything still queued never reached the device
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            let _ = request.reply.send(Err(SessionError::NotConnected));
        }

        self.writer
    }
}

async fn write_framed<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

struct ReadLoop {
    generation: u64,
    pipeline: IngestionPipeline,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    view: Arc<watch::Sender<SessionView>>,
    commands: mpsc::WeakSender<Command>,
    cancel: CancellationToken,
}

impl ReadLoop {
    /// Returns the reader so the session can close the device with it.
    async fn run<R>(mut self, mut reader: R) -> Option<R>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let exit = loop {
            let alarm = self.pipeline.next_clear_at().map(|deadline| {
                Duration::from_millis((deadline - self.clock.now_ms()).max(0) as u64)
            });

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break LoopExit::Cancelled,
                _ = sleep_until_alarm(alarm) => {
                    if self.pipeline.expire_anomaly(self.clock.now_ms()) {
                        tracing::debug!(generation = self.generation, "anomaly flag cleared");
                        self.publish();
                    }
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break LoopExit::EndOfStream,
                    Ok(n) => {
                        let report = self.pipeline.ingest_bytes(&buf[..n], self.clock.as_ref());
                        if report.accepted > 0 || report.raised {
                            self.publish();
                        }
                    }
                    Err(e) => break LoopExit::ReadFailed(e.to_string()),
                },
            }
        };

        self.pipeline.stop();

        match &exit {
            LoopExit::Cancelled => return Some(reader),
            LoopExit::EndOfStream => {
                tracing::warn!(generation = self.generation, "serial stream ended");
            }
            LoopExit::ReadFailed(reason) => {
                tracing::error!(generation = self.generation, "Error reading from serial port: {}", reason);
                self.notifier.notify(Notification::error(
                    "Read Error",
                    "An error occurred while reading from the device.",
                ));
            }
        }

        // Ask the session to tear down. If it is already doing so it will have
        // cancelled us, so stop waiting for channel capacity at that point.
        if let Some(commands) = self.commands.upgrade() {
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = commands.send(Command::LoopExited { generation: self.generation }) => {}
            }
        }

        Some(reader)
    }

    fn publish(&self) {
        let readings = self.pipeline.snapshot();
        let anomaly = self.pipeline.anomaly_raised();
        self.view.send_modify(|view| {
            view.readings = readings;
            view.anomaly = anomaly;
        });
    }
}

async fn sleep_until_alarm(alarm: Option<Duration>) {
    match alarm {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
