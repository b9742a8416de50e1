//! Engine-agnostic sender/receiver link adapters.
//!
//! Each adapter pairs a cheap application-side handle with a dedicated
//! engine task that owns the underlying link. The bounded work channel
//! between them is the engine's work queue: its capacity is the credit
//! window, so `send` naturally waits for a credit slot, and the single
//! drain task preserves per-caller FIFO order. Link attachment (with its
//! retries) happens in [`super::engine`] before an adapter is built; the
//! adapter therefore starts `Open` and only moves to `Closed` or `Failed`.
//!
//! Engine faults are never process-fatal: the adapter publishes `Failed`
//! and every pending or later call observes an error, leaving the restart
//! decision to the owner.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Credit window granted to a receiver link, and the depth of a sender's
/// work queue.
pub const CREDIT_WINDOW: u32 = 100;

/// An outbound message: binary body plus the broker envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmqpMessage {
    /// UPER-encoded payload, sent as an AMQP binary section.
    pub body: Vec<u8>,
    /// Whether the broker must persist the message.
    pub durable: bool,
    /// Time to live in milliseconds.
    pub ttl_ms: u32,
    /// Broker priority.
    pub priority: u8,
    /// Authenticated user id stamped on the message.
    pub user: String,
    /// Target address.
    pub to: String,
    /// Application properties, in insertion order.
    pub properties: Vec<(String, PropertyValue)>,
}

/// An AMQP application-property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// A string property.
    Str(String),
    /// An integer property.
    Int(i64),
}

/// Body of an inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundBody {
    /// A binary section, expected to carry a UPER-encoded DENM.
    Binary(Vec<u8>),
    /// Any other section kind, named for logging.
    Other(&'static str),
}

/// Errors surfaced by the link adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The link was closed; during shutdown this is the expected outcome.
    #[error("link closed")]
    Closed,
    /// The engine reported a fault on the link or its connection.
    #[error("link failed: {0}")]
    Failed(String),
}

/// Lifecycle state of a link adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Attached and usable.
    Open,
    /// Cleanly closed.
    Closed,
    /// Faulted; calls return [`LinkError::Failed`].
    Failed,
}

/// Engine side of a sender link.
#[async_trait]
pub trait SenderTransport: Send {
    /// Hands one message to the underlying link and waits for the engine
    /// to settle it.
    async fn dispatch(&mut self, message: AmqpMessage) -> Result<(), LinkError>;
    /// Closes the underlying link.
    async fn close(&mut self) -> Result<(), LinkError>;
}

/// Engine side of a receiver link.
#[async_trait]
pub trait ReceiverTransport: Send {
    /// Grants `credit` additional message credits to the link.
    async fn replenish(&mut self, credit: u32) -> Result<(), LinkError>;
    /// Waits for the next delivery and accepts it.
    async fn next(&mut self) -> Result<InboundBody, LinkError>;
    /// Closes the underlying link.
    async fn close(&mut self) -> Result<(), LinkError>;
}

enum SendJob {
    Send {
        message: AmqpMessage,
        done: oneshot::Sender<Result<(), LinkError>>,
    },
    Close,
}

/// Application handle over one sender link.
pub struct SenderLink {
    work_tx: mpsc::Sender<SendJob>,
    status_rx: watch::Receiver<LinkStatus>,
}

impl SenderLink {
    /// Wraps an attached sender transport, spawning its engine task.
    #[must_use]
    pub fn spawn<T: SenderTransport + 'static>(transport: T, window: u32) -> Self {
        let (work_tx, work_rx) = mpsc::channel(window.max(1) as usize);
        let (status_tx, status_rx) = watch::channel(LinkStatus::Open);
        tokio::spawn(sender_task(transport, work_rx, status_tx));
        Self { work_tx, status_rx }
    }

    /// Submits one message, waiting for a credit slot and for the engine to
    /// settle the transfer. Per handle, messages are delivered in submit
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Closed`] after [`close`](Self::close) and
    /// [`LinkError::Failed`] once the link has faulted.
    pub async fn send(&self, message: AmqpMessage) -> Result<(), LinkError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.work_tx
            .send(SendJob::Send {
                message,
                done: done_tx,
            })
            .await
            .map_err(|_| self.terminal_error())?;
        match done_rx.await {
            Ok(result) => result,
            Err(_) => Err(self.terminal_error()),
        }
    }

    /// Closes the link and waits for the engine task to finish. Queued
    /// submissions ahead of the close are still delivered.
    pub async fn close(&self) {
        let _ = self.work_tx.send(SendJob::Close).await;
        let mut status_rx = self.status_rx.clone();
        while matches!(*status_rx.borrow(), LinkStatus::Open) {
            if status_rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.status_rx.borrow()
    }

    fn terminal_error(&self) -> LinkError {
        match *self.status_rx.borrow() {
            LinkStatus::Failed => LinkError::Failed("sender link failed".to_string()),
            _ => LinkError::Closed,
        }
    }
}

async fn sender_task<T: SenderTransport>(
    mut transport: T,
    mut work_rx: mpsc::Receiver<SendJob>,
    status_tx: watch::Sender<LinkStatus>,
) {
    while let Some(job) = work_rx.recv().await {
        match job {
            SendJob::Send { message, done } => match transport.dispatch(message).await {
                Ok(()) => {
                    let _ = done.send(Ok(()));
                }
                Err(e) => {
                    error!(error = %e, "sender link failed");
                    status_tx.send_replace(LinkStatus::Failed);
                    let _ = done.send(Err(e));
                    break;
                }
            },
            SendJob::Close => {
                if let Err(e) = transport.close().await {
                    debug!(error = %e, "error while closing sender link");
                }
                info!("sender link closed");
                status_tx.send_replace(LinkStatus::Closed);
                break;
            }
        }
    }
    if matches!(*status_tx.borrow(), LinkStatus::Open) {
        // Every handle was dropped without an explicit close.
        status_tx.send_replace(LinkStatus::Closed);
    }
    // Settle whatever was still queued behind the terminal state.
    let terminal = match *status_tx.borrow() {
        LinkStatus::Failed => LinkError::Failed("sender link failed".to_string()),
        _ => LinkError::Closed,
    };
    work_rx.close();
    while let Ok(job) = work_rx.try_recv() {
        if let SendJob::Send { done, .. } = job {
            let _ = done.send(Err(terminal.clone()));
        }
    }
}

enum ReceiverCtrl {
    Consumed,
    Close,
}

/// Application handle over one receiver link.
pub struct ReceiverLink {
    buffer_rx: mpsc::Receiver<InboundBody>,
    ctrl_tx: mpsc::Sender<ReceiverCtrl>,
    status_rx: watch::Receiver<LinkStatus>,
}

/// Clonable handle that can close a [`ReceiverLink`] from another task.
#[derive(Clone)]
pub struct ReceiverCloser {
    ctrl_tx: mpsc::Sender<ReceiverCtrl>,
    status_rx: watch::Receiver<LinkStatus>,
}

impl ReceiverCloser {
    /// Closes the link and waits for the engine task to finish; a blocked
    /// `receive` call observes [`LinkError::Closed`].
    pub async fn close(&self) {
        let _ = self.ctrl_tx.send(ReceiverCtrl::Close).await;
        let mut status_rx = self.status_rx.clone();
        while matches!(*status_rx.borrow(), LinkStatus::Open) {
            if status_rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl ReceiverLink {
    /// Wraps an attached receiver transport, spawning its engine task. The
    /// task grants the full credit window up front and one replacement
    /// credit per consumed message, keeping the window saturated.
    #[must_use]
    pub fn spawn<T: ReceiverTransport + 'static>(transport: T, window: u32) -> Self {
        let window = window.max(1);
        let (buffer_tx, buffer_rx) = mpsc::channel(window as usize);
        let (ctrl_tx, ctrl_rx) = mpsc::channel(window as usize);
        let (status_tx, status_rx) = watch::channel(LinkStatus::Open);
        tokio::spawn(receiver_task(
            transport, window, buffer_tx, ctrl_rx, status_tx,
        ));
        Self {
            buffer_rx,
            ctrl_tx,
            status_rx,
        }
    }

    /// Pops the next delivery, waiting until one is buffered or the link
    /// reaches a terminal state. Deliveries are observed in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Closed`] once closed and drained (the normal
    /// shutdown path) and [`LinkError::Failed`] after an engine fault.
    pub async fn receive(&mut self) -> Result<InboundBody, LinkError> {
        match self.buffer_rx.recv().await {
            Some(body) => {
                let _ = self.ctrl_tx.send(ReceiverCtrl::Consumed).await;
                Ok(body)
            }
            None => match *self.status_rx.borrow() {
                LinkStatus::Failed => Err(LinkError::Failed("receiver link failed".to_string())),
                _ => Err(LinkError::Closed),
            },
        }
    }

    /// A handle for closing this link from another task.
    #[must_use]
    pub fn closer(&self) -> ReceiverCloser {
        ReceiverCloser {
            ctrl_tx: self.ctrl_tx.clone(),
            status_rx: self.status_rx.clone(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.status_rx.borrow()
    }
}

async fn receiver_task<T: ReceiverTransport>(
    mut transport: T,
    window: u32,
    buffer_tx: mpsc::Sender<InboundBody>,
    mut ctrl_rx: mpsc::Receiver<ReceiverCtrl>,
    status_tx: watch::Sender<LinkStatus>,
) {
    if let Err(e) = transport.replenish(window).await {
        error!(error = %e, "failed to grant initial credit window");
        status_tx.send_replace(LinkStatus::Failed);
        return;
    }
    debug!(window, "receiver link granted initial credit");

    loop {
        tokio::select! {
            delivery = transport.next() => match delivery {
                Ok(body) => {
                    if buffer_tx.send(body).await.is_err() {
                        // Application handle gone; treat as close.
                        break;
                    }
                }
                Err(LinkError::Closed) => {
                    info!("receiver link closed by remote");
                    status_tx.send_replace(LinkStatus::Closed);
                    break;
                }
                Err(e) => {
                    error!(error = %e, "receiver link failed");
                    status_tx.send_replace(LinkStatus::Failed);
                    break;
                }
            },
            ctrl = ctrl_rx.recv() => match ctrl {
                Some(ReceiverCtrl::Consumed) => {
                    if let Err(e) = transport.replenish(1).await {
                        warn!(error = %e, "credit refresh failed");
                    }
                }
                Some(ReceiverCtrl::Close) | None => break,
            },
        }
    }

    if matches!(*status_tx.borrow(), LinkStatus::Open) {
        if let Err(e) = transport.close().await {
            debug!(error = %e, "error while closing receiver link");
        }
        info!("receiver link closed");
        status_tx.send_replace(LinkStatus::Closed);
    }
}
