// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Async protocol engine
//!
//! [`ProtocolEngine::spawn`] starts a tokio task that owns the transport and
//! a [`Dispatcher`]. Callers talk to it through the cloneable [`EmaProtocol`]
//! handle; every mutation of the queue and the callback registries happens on
//! the engine task, so no locking is involved.
//!
//! ```no_run
//! use rust_ema::protocol::{commands, EmaProtocol, EngineSettings, ProtocolEngine};
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let stream = TcpStream::connect("192.168.1.50:2000").await?;
//! let (reader, writer) = stream.into_split();
//! let (ema, task) = ProtocolEngine::spawn(reader, writer, EngineSettings::default());
//! let threshold = ema.execute(commands::get(commands::Setting::PhotometerThreshold)?).await?;
//! println!("photometer threshold: {:?}", threshold);
//! ema.shutdown();
//! task.await??;
//! # Ok(())
//! # }
//! ```

use futures::StreamExt;
use log::{debug, error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::codec::FramedRead;

use super::command::{Command, Value};
use super::dispatcher::{
    CallbackId, Dispatcher, PhotometerEvent, StatusEvent, DEFAULT_STATUS_LATENCY,
};
use super::error::ProtocolError;
use super::framer::{printable, LineFramer};
use super::interval::TimeoutPolicy;

/// Tunables of a running engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Overrides the retry budget of every command when set
    pub retries: Option<u32>,
    /// Replaces the policy of commands using the default timeout
    pub timeout: Option<TimeoutPolicy>,
    /// Added to the capture time of status broadcasts
    pub status_latency: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retries: None,
            timeout: None,
            status_latency: DEFAULT_STATUS_LATENCY,
        }
    }
}

enum Request {
    Execute {
        command: Command,
        retries: Option<u32>,
        reply: oneshot::Sender<Result<Value, ProtocolError>>,
    },
    AddStatusCallback(CallbackId, Box<dyn FnMut(&StatusEvent) + Send>),
    RemoveStatusCallback(CallbackId),
    AddPhotometerCallback(CallbackId, Box<dyn FnMut(&PhotometerEvent) + Send>),
    RemovePhotometerCallback(CallbackId),
    Pause,
    Resume,
    Shutdown,
}

/// Cloneable handle to a running protocol engine
#[derive(Clone)]
pub struct EmaProtocol {
    requests: mpsc::UnboundedSender<Request>,
    next_id: Arc<AtomicU64>,
}

impl EmaProtocol {
    /// Queue a command with its own retry budget and wait for its value
    pub async fn execute(&self, command: Command) -> Result<Value, ProtocolError> {
        self.submit(command, None).await
    }

    /// Queue a command with an explicit retry budget
    pub async fn execute_with_retries(
        &self,
        command: Command,
        retries: u32,
    ) -> Result<Value, ProtocolError> {
        self.submit(command, Some(retries)).await
    }

    /// Queue a command without waiting for it
    ///
    /// The command is in the engine queue when this returns; the receiver
    /// yields its outcome.
    pub fn enqueue(
        &self,
        command: Command,
        retries: Option<u32>,
    ) -> Result<oneshot::Receiver<Result<Value, ProtocolError>>, ProtocolError> {
        let (reply, response) = oneshot::channel();
        self.send(Request::Execute {
            command,
            retries,
            reply,
        })?;
        Ok(response)
    }

    async fn submit(&self, command: Command, retries: Option<u32>) -> Result<Value, ProtocolError> {
        let response = self.enqueue(command, retries)?;
        response.await.map_err(|_| ProtocolError::Disconnected)?
    }

    /// Register a status callback, invoked on the engine task
    pub fn add_status_callback<F>(&self, callback: F) -> Result<CallbackId, ProtocolError>
    where
        F: FnMut(&StatusEvent) + Send + 'static,
    {
        let id = self.allocate_id();
        self.send(Request::AddStatusCallback(id, Box::new(callback)))?;
        Ok(id)
    }

    pub fn remove_status_callback(&self, id: CallbackId) -> Result<(), ProtocolError> {
        self.send(Request::RemoveStatusCallback(id))
    }

    /// Register a photometer callback, invoked on the engine task
    pub fn add_photometer_callback<F>(&self, callback: F) -> Result<CallbackId, ProtocolError>
    where
        F: FnMut(&PhotometerEvent) + Send + 'static,
    {
        let id = self.allocate_id();
        self.send(Request::AddPhotometerCallback(id, Box::new(callback)))?;
        Ok(id)
    }

    pub fn remove_photometer_callback(&self, id: CallbackId) -> Result<(), ProtocolError> {
        self.send(Request::RemovePhotometerCallback(id))
    }

    /// Hold back command transmission
    pub fn pause(&self) -> Result<(), ProtocolError> {
        self.send(Request::Pause)
    }

    pub fn resume(&self) -> Result<(), ProtocolError> {
        self.send(Request::Resume)
    }

    /// Stop the engine; pending commands fail with `Disconnected`
    pub fn shutdown(&self) {
        // Already stopped if this fails
        let _ = self.send(Request::Shutdown);
    }

    /// Whether the engine task is still accepting requests
    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }

    fn allocate_id(&self) -> CallbackId {
        CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn send(&self, request: Request) -> Result<(), ProtocolError> {
        self.requests
            .send(request)
            .map_err(|_| ProtocolError::Disconnected)
    }
}

/// Engine task state
pub struct ProtocolEngine<R, W> {
    frames: FramedRead<R, LineFramer>,
    writer: W,
    requests: mpsc::UnboundedReceiver<Request>,
    dispatcher: Dispatcher,
    settings: EngineSettings,
}

impl<R, W> ProtocolEngine<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Start an engine over a split transport
    pub fn spawn(
        reader: R,
        writer: W,
        settings: EngineSettings,
    ) -> (EmaProtocol, JoinHandle<Result<(), ProtocolError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = ProtocolEngine {
            frames: FramedRead::new(reader, LineFramer::new()),
            writer,
            requests: rx,
            dispatcher: Dispatcher::new(settings.status_latency),
            settings,
        };
        let handle = EmaProtocol {
            requests: tx,
            next_id: Arc::new(AtomicU64::new(0)),
        };
        (handle, tokio::spawn(engine.run()))
    }

    async fn run(mut self) -> Result<(), ProtocolError> {
        info!("EMA protocol engine started");
        let outcome = self.event_loop().await;
        self.dispatcher.abandon();
        match &outcome {
            Ok(()) => info!("EMA protocol engine stopped"),
            Err(e) => error!("EMA protocol engine failed: {}", e),
        }
        outcome
    }

    async fn event_loop(&mut self) -> Result<(), ProtocolError> {
        loop {
            self.flush_outbound().await?;
            let deadline = self.dispatcher.deadline();

            // Control requests first so registrations precede later traffic
            tokio::select! {
                biased;
                request = self.requests.recv() => match request {
                    Some(Request::Shutdown) | None => {
                        debug!("Shutdown requested");
                        return Ok(());
                    }
                    Some(request) => self.apply(request),
                },
                frame = self.frames.next() => match frame {
                    Some(Ok(frame)) => self.dispatcher.handle_frame(&frame, Instant::now()),
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        info!("Station closed the connection");
                        return Ok(());
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.dispatcher.handle_timeout(Instant::now());
                }
            }
        }
    }

    fn apply(&mut self, request: Request) {
        let now = Instant::now();
        match request {
            Request::Execute {
                command,
                retries,
                reply,
            } => {
                let retries = retries
                    .or(self.settings.retries)
                    .unwrap_or_else(|| command.default_retries());
                let command = match self.settings.timeout {
                    Some(policy) if command.timeout() == TimeoutPolicy::default() => {
                        command.with_timeout(policy)
                    }
                    _ => command,
                };
                self.dispatcher.enqueue(command, retries, Some(reply), now);
            }
            Request::AddStatusCallback(id, callback) => {
                self.dispatcher.insert_status_callback(id, callback)
            }
            Request::RemoveStatusCallback(id) => {
                self.dispatcher.remove_status_callback(id);
            }
            Request::AddPhotometerCallback(id, callback) => {
                self.dispatcher.insert_photometer_callback(id, callback)
            }
            Request::RemovePhotometerCallback(id) => {
                self.dispatcher.remove_photometer_callback(id);
            }
            Request::Pause => self.dispatcher.pause(),
            Request::Resume => self.dispatcher.resume(now),
            Request::Shutdown => {}
        }
    }

    async fn flush_outbound(&mut self) -> Result<(), ProtocolError> {
        let mut written = false;
        while let Some(line) = self.dispatcher.poll_transmit() {
            debug!("TX {}", printable(&line));
            self.writer.write_all(line.as_bytes()).await?;
            written = true;
        }
        if written {
            self.writer.flush().await?;
        }
        Ok(())
    }
}
