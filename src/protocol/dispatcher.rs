// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Command queue and frame dispatching
//!
//! The [`Dispatcher`] is the I/O free heart of the protocol engine. It owns
//! the FIFO of pending commands and guarantees that at most one of them, the
//! head, is in flight at any time. Every received frame is first offered to
//! the in-flight command and only then classified as unsolicited traffic.
//!
//! The async driver in [`crate::protocol::engine`] feeds it frames and timer
//! expiries and writes out whatever [`Dispatcher::poll_transmit`] yields.
//!
//! ## In-flight state machine
//!
//! ```text
//! Idle --transmit--> Transmitted --finished--> Completed
//!                        |   ^
//!                timeout |   | retransmit
//!                        v   |
//!                      Retrying --budget exhausted--> Failed
//! ```

use chrono::{DateTime, Local, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::command::{Command, Value};
use super::error::ProtocolError;
use super::framer::printable;
use super::interval::Interval;
use super::status::{decode_freq, decode_status, magnitude, StatusRecord};
use super::unsolicited::{classify, Unsolicited};

/// Serial latency compensation applied to status capture timestamps
pub const DEFAULT_STATUS_LATENCY: Duration = Duration::from_millis(500);

/// Reply channel of an executed command
pub type Reply = oneshot::Sender<Result<Value, ProtocolError>>;

/// Status broadcast delivered to status callbacks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub record: StatusRecord,
    pub page: u16,
    pub timestamp: DateTime<Utc>,
}

/// Photometer reading delivered to photometer callbacks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotometerEvent {
    pub frequency: f64,
    pub magnitude: f64,
    pub timestamp: DateTime<Utc>,
}

pub type StatusCallback = Box<dyn FnMut(&StatusEvent) + Send>;
pub type PhotometerCallback = Box<dyn FnMut(&PhotometerEvent) + Send>;

/// Handle returned on callback registration, used for removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// A queued command with its retry bookkeeping
struct Pending {
    command: Command,
    retries: u32,
    attempt: u32,
    interval: Interval,
    reply: Option<Reply>,
}

impl Pending {
    fn resolve(&mut self, result: Result<Value, ProtocolError>) {
        if let Some(reply) = self.reply.take() {
            if reply.send(result).is_err() {
                debug!("Caller of '{}' went away", self.command.name());
            }
        }
    }
}

/// Single in-flight command queue with unsolicited frame fan-out
pub struct Dispatcher {
    queue: VecDeque<Pending>,
    /// Head of the queue has been transmitted and awaits its reply
    busy: bool,
    paused: bool,
    deadline: Option<Instant>,
    outbound: VecDeque<String>,
    status_callbacks: Vec<(CallbackId, StatusCallback)>,
    photometer_callbacks: Vec<(CallbackId, PhotometerCallback)>,
    next_id: u64,
    status_latency: chrono::Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_LATENCY)
    }
}

impl Dispatcher {
    pub fn new(status_latency: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            busy: false,
            paused: false,
            deadline: None,
            outbound: VecDeque::new(),
            status_callbacks: Vec::new(),
            photometer_callbacks: Vec::new(),
            next_id: 0,
            status_latency: chrono::Duration::from_std(status_latency)
                .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    /// Number of queued commands, the in-flight one included
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Expiry of the in-flight command's timeout alarm
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Next request line to write to the transport
    pub fn poll_transmit(&mut self) -> Option<String> {
        self.outbound.pop_front()
    }

    /// Queue a command; it is transmitted at once if the line is free
    pub fn enqueue(&mut self, command: Command, retries: u32, reply: Option<Reply>, now: Instant) {
        debug!(
            "Queueing '{}' ({} retries, {} already pending)",
            command.name(),
            retries,
            self.queue.len()
        );
        let interval = command.timeout().interval();
        self.queue.push_back(Pending {
            command,
            retries,
            attempt: 0,
            interval,
            reply,
        });
        self.transmit_if_idle(now);
    }

    /// Hold back new transmissions
    pub fn pause(&mut self) {
        if !self.paused {
            debug!("Pausing command transmission");
        }
        self.paused = true;
    }

    /// Allow transmissions again, sending the head if it is waiting
    pub fn resume(&mut self, now: Instant) {
        if self.paused {
            debug!("Resuming command transmission");
        }
        self.paused = false;
        self.transmit_if_idle(now);
    }

    /// Dispatch one received frame
    pub fn handle_frame(&mut self, frame: &str, now: Instant) {
        debug!("RX {}", printable(frame));
        if self.busy {
            if let Some(head) = self.queue.front_mut() {
                let progress = head.command.decode(frame);
                if progress.finished {
                    self.complete(now);
                    return;
                }
                if progress.handled {
                    return;
                }
            }
        }
        self.handle_unsolicited(frame, now);
    }

    /// React to the expiry of the in-flight command's alarm
    pub fn handle_timeout(&mut self, now: Instant) {
        self.deadline = None;
        if !self.busy {
            return;
        }
        let paused = self.paused;
        let Some(head) = self.queue.front_mut() else {
            self.busy = false;
            return;
        };

        if head.attempt >= head.retries {
            warn!(
                "'{}' timed out after {} attempt(s)",
                head.command.name(),
                head.attempt + 1
            );
            let error = ProtocolError::Timeout {
                command: head.command.name().to_string(),
                attempts: head.attempt + 1,
            };
            head.resolve(Err(error));
            self.queue.pop_front();
            self.busy = false;
            self.transmit_if_idle(now);
            return;
        }

        head.attempt += 1;
        head.command.reset();
        info!(
            "'{}' timed out, retry {}/{}",
            head.command.name(),
            head.attempt,
            head.retries
        );
        if paused {
            // Retransmitted on resume
            self.busy = false;
        } else {
            self.transmit_head(now);
        }
    }

    /// Fail every queued command, used when the transport goes away
    pub fn abandon(&mut self) {
        for mut pending in self.queue.drain(..) {
            pending.resolve(Err(ProtocolError::Disconnected));
        }
        self.busy = false;
        self.deadline = None;
        self.outbound.clear();
    }

    pub fn add_status_callback(&mut self, callback: StatusCallback) -> CallbackId {
        let id = self.allocate_id();
        self.insert_status_callback(id, callback);
        id
    }

    /// Register a status callback under an externally allocated id
    pub fn insert_status_callback(&mut self, id: CallbackId, callback: StatusCallback) {
        self.status_callbacks.push((id, callback));
    }

    pub fn remove_status_callback(&mut self, id: CallbackId) -> bool {
        let before = self.status_callbacks.len();
        self.status_callbacks.retain(|(cb_id, _)| *cb_id != id);
        before != self.status_callbacks.len()
    }

    pub fn add_photometer_callback(&mut self, callback: PhotometerCallback) -> CallbackId {
        let id = self.allocate_id();
        self.insert_photometer_callback(id, callback);
        id
    }

    /// Register a photometer callback under an externally allocated id
    pub fn insert_photometer_callback(&mut self, id: CallbackId, callback: PhotometerCallback) {
        self.photometer_callbacks.push((id, callback));
    }

    pub fn remove_photometer_callback(&mut self, id: CallbackId) -> bool {
        let before = self.photometer_callbacks.len();
        self.photometer_callbacks.retain(|(cb_id, _)| *cb_id != id);
        before != self.photometer_callbacks.len()
    }

    fn allocate_id(&mut self) -> CallbackId {
        self.next_id += 1;
        CallbackId(self.next_id)
    }

    fn transmit_if_idle(&mut self, now: Instant) {
        if !self.busy && !self.paused && !self.queue.is_empty() {
            self.transmit_head(now);
        }
    }

    fn transmit_head(&mut self, now: Instant) {
        let Some(head) = self.queue.front_mut() else {
            return;
        };
        let timeout = head.interval.next_timeout();
        debug!(
            "Transmitting '{}' as {} (timeout {:?})",
            head.command.name(),
            head.command.request(),
            timeout
        );
        self.outbound.push_back(head.command.request().to_string());
        self.deadline = Some(now + timeout);
        self.busy = true;
    }

    fn complete(&mut self, now: Instant) {
        self.deadline = None;
        self.busy = false;
        if let Some(mut head) = self.queue.pop_front() {
            let result = head.command.result(Local::now().naive_local());
            match &result {
                Ok(_) => debug!("'{}' completed", head.command.name()),
                Err(e) => warn!("'{}' completed with a bad value: {}", head.command.name(), e),
            }
            head.resolve(result);
        }
        self.transmit_if_idle(now);
    }

    fn handle_unsolicited(&mut self, frame: &str, now: Instant) {
        match classify(frame) {
            Some(Unsolicited::Status) => match decode_status(frame) {
                Ok((record, page)) => {
                    let event = StatusEvent {
                        record,
                        page,
                        timestamp: Utc::now() + self.status_latency,
                    };
                    for (_, callback) in self.status_callbacks.iter_mut() {
                        callback(&event);
                    }
                }
                Err(e) => warn!("Dropping status frame {}: {}", printable(frame), e),
            },
            Some(Unsolicited::PhotometerBegin) => self.pause(),
            Some(Unsolicited::PhotometerEnd { encoded }) => {
                match decode_freq(&encoded) {
                    Ok(frequency) => {
                        let event = PhotometerEvent {
                            frequency,
                            magnitude: magnitude(frequency),
                            timestamp: Utc::now(),
                        };
                        for (_, callback) in self.photometer_callbacks.iter_mut() {
                            callback(&event);
                        }
                    }
                    Err(e) => warn!("Dropping photometer frame {}: {}", printable(frame), e),
                }
                self.resume(now);
            }
            Some(kind @ (Unsolicited::Thermopile | Unsolicited::Timer | Unsolicited::Datalogger)) => {
                debug!("Ignoring {:?} frame", kind);
            }
            None => warn!("Unknown frame {}", printable(frame)),
        }
    }
}
