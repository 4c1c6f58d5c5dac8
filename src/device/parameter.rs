// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Readable and writable station parameters
//!
//! A [`Parameter`] pairs the get and set commands of one station setting with
//! an engine handle. Concurrent callers share a single exchange: asking for a
//! value while a read is outstanding returns that read, and writing a value
//! that is already being written returns the pending write.

use futures::future::{self, BoxFuture, FutureExt, Shared};
use log::debug;
use std::sync::{Arc, Mutex};

use crate::protocol::{Command, EmaProtocol, ProtocolError, Value};

/// Result of a shared exchange
pub type SharedResult = Result<Value, Arc<ProtocolError>>;

/// In-flight exchange that every interested caller can await
pub type SharedReply = Shared<BoxFuture<'static, SharedResult>>;

type ReadFactory = Box<dyn Fn() -> Result<Command, ProtocolError> + Send + Sync>;
type WriteFactory<T> = Box<dyn Fn(T) -> Result<Command, ProtocolError> + Send + Sync>;

/// Observable state of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterState {
    Idle,
    Reading,
    Writing,
}

enum State<T> {
    Idle,
    Reading(SharedReply),
    Writing(T, SharedReply),
}

/// Station setting with in-flight de-duplication
pub struct Parameter<T> {
    name: String,
    protocol: EmaProtocol,
    read: ReadFactory,
    write: WriteFactory<T>,
    state: Mutex<State<T>>,
}

impl<T> Parameter<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new<R, W>(name: impl Into<String>, protocol: EmaProtocol, read: R, write: W) -> Self
    where
        R: Fn() -> Result<Command, ProtocolError> + Send + Sync + 'static,
        W: Fn(T) -> Result<Command, ProtocolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            protocol,
            read: Box::new(read),
            write: Box::new(write),
            state: Mutex::new(State::Idle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ParameterState {
        let mut state = self.lock();
        Self::settle(&mut state);
        match *state {
            State::Idle => ParameterState::Idle,
            State::Reading(_) => ParameterState::Reading,
            State::Writing(..) => ParameterState::Writing,
        }
    }

    /// Read the parameter from the station
    pub async fn get(&self) -> SharedResult {
        self.read_reply().await
    }

    /// Write the parameter, resolving to the value echoed by the station
    pub async fn set(&self, value: T) -> SharedResult {
        self.write_reply(value).await
    }

    /// Exchange answering a read, started only if none is outstanding
    ///
    /// A pending write answers reads too since the station echoes the value
    /// it stored.
    pub fn read_reply(&self) -> SharedReply {
        let mut state = self.lock();
        Self::settle(&mut state);
        match &*state {
            State::Reading(reply) | State::Writing(_, reply) => {
                debug!("Joining in-flight exchange of '{}'", self.name);
                reply.clone()
            }
            State::Idle => {
                let command = match (self.read)() {
                    Ok(command) => command,
                    Err(e) => return Self::failed(e),
                };
                let reply = self.start(command);
                *state = State::Reading(reply.clone());
                reply
            }
        }
    }

    /// Exchange answering a write of `value`
    ///
    /// A value the set command rejects fails at once and nothing is sent.
    pub fn write_reply(&self, value: T) -> SharedReply {
        let mut state = self.lock();
        Self::settle(&mut state);
        if let State::Writing(pending, reply) = &*state {
            if *pending == value {
                debug!("Joining in-flight write of '{}'", self.name);
                return reply.clone();
            }
        }
        let command = match (self.write)(value.clone()) {
            Ok(command) => command,
            Err(e) => {
                debug!("Rejected write of '{}': {}", self.name, e);
                return Self::failed(e);
            }
        };
        let reply = self.start(command);
        *state = State::Writing(value, reply.clone());
        reply
    }

    fn failed(error: ProtocolError) -> SharedReply {
        future::ready(Err(Arc::new(error))).boxed().shared()
    }

    fn start(&self, command: Command) -> SharedReply {
        let queued = self.protocol.enqueue(command, None);
        async move {
            let response = queued.map_err(Arc::new)?;
            match response.await {
                Ok(result) => result.map_err(Arc::new),
                Err(_) => Err(Arc::new(ProtocolError::Disconnected)),
            }
        }
        .boxed()
        .shared()
    }

    /// Fall back to idle once the tracked exchange has resolved
    fn settle(state: &mut State<T>) {
        let done = match state {
            State::Idle => false,
            State::Reading(reply) | State::Writing(_, reply) => reply.peek().is_some(),
        };
        if done {
            *state = State::Idle;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
