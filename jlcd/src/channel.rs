//! Command channel between the daemon and the polling agent.
//!
//! One channel exists per run. It admits exactly one agent: the first
//! allow-listed poller binds it, and from then on only that session may talk
//! to the run. Commands are delivered at most once; every successful poll
//! drains the whole queue and nothing is ever redelivered.

use jlc_common::{AgentCommand, AgentIdentity};
use thiserror::Error;
use tracing::{debug, info};

/// Reasons an agent request is turned away.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The agent is not allow-listed, or another session is bound.
    #[error("agent {identity} was refused admission")]
    AdmissionRejected { identity: AgentIdentity },

    /// No run is accepting agent requests.
    #[error("no run is accepting agent requests")]
    Closed,
}

/// Binding state of the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Unconnected,
    Connected(AgentIdentity),
}

#[derive(Debug)]
pub struct CommandChannel {
    queue: Vec<AgentCommand>,
    connection: Connection,
    allowed_place_ids: Vec<String>,
    open: bool,
}

impl CommandChannel {
    /// Open a channel; an empty allow-list admits any place.
    pub fn open(allowed_place_ids: Vec<String>) -> Self {
        Self {
            queue: Vec::new(),
            connection: Connection::Unconnected,
            allowed_place_ids,
            open: true,
        }
    }

    /// Decide whether `candidate` may use this channel, binding it if it is the
    /// first admitted agent.
    ///
    /// A bound channel only accepts the bound session; there is no pre-emption
    /// and no disconnect, so a restarted place stays locked out until a new
    /// channel is opened.
    pub fn admit(&mut self, candidate: &AgentIdentity) -> bool {
        match &self.connection {
            Connection::Connected(bound) => bound.place_guid == candidate.place_guid,
            Connection::Unconnected => {
                let allowed = self.allowed_place_ids.is_empty()
                    || self.allowed_place_ids.contains(&candidate.place_id);
                if allowed {
                    info!(
                        place_id = %candidate.place_id,
                        place_guid = %candidate.place_guid,
                        "agent connected"
                    );
                    self.connection = Connection::Connected(candidate.clone());
                }
                allowed
            }
        }
    }

    /// Admit `candidate` on an open channel, or say why not.
    pub fn check(&mut self, candidate: &AgentIdentity) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        if !self.admit(candidate) {
            debug!(identity = %candidate, "agent refused admission");
            return Err(ChannelError::AdmissionRejected {
                identity: candidate.clone(),
            });
        }
        Ok(())
    }

    pub fn enqueue(&mut self, command: AgentCommand) {
        debug!(command = command.name(), "command queued");
        self.queue.push(command);
    }

    /// Take every pending command.
    pub fn poll(&mut self) -> Vec<AgentCommand> {
        std::mem::take(&mut self.queue)
    }

    /// Stop accepting agent requests and drop anything undelivered.
    pub fn close(&mut self) {
        self.open = false;
        self.queue.clear();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
