//! Live connection bookkeeping.
//!
//! Identifiers are small integers in `[0, max_connections)`, allocated
//! lowest-free-first so a freshly freed slot is reused before higher
//! ones. At most one live channel exists per identifier; admission
//! beyond capacity is rejected, never overwritten.

use log::info;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

pub type ChannelId = u32;

/// How a connection is being used. Every channel starts `Pending`; the
/// first `/data` request promotes it, and only data channels are valid
/// amalgamation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Pending,
    Data,
}

/// One live bidirectional connection. The registry owns the outbound
/// frame queue and the reader task handle; the writer task ends on its
/// own once the queue's sender is dropped.
#[derive(Debug)]
pub struct Channel {
    pub id: ChannelId,
    pub role: ChannelRole,
    outbound: UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

impl Channel {
    pub fn new(id: ChannelId, outbound: UnboundedSender<Vec<u8>>, reader: JoinHandle<()>) -> Self {
        Self {
            id,
            role: ChannelRole::Pending,
            outbound,
            reader,
        }
    }

    /// Queues a frame to the channel's writer task. Returns false when
    /// the writer is gone, which the caller must treat as a dead
    /// connection.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.outbound.send(frame).is_ok()
    }
}

pub struct ChannelRegistry {
    slots: Vec<Option<Channel>>,
}

impl ChannelRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            slots: (0..max_connections).map(|_| None).collect(),
        }
    }

    /// Lowest free identifier, or None when every slot is live.
    pub fn allocate(&self) -> Option<ChannelId> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|index| index as ChannelId)
    }

    /// Places a channel at its identifier's slot. Returns false if the
    /// slot is occupied; with allocation and insertion both driven by
    /// the single coordinating loop this does not happen.
    pub fn insert(&mut self, channel: Channel) -> bool {
        let slot = &mut self.slots[channel.id as usize];
        if slot.is_some() {
            return false;
        }
        *slot = Some(channel);
        true
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Promotes a channel to a data channel.
    pub fn mark_data(&mut self, id: ChannelId) -> bool {
        match self.slots.get_mut(id as usize).and_then(Option::as_mut) {
            Some(channel) => {
                channel.role = ChannelRole::Data;
                true
            }
            None => false,
        }
    }

    /// Releases an identifier slot, aborting the connection's reader
    /// task and dropping its outbound queue so the writer winds down.
    pub fn unregister(&mut self, id: ChannelId) -> bool {
        match self.slots.get_mut(id as usize).and_then(Option::take) {
            Some(channel) => {
                channel.reader.abort();
                info!("Channel {} unregistered", channel.id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
