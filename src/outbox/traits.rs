//! Send surfaces handlers program against.

use crate::error::SendError;
use crate::message::{Message, OutboundMessage};

/// Publishes to the outward topic, or back to this bus's own input queue.
pub trait Bus: Send + Sync {
    fn publish_message(&self, message: OutboundMessage) -> Result<(), SendError>;

    fn publish_local_message(&self, message: OutboundMessage) -> Result<(), SendError>;
}

/// Typed helpers over [`Bus`].
pub trait BusExt: Bus {
    fn publish<M: Message>(&self, message: &M) -> Result<(), SendError> {
        self.publish_message(OutboundMessage::encode(message)?)
    }

    /// Build a default `M`, let `init` fill it in, then publish it.
    fn publish_with<M: Message + Default>(&self, init: impl FnOnce(&mut M)) -> Result<(), SendError> {
        let mut message = M::default();
        init(&mut message);
        self.publish(&message)
    }

    fn publish_local<M: Message>(&self, message: &M) -> Result<(), SendError> {
        self.publish_local_message(OutboundMessage::encode(message)?)
    }

    fn publish_local_with<M: Message + Default>(
        &self,
        init: impl FnOnce(&mut M),
    ) -> Result<(), SendError> {
        let mut message = M::default();
        init(&mut message);
        self.publish_local(&message)
    }
}

impl<B: Bus + ?Sized> BusExt for B {}

/// Sends directly to this bus's own input queue.
pub trait Queue: Send + Sync {
    fn send_message(&self, message: OutboundMessage) -> Result<(), SendError>;
}

/// Typed helpers over [`Queue`].
pub trait QueueExt: Queue {
    fn send<M: Message>(&self, message: &M) -> Result<(), SendError> {
        self.send_message(OutboundMessage::encode(message)?)
    }

    fn send_with<M: Message + Default>(&self, init: impl FnOnce(&mut M)) -> Result<(), SendError> {
        let mut message = M::default();
        init(&mut message);
        self.send(&message)
    }
}

impl<Q: Queue + ?Sized> QueueExt for Q {}
