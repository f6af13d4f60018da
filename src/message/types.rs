//! Message types and the name → type table used to resolve them.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A deserialized message payload, shared between handlers.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Marker trait for anything that can travel on the bus.
///
/// Blanket-implemented for every `Serialize + DeserializeOwned` type. The
/// wire type name is the fully-qualified Rust path (`std::any::type_name`).
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Fully-qualified type name written to the `messageType` attribute.
pub fn type_name_of<M: Message>() -> &'static str {
    std::any::type_name::<M>()
}

/// A resolved message type: its wire name, runtime id and decoder.
#[derive(Clone, Copy)]
pub struct MessageTypeRef {
    name: &'static str,
    id: TypeId,
    decode: fn(&str) -> Result<Payload, serde_json::Error>,
}

fn decode_as<M: Message>(body: &str) -> Result<Payload, serde_json::Error> {
    let message: M = serde_json::from_str(body)?;
    Ok(Arc::new(message))
}

impl MessageTypeRef {
    pub fn of<M: Message>() -> Self {
        Self {
            name: type_name_of::<M>(),
            id: TypeId::of::<M>(),
            decode: decode_as::<M>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Deserialize a JSON body into this type.
    pub fn decode(&self, body: &str) -> Result<Payload, serde_json::Error> {
        (self.decode)(body)
    }

    pub fn is<M: 'static>(&self) -> bool {
        self.id == TypeId::of::<M>()
    }
}

impl PartialEq for MessageTypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageTypeRef {}

impl fmt::Debug for MessageTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageTypeRef").field(&self.name).finish()
    }
}

/// Table of known message types, keyed by wire name.
///
/// Populated once at startup (normally by `HandlerRegistry`) and read-only
/// afterwards.
#[derive(Clone, Default)]
pub struct MessageTypes {
    by_name: HashMap<&'static str, MessageTypeRef>,
}

impl MessageTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M`. Registering the same type twice is a no-op.
    pub fn register<M: Message>(&mut self) -> MessageTypeRef {
        let type_ref = MessageTypeRef::of::<M>();
        self.by_name.entry(type_ref.name).or_insert(type_ref);
        type_ref
    }

    /// Resolve a wire name: exact match first, then ASCII case-insensitive.
    pub fn resolve(&self, name: &str) -> Option<MessageTypeRef> {
        if let Some(found) = self.by_name.get(name) {
            return Some(*found);
        }
        self.by_name
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
