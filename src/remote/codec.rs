use crate::actor::message::AnyMessage;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock};

/// Serialization façade for messages crossing process boundaries.
///
/// Types are registered under a stable string tag; `encode` maps a payload
/// to `(bytes, tag)` and `decode` maps them back. Anything not registered
/// is not transmittable.
pub struct MessageCodec {
    encoders: RwLock<HashMap<TypeId, EncoderEntry>>,
    decoders: RwLock<HashMap<String, DecoderFn>>,
}

struct EncoderEntry {
    type_tag: String,
    encode: EncoderFn,
}

type EncoderFn = Box<dyn Fn(&AnyMessage) -> Result<Vec<u8>, CodecErr> + Send + Sync>;
type DecoderFn = Box<dyn Fn(&[u8]) -> Result<AnyMessage, CodecErr> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecErr {
    /// The payload's type was never registered.
    NotRegistered(&'static str),
    /// No decoder is registered for the received tag.
    UnknownTypeTag(String),
    SerializationFailed(String),
    DeserializationFailed(String),
}

impl Display for CodecErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecErr::NotRegistered(type_name) => {
                write!(f, "message type {} is not registered", type_name)
            }
            CodecErr::UnknownTypeTag(tag) => write!(f, "unknown type tag {}", tag),
            CodecErr::SerializationFailed(e) => write!(f, "serialization failed: {}", e),
            CodecErr::DeserializationFailed(e) => write!(f, "deserialization failed: {}", e),
        }
    }
}

impl std::error::Error for CodecErr {}

impl MessageCodec {
    pub fn new() -> MessageCodec {
        MessageCodec {
            encoders: RwLock::new(HashMap::new()),
            decoders: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `M` under `type_tag` for both directions.
    pub fn register<M>(&self, type_tag: &str)
    where
        M: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let encode: EncoderFn = Box::new(|message: &AnyMessage| {
            let message = message
                .downcast_ref::<M>()
                .ok_or(CodecErr::NotRegistered(std::any::type_name::<M>()))?;
            serde_json::to_vec(message).map_err(|e| CodecErr::SerializationFailed(e.to_string()))
        });

        self.insert::<M>(type_tag, encode);
    }

    /// Registers `M` wrapped in [`CachedEncoding`], so repeated sends of the
    /// same message instance serialize once.
    pub fn register_cached<M>(&self, type_tag: &str)
    where
        M: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let encode: EncoderFn = Box::new(|message: &AnyMessage| {
            let cached = message
                .downcast_ref::<CachedEncoding<M>>()
                .ok_or(CodecErr::NotRegistered(std::any::type_name::<M>()))?;
            cached.encoded().map(<[u8]>::to_vec)
        });

        let decode: DecoderFn = Box::new(|bytes: &[u8]| {
            serde_json::from_slice::<M>(bytes)
                .map(|message| AnyMessage::new(CachedEncoding::new(message)))
                .map_err(|e| CodecErr::DeserializationFailed(e.to_string()))
        });

        self.encoders.write().insert(
            TypeId::of::<CachedEncoding<M>>(),
            EncoderEntry {
                type_tag: type_tag.to_string(),
                encode,
            },
        );
        self.decoders.write().insert(type_tag.to_string(), decode);
    }

    fn insert<M>(&self, type_tag: &str, encode: EncoderFn)
    where
        M: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let decode: DecoderFn = Box::new(|bytes: &[u8]| {
            serde_json::from_slice::<M>(bytes)
                .map(AnyMessage::new)
                .map_err(|e| CodecErr::DeserializationFailed(e.to_string()))
        });

        self.encoders.write().insert(
            TypeId::of::<M>(),
            EncoderEntry {
                type_tag: type_tag.to_string(),
                encode,
            },
        );
        self.decoders.write().insert(type_tag.to_string(), decode);
    }

    pub fn encode(&self, message: &AnyMessage) -> Result<(Vec<u8>, String), CodecErr> {
        let encoders = self.encoders.read();
        let entry = encoders
            .get(&message.message_type_id())
            .ok_or(CodecErr::NotRegistered(message.type_name()))?;

        (entry.encode)(message).map(|bytes| (bytes, entry.type_tag.clone()))
    }

    pub fn decode(&self, type_tag: &str, bytes: &[u8]) -> Result<AnyMessage, CodecErr> {
        let decoders = self.decoders.read();
        let decode = decoders
            .get(type_tag)
            .ok_or_else(|| CodecErr::UnknownTypeTag(type_tag.to_string()))?;

        decode(bytes)
    }

    pub fn is_registered_tag(&self, type_tag: &str) -> bool {
        self.decoders.read().contains_key(type_tag)
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Opt-in wrapper caching a message's encoded form, for payloads fanned out
/// to many peers.
pub struct CachedEncoding<M> {
    message: M,
    bytes: OnceLock<Result<Arc<[u8]>, CodecErr>>,
}

impl<M: Serialize> CachedEncoding<M> {
    pub fn new(message: M) -> CachedEncoding<M> {
        CachedEncoding {
            message,
            bytes: OnceLock::new(),
        }
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    fn encoded(&self) -> Result<&[u8], CodecErr> {
        match self.bytes.get_or_init(|| {
            serde_json::to_vec(&self.message)
                .map(Arc::from)
                .map_err(|e| CodecErr::SerializationFailed(e.to_string()))
        }) {
            Ok(bytes) => Ok(bytes.as_ref()),
            Err(e) => Err(e.clone()),
        }
    }
}
