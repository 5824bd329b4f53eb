use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::RpcError;

/// A wire message with a stable tag, explicit and author-supplied rather
/// than derived from `std::any::type_name` (which is not stable across
/// compilations). Every registered message type implements this.
pub trait Tagged {
    const TAG: &'static str;
}

impl Tagged for crate::messages::Term {
    const TAG: &'static str = crate::messages::Term::TAG;
}
impl Tagged for crate::messages::KeyedEvent {
    const TAG: &'static str = crate::messages::KeyedEvent::TAG;
}
impl Tagged for crate::messages::Progress {
    const TAG: &'static str = crate::messages::Progress::TAG;
}

/// `Marshal(v) -> (tag, bytes)` / `Unmarshal(bytes, tag) -> v`, implemented
/// once over `serde_json`. Bytes format is implementation-defined but must
/// round-trip.
pub trait Codec: Send + Sync {
    fn marshal<T: Serialize + Tagged>(&self, v: &T) -> Result<(String, Vec<u8>), RpcError>;
    fn unmarshal<T: DeserializeOwned + Tagged>(&self, tag: &str, bytes: &[u8]) -> Result<T, RpcError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal<T: Serialize + Tagged>(&self, v: &T) -> Result<(String, Vec<u8>), RpcError> {
        Ok((T::TAG.to_string(), serde_json::to_vec(v)?))
    }

    fn unmarshal<T: DeserializeOwned + Tagged>(&self, tag: &str, bytes: &[u8]) -> Result<T, RpcError> {
        if tag != T::TAG {
            return Err(RpcError::TagMismatch {
                expected: T::TAG.to_string(),
                got: tag.to_string(),
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Term;

    #[test]
    fn round_trips_through_tag_and_bytes() {
        let codec = JsonCodec;
        let term = Term {
            peers: vec!["p1".into(), "p2".into()],
        };
        let (tag, bytes) = codec.marshal(&term).unwrap();
        assert_eq!(tag, Term::TAG);
        let back: Term = codec.unmarshal(&tag, &bytes).unwrap();
        assert_eq!(back.peers, term.peers);
    }

    #[test]
    fn rejects_mismatched_tag() {
        let codec = JsonCodec;
        let bytes = serde_json::to_vec(&Term { peers: vec![] }).unwrap();
        let err = codec.unmarshal::<crate::messages::KeyedEvent>(Term::TAG, &bytes);
        assert!(matches!(err, Err(RpcError::TagMismatch { .. })));
    }
}
