//! Protocol messages exchanged between clients and the server.

use crate::acl::{AclId, AclSet};
use crate::error::{ProtocolError, ProtocolResult};
use crate::key::Key;
use crate::value::ValueRecord;
use crate::vts::Vts;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a request, shared by the response that answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Publish or delete a value.
    Publish,
    /// Subscribe to a key.
    Subscribe,
    /// Unsubscribe from a key.
    Unsubscribe,
    /// Fetch the ACL set.
    GetAcls,
    /// Ask for revisions after a clock.
    Advance,
    /// Fetch specific revisions.
    Fetch,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Publish => "publish",
            RequestKind::Subscribe => "subscribe",
            RequestKind::Unsubscribe => "unsubscribe",
            RequestKind::GetAcls => "get-acls",
            RequestKind::Advance => "advance",
            RequestKind::Fetch => "fetch",
        };
        f.write_str(name)
    }
}

/// A request sent by a client.
///
/// A request is built once per operation attempt and resent verbatim on retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Publish a value (or delete) under a key.
    Publish {
        /// Target key. May only be a pattern when deleting.
        key: Key,
        /// Payload, absent for deletions.
        data: Option<Vec<u8>>,
        /// Whether this deletes the key.
        delete: bool,
        /// Client-assigned creation time, milliseconds since the Unix epoch.
        created_at_ms: u64,
        /// ACL to publish under.
        acl_id: Option<AclId>,
    },
    /// Subscribe to a key or pattern.
    Subscribe {
        /// Subscribed key.
        key: Key,
    },
    /// Unsubscribe from a key or pattern.
    Unsubscribe {
        /// Unsubscribed key.
        key: Key,
    },
    /// Fetch the ACL set.
    GetAcls,
    /// Ask which revisions exist after a clock.
    Advance {
        /// Key whose revisions are requested.
        key: Key,
        /// Last clock confirmed by the client.
        since: Vts,
    },
    /// Fetch exactly the listed revisions.
    Fetch {
        /// Key the revisions belong to.
        key: Key,
        /// Revisions to fetch.
        revisions: Vec<Vts>,
    },
}

impl Request {
    /// Returns the request kind.
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Publish { .. } => RequestKind::Publish,
            Request::Subscribe { .. } => RequestKind::Subscribe,
            Request::Unsubscribe { .. } => RequestKind::Unsubscribe,
            Request::GetAcls => RequestKind::GetAcls,
            Request::Advance { .. } => RequestKind::Advance,
            Request::Fetch { .. } => RequestKind::Fetch,
        }
    }

    /// Returns the key the request addresses, if any.
    pub fn key(&self) -> Option<&Key> {
        match self {
            Request::Publish { key, .. }
            | Request::Subscribe { key }
            | Request::Unsubscribe { key }
            | Request::Advance { key, .. }
            | Request::Fetch { key, .. } => Some(key),
            Request::GetAcls => None,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }
}

/// A response sent by the server.
///
/// The kind of a response always matches the kind of the request it answers.
/// Payload fields are optional on the wire; a missing payload is treated as
/// a malformed response by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// The publish was accepted.
    Published {
        /// Clock assigned to the new revision.
        vts: Option<Vts>,
    },
    /// The subscription was registered.
    Subscribed,
    /// The subscription was removed.
    Unsubscribed,
    /// The ACL set visible to the client.
    Acls {
        /// ACL set.
        acls: Option<AclSet>,
    },
    /// Revisions after the requested clock.
    Advanced {
        /// Revisions the client may be missing, in clock order.
        revisions: Vec<Vts>,
        /// Highest clock the server considers covered by this answer.
        max: Option<Vts>,
    },
    /// Fetched revisions.
    Fetched {
        /// Values, in clock order.
        values: Option<Vec<ValueRecord>>,
    },
    /// The server rejected a request.
    Error {
        /// Kind of the rejected request.
        kind: RequestKind,
        /// Human-readable reason.
        message: String,
    },
}

impl Response {
    /// Creates an error response for a request kind.
    pub fn error(kind: RequestKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }

    /// Returns the kind of request this response answers.
    ///
    /// Subscribe and Unsubscribe requests are answered by their own variants.
    pub fn kind(&self) -> RequestKind {
        match self {
            Response::Published { .. } => RequestKind::Publish,
            Response::Subscribed => RequestKind::Subscribe,
            Response::Unsubscribed => RequestKind::Unsubscribe,
            Response::Acls { .. } => RequestKind::GetAcls,
            Response::Advanced { .. } => RequestKind::Advance,
            Response::Fetched { .. } => RequestKind::Fetch,
            Response::Error { kind, .. } => *kind,
        }
    }

    /// Returns true if this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }
}

fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(message, &mut bytes).map_err(ProtocolError::codec)?;
    Ok(bytes)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(ProtocolError::codec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Acl;

    #[test]
    fn request_kinds_and_keys() {
        let key = Key::new("room/5");
        let advance = Request::Advance {
            key: key.clone(),
            since: Vts::ZERO,
        };
        assert_eq!(advance.kind(), RequestKind::Advance);
        assert_eq!(advance.key(), Some(&key));
        assert_eq!(Request::GetAcls.kind(), RequestKind::GetAcls);
        assert_eq!(Request::GetAcls.key(), None);
    }

    #[test]
    fn response_kinds() {
        assert_eq!(Response::Subscribed.kind(), RequestKind::Subscribe);
        assert_eq!(Response::Unsubscribed.kind(), RequestKind::Unsubscribe);
        let err = Response::error(RequestKind::Fetch, "gone");
        assert_eq!(err.kind(), RequestKind::Fetch);
        assert!(err.is_error());
    }

    #[test]
    fn publish_request_roundtrip() {
        let request = Request::Publish {
            key: Key::new("room/5"),
            data: Some(b"hello".to_vec()),
            delete: false,
            created_at_ms: 1_700_000_000_000,
            acl_id: Some(AclId::new("members")),
        };
        let decoded = Request::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn fetched_response_roundtrip() {
        let values = vec![
            ValueRecord::put(Key::new("room/5"), Vts::new(1), b"a".to_vec(), 10),
            ValueRecord::tombstone(Key::new("room/5"), Vts::new(2), 20),
        ];
        let response = Response::Fetched {
            values: Some(values.clone()),
        };
        let decoded = Response::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, Response::Fetched { values: Some(values) });
    }

    #[test]
    fn acls_response_roundtrip() {
        let acls: AclSet = [
            Acl::new(AclId::new("public"), vec![]),
            Acl::new(AclId::new("members"), vec!["alice".into(), "bob".into()]),
        ]
        .into_iter()
        .collect();
        let response = Response::Acls {
            acls: Some(acls.clone()),
        };
        let decoded = Response::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, Response::Acls { acls: Some(acls) });
    }

    #[test]
    fn decode_garbage_fails() {
        let result = Request::decode(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::Codec(_))));
    }
}
