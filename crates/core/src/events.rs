//! Boundary with the external DHT engine.
//!
//! The engine calls into this crate through [`DhtEventHandler`] on its own
//! threads. When the engine runs as a separate process it streams its
//! callbacks as JSON lines, one [`DhtEvent`] per line, which
//! [`read_events`] replays into a handler.

use std::io::BufRead;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// An incoming KRPC query as seen by the DHT engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KrpcQuery {
    /// Query method, e.g. `get_peers` or `announce_peer`.
    pub method: String,
    /// The `info_hash` argument, when the method carries one.
    pub info_hash: Option<Vec<u8>>,
    /// Node id of the querying node.
    pub node_id: Vec<u8>,
}

/// Callbacks the DHT engine invokes.
///
/// Implementations must never fail back into the engine.
pub trait DhtEventHandler: Send + Sync {
    /// Called for every incoming query. Returns whether the engine should
    /// continue normal protocol processing.
    fn on_query(&self, query: &KrpcQuery, source: SocketAddr) -> bool;

    /// Called when a peer announces itself for an info-hash.
    fn on_announce_peer(&self, info_hash: &[u8], peer: SocketAddr);
}

/// Errors while decoding streamed events.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Invalid event JSON: {0}")]
    Json(String),

    #[error("Invalid hex in event: {0}")]
    Hex(String),

    #[error("Failed to read events: {0}")]
    Io(String),
}

/// One engine callback, serialized. Byte fields are hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DhtEvent {
    Query {
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info_hash: Option<String>,
        node_id: String,
        source: SocketAddr,
    },
    AnnouncePeer {
        info_hash: String,
        peer: SocketAddr,
    },
}

impl DhtEvent {
    pub fn parse(line: &str) -> Result<Self, EventError> {
        serde_json::from_str(line).map_err(|e| EventError::Json(e.to_string()))
    }

    /// Invoke the matching handler callback.
    pub fn dispatch(&self, handler: &dyn DhtEventHandler) -> Result<(), EventError> {
        match self {
            DhtEvent::Query {
                method,
                info_hash,
                node_id,
                source,
            } => {
                let query = KrpcQuery {
                    method: method.clone(),
                    info_hash: info_hash.as_deref().map(decode_hex).transpose()?,
                    node_id: decode_hex(node_id)?,
                };
                handler.on_query(&query, *source);
            }
            DhtEvent::AnnouncePeer { info_hash, peer } => {
                handler.on_announce_peer(&decode_hex(info_hash)?, *peer);
            }
        }
        Ok(())
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, EventError> {
    hex::decode(s).map_err(|e| EventError::Hex(e.to_string()))
}

/// Counters from one [`read_events`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub dispatched: u64,
    pub malformed: u64,
}

/// Replay JSON-lines events into `handler` until end of input.
///
/// Malformed lines are logged and skipped. Blocks the calling thread, so run
/// it off the async runtime.
pub fn read_events<R: BufRead>(
    reader: R,
    handler: &dyn DhtEventHandler,
) -> Result<EventStats, EventError> {
    let mut stats = EventStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EventError::Io(e.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match DhtEvent::parse(line).and_then(|event| event.dispatch(handler)) {
            Ok(()) => stats.dispatched += 1,
            Err(e) => {
                stats.malformed += 1;
                warn!(line = index + 1, error = %e, "Skipping malformed DHT event");
            }
        }
    }

    debug!(
        dispatched = stats.dispatched,
        malformed = stats.malformed,
        "DHT event stream ended"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        queries: Mutex<Vec<(KrpcQuery, SocketAddr)>>,
        announces: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    impl DhtEventHandler for Recorder {
        fn on_query(&self, query: &KrpcQuery, source: SocketAddr) -> bool {
            self.queries.lock().unwrap().push((query.clone(), source));
            true
        }

        fn on_announce_peer(&self, info_hash: &[u8], peer: SocketAddr) {
            self.announces
                .lock()
                .unwrap()
                .push((info_hash.to_vec(), peer));
        }
    }

    #[test]
    fn test_parse_query_event() {
        let event = DhtEvent::parse(
            r#"{"type":"query","method":"get_peers","info_hash":"0a0b","node_id":"ff","source":"10.0.0.1:6881"}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            DhtEvent::Query {
                method: "get_peers".to_string(),
                info_hash: Some("0a0b".to_string()),
                node_id: "ff".to_string(),
                source: "10.0.0.1:6881".parse().unwrap(),
            }
        );
    }

    #[test]
    fn test_dispatch_decodes_hex() {
        let recorder = Recorder::default();
        let event = DhtEvent::AnnouncePeer {
            info_hash: "0102".to_string(),
            peer: "192.168.1.2:51413".parse().unwrap(),
        };

        event.dispatch(&recorder).unwrap();

        let announces = recorder.announces.lock().unwrap();
        assert_eq!(announces[0].0, vec![1, 2]);
    }

    #[test]
    fn test_read_events_skips_malformed_lines() {
        let input = concat!(
            r#"{"type":"query","method":"ping","node_id":"aa","source":"1.2.3.4:1"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"type":"announce_peer","info_hash":"zz","peer":"1.2.3.4:1"}"#,
            "\n",
            r#"{"type":"announce_peer","info_hash":"abcd","peer":"1.2.3.4:2"}"#,
            "\n",
        );
        let recorder = Recorder::default();

        let stats = read_events(Cursor::new(input), &recorder).unwrap();

        assert_eq!(
            stats,
            EventStats {
                dispatched: 2,
                malformed: 2
            }
        );
        let queries = recorder.queries.lock().unwrap();
        assert_eq!(queries[0].0.method, "ping");
        assert_eq!(queries[0].0.info_hash, None);
        assert_eq!(recorder.announces.lock().unwrap().len(), 1);
    }
}
