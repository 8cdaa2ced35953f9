//! Wire protocol between the oracle and its worker.
//!
//! ```text
//! worker -> parent   "ready"                      (once, after startup)
//! parent -> worker   GenerationRequest            (one per attempt)
//! worker -> parent   ["ok", WorldSnapshot]        (generation succeeded)
//!                  | ["error", "<detail text>"]   (generation failed)
//! ```
//!
//! The protocol is private to twinrun; both ends are always built from the
//! same source.

use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use twinrun_snapshot::snapshot::WorldSnapshot;

/// Handshake sentinel sent by the worker once it is ready for requests.
pub const READY: &str = "ready";

const TAG_OK: &str = "ok";
const TAG_ERROR: &str = "error";

/// Reply to one generation request.
#[derive(Debug, Clone)]
pub enum WorkerReply {
    /// The worker's own snapshot of its generation result.
    Ok(Box<WorldSnapshot>),
    /// Failure text: error message, full trace, and the diagnostics captured
    /// during the attempt.
    Error(String),
}

impl WorkerReply {
    pub fn tag(&self) -> &'static str {
        match self {
            WorkerReply::Ok(_) => TAG_OK,
            WorkerReply::Error(_) => TAG_ERROR,
        }
    }
}

impl Serialize for WorkerReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(self.tag())?;
        match self {
            WorkerReply::Ok(snapshot) => tuple.serialize_element(snapshot.as_ref())?,
            WorkerReply::Error(detail) => tuple.serialize_element(detail)?,
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for WorkerReply {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(2, ReplyVisitor)
    }
}

/// Decodes the payload straight from the sequence. Going through
/// `serde_json::Value` would re-sort the snapshot's name-keyed maps.
struct ReplyVisitor;

impl<'de> Visitor<'de> for ReplyVisitor {
    type Value = WorkerReply;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a two-element [tag, payload] worker reply")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let tag: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let reply = match tag.as_str() {
            TAG_OK => seq
                .next_element::<WorldSnapshot>()?
                .map(|snapshot| WorkerReply::Ok(Box::new(snapshot))),
            TAG_ERROR => seq.next_element::<String>()?.map(WorkerReply::Error),
            other => return Err(de::Error::unknown_variant(other, &[TAG_OK, TAG_ERROR])),
        };
        reply.ok_or_else(|| de::Error::invalid_length(1, &self))
    }
}
