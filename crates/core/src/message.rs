//! Outbound message descriptors and the factory that fabricates them.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub const HEADER_MESSAGE_ID: &str = "NServiceBus.MessageId";
pub const HEADER_CONTENT_TYPE: &str = "NServiceBus.ContentType";
pub const HEADER_ENCLOSED_TYPES: &str = "NServiceBus.EnclosedMessageTypes";
pub const HEADER_CORRELATION_ID: &str = "NServiceBus.CorrelationId";
pub const HEADER_CONVERSATION_ID: &str = "NServiceBus.ConversationId";
pub const HEADER_INTENT: &str = "NServiceBus.MessageIntent";
pub const HEADER_TIME_SENT: &str = "NServiceBus.TimeSent";

/// Distinct originating/processing endpoints cycled through by the factory.
const ENDPOINT_SPREAD: u64 = 100;
/// Distinct enclosed message types cycled through by the factory.
const MESSAGE_TYPE_SPREAD: u64 = 250;

/// Which of the two message shapes to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageShape {
    /// A successfully processed message, as seen by an audit queue.
    Audit,
    /// A failed message carrying exception details, as seen by an error queue.
    Error,
}

impl MessageShape {
    pub fn from_is_error(is_error: bool) -> Self {
        if is_error {
            Self::Error
        } else {
            Self::Audit
        }
    }
}

/// A single fabricated message ready for dispatch.
///
/// The engine never looks inside; only the dispatcher does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Produces message payloads for batch slots.
pub trait MessageFactory: Send + Sync {
    fn create(&self) -> OutboundMessage;
}

impl<F> MessageFactory for F
where
    F: Fn() -> OutboundMessage + Send + Sync,
{
    fn create(&self) -> OutboundMessage {
        self()
    }
}

/// Factory producing NServiceBus-style audit or error messages.
///
/// Header values cycle deterministically through a fixed spread so that
/// downstream grouping sees a realistic number of distinct endpoints and types.
pub struct SyntheticMessageFactory {
    shape: MessageShape,
    machine: String,
    prefix: String,
    sequence: AtomicU64,
}

impl SyntheticMessageFactory {
    pub fn new(shape: MessageShape) -> Self {
        let machine = std::env::var("HOSTNAME").unwrap_or_else(|_| "loadgen".to_string());
        Self::with_machine(shape, machine)
    }

    pub fn with_machine(shape: MessageShape, machine: impl Into<String>) -> Self {
        Self {
            shape,
            machine: machine.into(),
            prefix: Uuid::new_v4().simple().to_string(),
            sequence: AtomicU64::new(0),
        }
    }

    fn build(&self, seq: u64, now: DateTime<Utc>) -> OutboundMessage {
        let id = format!("{}/{}", self.prefix, seq);
        let endpoint = |offset: u64| format!("endpoint_{}", (seq + offset) % ENDPOINT_SPREAD);
        let hour = now.format("%Y-%-m-%dT%H");

        let mut headers = BTreeMap::new();
        headers.insert(HEADER_MESSAGE_ID.to_string(), id.clone());
        headers.insert(HEADER_CONTENT_TYPE.to_string(), "text/plain".to_string());
        headers.insert(
            HEADER_ENCLOSED_TYPES.to_string(),
            format!("random_{}", seq % MESSAGE_TYPE_SPREAD),
        );
        headers.insert(HEADER_CORRELATION_ID.to_string(), format!("{hour}_{seq}"));
        headers.insert(HEADER_CONVERSATION_ID.to_string(), format!("{hour}_{}", seq / 10));
        headers.insert(
            HEADER_INTENT.to_string(),
            ["Send", "Publish", "Reply"][(seq % 3) as usize].to_string(),
        );
        headers.insert(HEADER_TIME_SENT.to_string(), wire_format(now));
        headers.insert("NServiceBus.OriginatingEndpoint".to_string(), endpoint(0));
        headers.insert(
            "NServiceBus.OriginatingMachine".to_string(),
            self.machine.clone(),
        );

        match self.shape {
            MessageShape::Error => {
                headers.insert("NServiceBus.FailedQ".to_string(), endpoint(7));
                headers.insert(
                    "NServiceBus.ExceptionInfo.ExceptionType".to_string(),
                    format!("LoadGen.Faults.SimulatedException{}", seq % 50),
                );
                headers.insert(
                    "NServiceBus.ExceptionInfo.InnerExceptionType".to_string(),
                    "System.InvalidOperationException".to_string(),
                );
                headers.insert(
                    "NServiceBus.ExceptionInfo.Message".to_string(),
                    format!("Simulated failure {seq}"),
                );
                headers.insert(
                    "NServiceBus.ExceptionInfo.StackTrace".to_string(),
                    "at LoadGen.Handler.Handle()\nat LoadGen.Pipeline.Invoke()".to_string(),
                );
            }
            MessageShape::Audit => {
                let ended = now + Duration::milliseconds(20 + (seq % 200) as i64 * 100);
                headers.insert("NServiceBus.ProcessingEndpoint".to_string(), endpoint(3));
                headers.insert(
                    "NServiceBus.ProcessingMachine".to_string(),
                    self.machine.clone(),
                );
                headers.insert("NServiceBus.ProcessingStarted".to_string(), wire_format(now));
                headers.insert("NServiceBus.ProcessingEnded".to_string(), wire_format(ended));
            }
        }

        OutboundMessage {
            id,
            headers,
            body: format!("{{\"sequence\":{seq}}}").into_bytes(),
        }
    }
}

impl MessageFactory for SyntheticMessageFactory {
    fn create(&self) -> OutboundMessage {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.build(seq, Utc::now())
    }
}

fn wire_format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
