//! Progress events emitted while a request runs.
//!
//! Events travel over a single typed channel. An [`EventSink`] bound to a
//! folder run wraps every event in a [`RunFolderEvent`] carrying the folder
//! uid, so one subscriber can follow both single requests and runner
//! progress.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::cookie::Cookie;
use crate::scripting::ConsoleEntry;
use crate::testing::{AssertionResult, TestResult};
use crate::variables::VariableMap;
use crate::wire::HeaderList;

/// Identifiers carried by every request event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventIds {
    /// Collection uid.
    pub collection_uid: String,
    /// Request item uid.
    pub item_uid: String,
    /// Request context uid.
    pub request_uid: String,
}

/// The request as it left, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRequest {
    /// Method.
    pub method: String,
    /// URL.
    pub url: String,
    /// Headers.
    pub headers: HeaderList,
    /// Text body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RequestEvent {
    /// The request was accepted for execution.
    RequestQueued {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
    },
    /// The request waits before starting.
    RequestDelayed {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// The request was handed to the transport.
    RequestSent {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
        /// What was sent.
        request: SentRequest,
    },
    /// A final response arrived.
    ResponseReceived {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
        /// Status code.
        status: u16,
        /// Reason phrase.
        status_text: String,
        /// Response headers.
        headers: HeaderList,
        /// Body as seen by scripts.
        data: Value,
        /// Total time in milliseconds.
        duration_ms: u64,
        /// Decoded body size.
        size: usize,
    },
    /// The request failed.
    ResponseError {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
        /// Error message.
        error: String,
    },
    /// Assertion results.
    AssertionResults {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
        /// Results in declaration order.
        results: Vec<AssertionResult>,
    },
    /// Test results.
    TestResults {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
        /// Results in execution order.
        results: Vec<TestResult>,
    },
    /// A script changed writable scopes.
    #[serde(rename = "script-environment-update")]
    ScriptEnvironmentUpdated {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
        /// Environment scope after the script.
        env_variables: VariableMap,
        /// Runtime scope after the script.
        runtime_variables: VariableMap,
        /// Global scope after the script.
        global_variables: VariableMap,
    },
    /// The shared cookie jar changed.
    CookieUpdated {
        /// Cookies stored by this response.
        cookies: Vec<Cookie>,
    },
    /// A script wrote to the console.
    ConsoleLog {
        /// Identifiers.
        #[serde(flatten)]
        ids: EventIds,
        /// The console call.
        entry: ConsoleEntry,
    },
}

impl RequestEvent {
    /// Event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestQueued { .. } => "request-queued",
            Self::RequestDelayed { .. } => "request-delayed",
            Self::RequestSent { .. } => "request-sent",
            Self::ResponseReceived { .. } => "response-received",
            Self::ResponseError { .. } => "response-error",
            Self::AssertionResults { .. } => "assertion-results",
            Self::TestResults { .. } => "test-results",
            Self::ScriptEnvironmentUpdated { .. } => "script-environment-update",
            Self::CookieUpdated { .. } => "cookie-updated",
            Self::ConsoleLog { .. } => "console-log",
        }
    }
}

/// A request event observed during a folder run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFolderEvent {
    /// Folder (or collection) being run.
    pub folder_uid: String,
    /// The wrapped event.
    pub event: RequestEvent,
}

/// What subscribers receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum EventEnvelope {
    /// Single-request progress.
    Request(RequestEvent),
    /// Folder runner progress.
    RunFolder(RunFolderEvent),
}

impl EventEnvelope {
    /// The underlying request event.
    #[must_use]
    pub const fn event(&self) -> &RequestEvent {
        match self {
            Self::Request(event) | Self::RunFolder(RunFolderEvent { event, .. }) => event,
        }
    }
}

/// Receiving half of an event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<EventEnvelope>;

/// Sending half; cheap to clone. A sink without a channel drops events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<EventEnvelope>>,
    folder_uid: Option<String>,
}

impl EventSink {
    /// Creates a connected sink and its receiver.
    #[must_use]
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                folder_uid: None,
            },
            rx,
        )
    }

    /// A sink that drops everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// The same channel, wrapping events for a folder run.
    #[must_use]
    pub fn for_folder(&self, folder_uid: impl Into<String>) -> Self {
        Self {
            tx: self.tx.clone(),
            folder_uid: Some(folder_uid.into()),
        }
    }

    /// Sends an event; a closed receiver is ignored.
    pub fn emit(&self, event: RequestEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let envelope = match &self.folder_uid {
            Some(folder_uid) => EventEnvelope::RunFolder(RunFolderEvent {
                folder_uid: folder_uid.clone(),
                event,
            }),
            None => EventEnvelope::Request(event),
        };
        if tx.send(envelope).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn queued() -> RequestEvent {
        RequestEvent::RequestQueued {
            ids: EventIds {
                collection_uid: "c".into(),
                item_uid: "i".into(),
                request_uid: "r".into(),
            },
        }
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(queued());
        sink.emit(RequestEvent::CookieUpdated { cookies: vec![] });

        assert_eq!(rx.try_recv().unwrap().event().name(), "request-queued");
        assert_eq!(rx.try_recv().unwrap().event().name(), "cookie-updated");
    }

    #[test]
    fn test_folder_sink_wraps_events() {
        let (sink, mut rx) = EventSink::channel();
        sink.for_folder("f1").emit(queued());
        match rx.try_recv().unwrap() {
            EventEnvelope::RunFolder(RunFolderEvent { folder_uid, .. }) => {
                assert_eq!(folder_uid, "f1");
            }
            EventEnvelope::Request(_) => panic!("expected folder event"),
        }
    }

    #[test]
    fn test_closed_or_disabled_sink_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(queued());
        EventSink::disabled().emit(queued());
    }

    #[test]
    fn test_event_serialization_tag() {
        let json = serde_json::to_value(queued()).unwrap();
        assert_eq!(json["type"], "request-queued");
        assert_eq!(json["item_uid"], "i");
    }
}
