use std::fmt::Display;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::Report;

/// One frame of the progress stream. `Error` and `Complete` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Running { message: String },
    Error { message: String },
    Complete { result: Box<Report> },
}

impl ProgressEvent {
    pub fn running(message: impl Into<String>) -> Self {
        ProgressEvent::Running {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Running { .. })
    }
}

impl Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressEvent::Running { message } => write!(f, "[running] {}", message),
            ProgressEvent::Error { message } => write!(f, "[error] {}", message),
            ProgressEvent::Complete { result } => write!(f, "[complete] report for {}", result.user),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Progress receiver is gone")]
pub struct SinkClosed;

/// Ordered, append-only destination for progress events.
pub trait EventSink {
    fn emit(&mut self, event: ProgressEvent) -> impl Future<Output = Result<(), SinkClosed>> + Send;

    /// True once nobody is listening any more.
    fn is_closed(&self) -> bool {
        false
    }
}

impl EventSink for mpsc::Sender<ProgressEvent> {
    async fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkClosed> {
        self.send(event).await.map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

impl EventSink for mpsc::UnboundedSender<ProgressEvent> {
    async fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkClosed> {
        self.send(event).map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

impl EventSink for Vec<ProgressEvent> {
    async fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkClosed> {
        self.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_wire_format() {
        let json = serde_json::to_string(&ProgressEvent::running("Logged in to portal")).unwrap();
        assert_eq!(json, r#"{"status":"running","message":"Logged in to portal"}"#);

        let json = serde_json::to_string(&ProgressEvent::Error {
            message: "Invalid username or password".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"error","message":"Invalid username or password"}"#);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (mut tx, rx) = mpsc::channel::<ProgressEvent>(4);
        tx.emit(ProgressEvent::running("one")).await.unwrap();
        assert!(!EventSink::is_closed(&tx));

        drop(rx);
        assert!(EventSink::is_closed(&tx));
        assert!(tx.emit(ProgressEvent::running("two")).await.is_err());
    }
}
