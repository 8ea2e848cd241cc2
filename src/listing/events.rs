//! Server-sent events emitted by the listing workflows

use axum::response::sse::Event;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Generate,
    UploadImages,
    Submit,
    End,
    Resubmit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub step: u8,
    pub total: u8,
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Complete {
    pub listing_id: Uuid,
    pub external_listing_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Progress(Progress),
    Complete(Complete),
    Error(Failure),
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Progress(_) => "progress",
            WorkflowEvent::Complete(_) => "complete",
            WorkflowEvent::Error(_) => "error",
        }
    }

    fn payload(&self) -> serde_json::Result<String> {
        match self {
            WorkflowEvent::Progress(p) => serde_json::to_string(p),
            WorkflowEvent::Complete(c) => serde_json::to_string(c),
            WorkflowEvent::Error(f) => serde_json::to_string(f),
        }
    }

    pub fn into_sse(self) -> Event {
        let data = self.payload().unwrap_or_else(|_| "{}".to_string());
        Event::default().event(self.name()).data(data)
    }
}

/// The client went away; the workflow should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// Sending half of one SSE stream
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<WorkflowEvent>,
    total: u8,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<WorkflowEvent>, total: u8) -> Self {
        Self { tx, total }
    }

    pub async fn progress(
        &self,
        step: u8,
        stage: Stage,
        message: impl Into<String>,
    ) -> Result<(), Disconnected> {
        self.send(WorkflowEvent::Progress(Progress {
            step,
            total: self.total,
            stage,
            message: message.into(),
        }))
        .await
    }

    pub async fn send(&self, event: WorkflowEvent) -> Result<(), Disconnected> {
        self.tx.send(event).await.map_err(|_| Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shapes() {
        let progress = WorkflowEvent::Progress(Progress {
            step: 3,
            total: 4,
            stage: Stage::UploadImages,
            message: "Uploading 2 images".into(),
        });
        assert_eq!(progress.name(), "progress");
        assert_eq!(
            progress.payload().unwrap(),
            r#"{"step":3,"total":4,"stage":"upload_images","message":"Uploading 2 images"}"#
        );

        let failure = WorkflowEvent::Error(Failure {
            stage: Stage::Submit,
            message: "rejected".into(),
        });
        assert_eq!(failure.name(), "error");
        assert_eq!(failure.payload().unwrap(), r#"{"stage":"submit","message":"rejected"}"#);
    }

    #[tokio::test]
    async fn closed_receiver_reports_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = EventSink::new(tx, 4);
        assert_eq!(sink.progress(1, Stage::Load, "x").await, Err(Disconnected));
    }
}
