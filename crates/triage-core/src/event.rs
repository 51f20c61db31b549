use serde::{Deserialize, Serialize};

use crate::types::{IncidentId, Stage};

/// Progress events emitted by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RunStarted {
        incident_id: IncidentId,
    },
    PhaseEntered {
        incident_id: IncidentId,
        phase: String,
    },
    StageStarted {
        incident_id: IncidentId,
        stage: Stage,
    },
    StageCompleted {
        incident_id: IncidentId,
        stage: Stage,
        elapsed_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fault: Option<String>,
    },
    RunFinished {
        incident_id: IncidentId,
        outcome: String,
        elapsed_ms: u64,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let id = IncidentId::from_str("INC-TEST");

        bus.publish(WorkflowEvent::StageStarted {
            incident_id: id.clone(),
            stage: Stage::Trigger,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            WorkflowEvent::StageStarted {
                incident_id: id,
                stage: Stage::Trigger
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(WorkflowEvent::RunStarted {
            incident_id: IncidentId::new(),
        });
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = WorkflowEvent::PhaseEntered {
            incident_id: IncidentId::from_str("INC-1"),
            phase: "decision".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase_entered");
        assert_eq!(json["phase"], "decision");
    }
}
