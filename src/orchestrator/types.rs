//! Turn request, phases and outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::provider::RunSettings;
use crate::transcript::Transcript;

/// Orchestrator state for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TurnPhase {
    Idle,
    Starting,
    Draining,
    ToolDispatch,
    Resuming,
    Done,
    Errored,
    Canceled,
}

/// One user turn against a conversation.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub user_message: String,
    /// Existing conversation to continue; `None` creates a new one.
    pub thread_id: Option<String>,
    pub settings: RunSettings,
}

impl TurnRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ..Default::default()
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Turn terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed { error: String },
    Canceled,
}

/// Result of a turn, including what a chat store needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Last run observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Run queue entries fully or partially drained.
    pub runs_drained: usize,
    pub transcript: Transcript,
    pub finished_at: DateTime<Utc>,
}

impl TurnOutcome {
    pub(crate) fn new(status: TurnStatus) -> Self {
        Self {
            status,
            thread_id: None,
            run_id: None,
            runs_drained: 0,
            transcript: Transcript::default(),
            finished_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::new(TurnStatus::Failed {
            error: error.into(),
        })
    }

    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TurnStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}
