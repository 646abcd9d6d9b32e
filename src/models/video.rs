use crate::error::{PipelineError, PollingError, Result};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[serde(alias = "RUNNING", alias = "THROTTLED")]
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTask {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub output: Vec<String>,
    #[serde(default, rename = "failure")]
    pub failure_reason: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl VideoTask {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            output: Vec::new(),
            failure_reason: None,
        }
    }

    /// Maps a terminal task onto the caller-facing outcome.
    pub fn into_outcome(self) -> Result<Self> {
        match self.status {
            TaskStatus::Succeeded if self.output.is_empty() => {
                Err(PipelineError::InconsistentSuccess { task_id: self.id })
            }
            TaskStatus::Succeeded => Ok(self),
            TaskStatus::Pending => Err(PollingError::Malformed(format!(
                "task {} has not reached a terminal state",
                self.id
            ))
            .into()),
            TaskStatus::Failed => Err(PollingError::Failed {
                task_id: self.id,
                reason: self.failure_reason,
            }
            .into()),
            TaskStatus::Cancelled => Err(PollingError::Cancelled { task_id: self.id }.into()),
        }
    }

    pub fn primary_output(&self) -> Option<&str> {
        self.output.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VideoDuration {
    #[default]
    Five,
    Ten,
}

impl VideoDuration {
    pub fn seconds(&self) -> u8 {
        match self {
            VideoDuration::Five => 5,
            VideoDuration::Ten => 10,
        }
    }
}

impl TryFrom<u8> for VideoDuration {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            5 => Ok(VideoDuration::Five),
            10 => Ok(VideoDuration::Ten),
            other => Err(format!("unsupported video duration {}s (use 5 or 10)", other)),
        }
    }
}

impl From<VideoDuration> for u8 {
    fn from(value: VideoDuration) -> Self {
        value.seconds()
    }
}

/// Body of the image-to-video creation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTaskRequest {
    pub model: String,
    pub prompt_image: String,
    pub prompt_text: String,
    pub duration: VideoDuration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskCreatedResponse {
    pub id: String,
}
