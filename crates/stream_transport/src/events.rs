use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle phase reported by a `tool_status` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Started,
    Finished,
}

impl ToolPhase {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "started" => Self::Started,
            "finished" => Self::Finished,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
        }
    }
}

/// One decoded transport record, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    Reasoning {
        delta: String,
    },
    Delta {
        #[serde(default = "default_role")]
        role: String,
        delta: String,
    },
    ToolStatus {
        status: ToolPhase,
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function: Option<String>,
        /// Raw argument text as declared by the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_type: Option<String>,
    },
    Completed {},
    Error {
        error: String,
    },
}

fn default_role() -> String {
    "assistant".to_string()
}

impl TransportEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Reasoning { .. } => "reasoning",
            Self::Delta { .. } => "delta",
            Self::ToolStatus { .. } => "tool_status",
            Self::Completed {} => "completed",
            Self::Error { .. } => "error",
        }
    }

    /// Returns true when this record ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed {} | Self::Error { .. })
    }
}
