use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// State reported by the monitoring alarm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    Alarm,
    Ok,
    Other(String),
}

impl AlarmState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ALARM" => AlarmState::Alarm,
            "OK" => AlarmState::Ok,
            other => AlarmState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AlarmState::Alarm => "ALARM",
            AlarmState::Ok => "OK",
            AlarmState::Other(raw) => raw,
        }
    }

    pub fn is_alarm(&self) -> bool {
        matches!(self, AlarmState::Alarm)
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alarm body carried inside the notification message
#[derive(Debug, Deserialize)]
struct AlarmBody {
    #[serde(rename = "NewStateValue")]
    new_state: Option<String>,

    #[serde(rename = "OldStateValue")]
    old_state: Option<String>,

    #[serde(rename = "NewStateReason")]
    reason: Option<String>,
}

/// A monitoring alarm state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub new_state: AlarmState,
    pub old_state: String,
    pub reason: String,
}

impl Default for AlarmEvent {
    /// Used when the payload cannot be read, e.g. a manual test invocation
    fn default() -> Self {
        AlarmEvent {
            new_state: AlarmState::Alarm,
            old_state: "OK".to_string(),
            reason: "Manual Trigger".to_string(),
        }
    }
}

impl AlarmEvent {
    /// Parse the alarm from a notification envelope
    /// (`Records[0].Sns.Message`, itself a JSON string).
    ///
    /// Never fails: a malformed or absent payload yields `AlarmEvent::default()`.
    pub fn from_notification(payload: &Value) -> Self {
        match Self::try_from_notification(payload) {
            Some(event) => event,
            None => {
                log::warn!("Alarm payload missing or malformed, using manual trigger defaults");
                AlarmEvent::default()
            }
        }
    }

    fn try_from_notification(payload: &Value) -> Option<Self> {
        let message = payload
            .get("Records")?
            .get(0)?
            .get("Sns")?
            .get("Message")?
            .as_str()?;

        let body: AlarmBody = serde_json::from_str(message).ok()?;

        Some(AlarmEvent {
            new_state: AlarmState::parse(body.new_state.as_deref().unwrap_or("ALARM")),
            old_state: body.old_state.unwrap_or_else(|| "OK".to_string()),
            reason: body.reason.unwrap_or_else(|| "Threshold Crossed".to_string()),
        })
    }
}
