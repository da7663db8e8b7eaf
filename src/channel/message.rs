use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Push messages the kiosk understands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    PersonDetected,
    ResetIdle,
    QrFound {
        #[serde(default)]
        patient: Value,
    },
    QrNotFound {
        #[serde(default)]
        hn: Value,
    },
}

const KNOWN_KINDS: [&str; 4] = ["person_detected", "reset_idle", "qr_found", "qr_not_found"];

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(PushMessage),
    Unrecognized(String),
    Malformed(String),
}

/// Classify one text frame. Never fails; callers log and drop the non-messages.
pub fn decode(text: &str) -> Inbound {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => return Inbound::Malformed(err.to_string()),
    };

    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_string) else {
        return Inbound::Unrecognized("<untyped>".into());
    };
    if !KNOWN_KINDS.contains(&kind.as_str()) {
        return Inbound::Unrecognized(kind);
    }

    match serde_json::from_value::<PushMessage>(value) {
        Ok(message) => Inbound::Message(message),
        Err(err) => Inbound::Malformed(format!("{kind}: {err}")),
    }
}

/// Result of a backend-side QR lookup, forwarded to whoever shows patient details.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PatientLookup {
    Found { hn: String, patient: Value },
    NotFound { hn: String },
}

impl PatientLookup {
    pub fn from_message(message: &PushMessage) -> Option<Self> {
        match message {
            PushMessage::QrFound { patient } => Some(PatientLookup::Found {
                hn: value_text(patient.get("HN").unwrap_or(&Value::Null)),
                patient: patient.clone(),
            }),
            PushMessage::QrNotFound { hn } => Some(PatientLookup::NotFound {
                hn: value_text(hn),
            }),
            _ => None,
        }
    }

    pub fn hn(&self) -> &str {
        match self {
            PatientLookup::Found { hn, .. } | PatientLookup::NotFound { hn } => hn,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
