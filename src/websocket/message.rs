use serde::{Deserialize, Serialize};

/// Query attributes every upgrade request must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredAttribute {
    Username,
    ChannelId,
}

impl RequiredAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::ChannelId => "channel_id",
        }
    }
}

/// Frame sent to a client that is refused before joining a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

impl ErrorFrame {
    pub fn missing_attribute(attribute: RequiredAttribute) -> Self {
        Self {
            error: format!("missing attribute: {}", attribute.as_str()),
        }
    }

    /// Wire text of the frame, e.g. `{"error": "missing attribute: username"}`
    pub fn to_text(&self) -> String {
        // Keep the space after the colon that existing clients match on
        match serde_json::to_string(&self.error) {
            Ok(quoted) => format!("{{\"error\": {}}}", quoted),
            Err(_) => "{\"error\": \"internal error\"}".to_string(),
        }
    }
}
