use serde::{Deserialize, Serialize};

/// Credentials returned by `/website/user/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub status: i64,
    pub token: String,
    /// Pub/sub channel the user listens on for call notifications.
    pub channel: String,
}

/// Status response of `/user/connect` and `/user/call/end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub status: i64,
    #[serde(default)]
    pub call_id: Option<i64>,
    #[serde(default)]
    pub call_queue_id: Option<i64>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Room details for an accepted call, as returned by `/user/call/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDetails {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Access token for the media room.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    /// Websocket URL of the media server.
    #[serde(default)]
    pub websocket: Option<String>,
    pub status: i64,
}

impl CallDetails {
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_details_tolerates_missing_fields() {
        let details: CallDetails =
            serde_json::from_str(r#"{"status":1,"token":"abc","websocket":"wss://rtc.test"}"#)
                .unwrap();
        assert_eq!(details.access_token(), Some("abc"));
        assert_eq!(details.websocket.as_deref(), Some("wss://rtc.test"));
        assert!(details.room.is_none());
    }
}
