//! Wire protocol message types
//!
//! JSON frames exchanged with the chat server over the WebSocket. Requests
//! carry a correlation id that the matching `result` or `error` frame
//! echoes; `created` frames are server-initiated and carry none.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::query::Query;

/// Password authentication strategy name
pub const STRATEGY_LOCAL: &str = "local";
/// Token authentication strategy name
pub const STRATEGY_JWT: &str = "jwt";

/// Messages sent to the chat server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Authenticate with credentials or a persisted token
    #[serde(rename = "authenticate")]
    Authenticate {
        id: Uuid,
        strategy: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
        access_token: Option<String>,
    },

    /// Invalidate the server-side session
    #[serde(rename = "logout")]
    Logout { id: Uuid },

    /// Fetch a page of records from a collection
    #[serde(rename = "find")]
    Find {
        id: Uuid,
        collection: String,
        query: Query,
    },

    /// Create a record in a collection
    #[serde(rename = "create")]
    Create {
        id: Uuid,
        collection: String,
        record: Value,
    },
}

/// Messages received from the chat server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Successful reply to a request
    #[serde(rename = "result")]
    Result {
        id: Uuid,
        #[serde(default)]
        data: Value,
    },

    /// Failed reply; `id` is absent for connection-level errors
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        id: Option<Uuid>,
        name: String,
        message: String,
    },

    /// A record was created somewhere; pushed to every subscriber
    #[serde(rename = "created")]
    Created { collection: String, record: Value },
}

impl ClientMessage {
    /// Create a password authentication request
    pub fn authenticate_password(id: Uuid, email: &str, password: &str) -> Self {
        ClientMessage::Authenticate {
            id,
            strategy: STRATEGY_LOCAL.to_string(),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            access_token: None,
        }
    }

    /// Create a token authentication request
    pub fn authenticate_token(id: Uuid, token: &str) -> Self {
        ClientMessage::Authenticate {
            id,
            strategy: STRATEGY_JWT.to_string(),
            email: None,
            password: None,
            access_token: Some(token.to_string()),
        }
    }

    /// Create a logout request
    pub fn logout(id: Uuid) -> Self {
        ClientMessage::Logout { id }
    }

    /// Create a find request
    pub fn find(id: Uuid, collection: &str, query: Query) -> Self {
        ClientMessage::Find {
            id,
            collection: collection.to_string(),
            query,
        }
    }

    /// Create a create request
    pub fn create(id: Uuid, collection: &str, record: Value) -> Self {
        ClientMessage::Create {
            id,
            collection: collection.to_string(),
            record,
        }
    }

    /// Correlation id of this request
    pub fn id(&self) -> Uuid {
        match self {
            ClientMessage::Authenticate { id, .. }
            | ClientMessage::Logout { id }
            | ClientMessage::Find { id, .. }
            | ClientMessage::Create { id, .. } => *id,
        }
    }

    /// Encode message to a JSON frame
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("JSON encoding failed")
    }
}

impl ServerMessage {
    /// Decode a message from a JSON frame
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_password_auth_encoding() {
        let id = Uuid::new_v4();
        let msg = ClientMessage::authenticate_password(id, "alice@example.com", "secret");
        let frame = msg.encode();

        assert!(frame.contains(r#""type":"authenticate""#));
        assert!(frame.contains(r#""strategy":"local""#));
        assert!(frame.contains("alice@example.com"));
        assert!(!frame.contains("accessToken"));
    }

    #[test]
    fn test_token_auth_encoding() {
        let msg = ClientMessage::authenticate_token(Uuid::new_v4(), "jwt-abc");
        let frame = msg.encode();

        assert!(frame.contains(r#""strategy":"jwt""#));
        assert!(frame.contains(r#""accessToken":"jwt-abc""#));
        assert!(!frame.contains("password"));
    }

    #[test]
    fn test_find_encoding() {
        let msg = ClientMessage::find(
            Uuid::new_v4(),
            "messages",
            Query::latest("createdAt", 25),
        );
        let frame = msg.encode();

        assert!(frame.contains(r#""type":"find""#));
        assert!(frame.contains(r#""collection":"messages""#));
        assert!(frame.contains(r#""$sort":{"createdAt":-1}"#));
        assert!(frame.contains(r#""$limit":25"#));
    }

    #[test]
    fn test_create_encoding() {
        let msg = ClientMessage::create(Uuid::new_v4(), "messages", json!({"text": "hi"}));
        let frame = msg.encode();

        assert!(frame.contains(r#""type":"create""#));
        assert!(frame.contains(r#""record":{"text":"hi"}"#));
    }

    #[test]
    fn test_message_id_accessor() {
        let id = Uuid::new_v4();
        assert_eq!(ClientMessage::logout(id).id(), id);
        assert_eq!(ClientMessage::find(id, "users", Query::all()).id(), id);
    }

    #[test]
    fn test_result_decoding() {
        let id = Uuid::new_v4();
        let frame = format!(r#"{{"type":"result","id":"{}","data":{{"data":[]}}}}"#, id);
        let decoded = ServerMessage::decode(&frame).unwrap();

        match decoded {
            ServerMessage::Result { id: got, data } => {
                assert_eq!(got, id);
                assert!(data.get("data").is_some());
            }
            _ => panic!("Expected Result message"),
        }
    }

    #[test]
    fn test_error_decoding_without_id() {
        let frame = r#"{"type":"error","name":"NotAuthenticated","message":"Invalid login"}"#;
        let decoded = ServerMessage::decode(frame).unwrap();

        match decoded {
            ServerMessage::Error { id, name, message } => {
                assert!(id.is_none());
                assert_eq!(name, "NotAuthenticated");
                assert_eq!(message, "Invalid login");
            }
            _ => panic!("Expected Error message"),
        }
    }

    #[test]
    fn test_created_decoding() {
        let frame = r#"{"type":"created","collection":"messages","record":{"text":"hi"}}"#;
        let decoded = ServerMessage::decode(frame).unwrap();

        match decoded {
            ServerMessage::Created { collection, record } => {
                assert_eq!(collection, "messages");
                assert_eq!(record["text"], "hi");
            }
            _ => panic!("Expected Created message"),
        }
    }

    #[test]
    fn test_malformed_frame_fails() {
        assert!(ServerMessage::decode("not json").is_err());
        assert!(ServerMessage::decode(r#"{"type":"unknown"}"#).is_err());
    }
}
