//! WebSocket message protocol definitions
//!
//! Every text frame carries one JSON envelope:
//!
//! ```json
//! {"id": "7", "action": "registerHostClient", "payload": {"pageName": "home", "isApp": false}}
//! ```
//!
//! ## Client → Server actions
//!
//! ```json
//! // Register as a viewer of a page
//! {"id": "1", "action": "registerWebClient", "payload": {"pageName": "home"}}
//!
//! // Register as the author of a page
//! {"id": "1", "action": "registerHostClient", "payload": {"pageName": "home", "isApp": false}}
//!
//! // Apply a command to a page's control table
//! {"id": "2", "action": "pageCommandFromHost",
//!  "payload": {"pageName": "home", "sessionID": "0", "command": "add text value=hi"}}
//!
//! // Forward a UI event to the page's host(s)
//! {"id": "", "action": "pageEventFromWeb",
//!  "payload": {"eventTarget": "btn1", "eventName": "click", "eventData": ""}}
//! ```
//!
//! ## Server → Client messages
//!
//! Responses echo the request's `id` and `action`. Pushes carry an empty `id`:
//!
//! ```json
//! {"id": "", "action": "pageEventToHost",
//!  "payload": {"pageName": "home", "sessionID": "0", "eventTarget": "btn1", "eventName": "click", "eventData": ""}}
//! {"id": "", "action": "pageUpdateToWeb",
//!  "payload": {"pageName": "home", "sessionID": "0", "controls": [...], "removed": []}}
//! {"id": "", "action": "sessionCreated", "payload": {"pageName": "dash", "sessionID": "..."}}
//! {"id": "", "action": "sessionClosed", "payload": {"pageName": "dash", "sessionID": "..."}}
//! ```

use crate::core::control::Control;
use crate::core::error::{HubError, HubResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Action names carried in the envelope's `action` field
pub mod actions {
    pub const REGISTER_WEB_CLIENT: &str = "registerWebClient";
    pub const REGISTER_HOST_CLIENT: &str = "registerHostClient";
    pub const PAGE_COMMAND_FROM_HOST: &str = "pageCommandFromHost";
    pub const PAGE_EVENT_FROM_WEB: &str = "pageEventFromWeb";
    pub const PAGE_EVENT_TO_HOST: &str = "pageEventToHost";
    pub const PAGE_UPDATE_TO_WEB: &str = "pageUpdateToWeb";
    pub const SESSION_CREATED: &str = "sessionCreated";
    pub const SESSION_CLOSED: &str = "sessionClosed";
}

/// An inbound envelope
///
/// `action` is the only required field: a frame without it is not an
/// envelope. The payload stays untyped until the action is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Decode a text frame; failure is a protocol error
    pub fn decode(frame: &str) -> HubResult<Self> {
        serde_json::from_str(frame).map_err(HubError::Protocol)
    }

    /// Interpret the payload as the request type of this envelope's action
    pub fn payload_as<T: DeserializeOwned>(&self) -> HubResult<T> {
        T::deserialize(&self.payload).map_err(HubError::InvalidPayload)
    }

    /// Encode a response correlated with this envelope
    pub fn reply<P: Serialize>(&self, payload: &P) -> HubResult<String> {
        encode(&self.id, &self.action, payload)
    }
}

#[derive(Serialize)]
struct Outbound<'a, P> {
    id: &'a str,
    action: &'a str,
    payload: &'a P,
}

/// Encode an outbound frame
pub fn encode<P: Serialize>(id: &str, action: &str, payload: &P) -> HubResult<String> {
    serde_json::to_string(&Outbound {
        id,
        action,
        payload,
    })
    .map_err(HubError::Protocol)
}

/// Encode an unsolicited push (no correlation ID)
pub fn encode_push<P: Serialize>(action: &str, payload: &P) -> HubResult<String> {
    encode("", action, payload)
}

// ── Requests ────────────────────────────────────────────────────────────

/// Payload of `registerWebClient` and `registerHostClient`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientRequest {
    pub page_name: String,
    /// Ignored for web clients
    #[serde(default)]
    pub is_app: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCommandRequest {
    pub page_name: String,
    /// Empty or `"0"` addresses a shared page's zero session
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    pub command: String,
}

/// Payload of `pageEventFromWeb`; the hub fills in page and session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageEventRequest {
    pub event_target: String,
    pub event_name: String,
    pub event_data: String,
}

// ── Responses ───────────────────────────────────────────────────────────

/// Response to either registration action: exactly one field is non-empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClientResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub error: String,
}

impl From<HubResult<String>> for RegisterClientResponse {
    fn from(result: HubResult<String>) -> Self {
        match result {
            Ok(session_id) => Self {
                session_id,
                error: String::new(),
            },
            Err(e) => Self {
                session_id: String::new(),
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCommandResponse {
    pub result: String,
    pub error: String,
}

impl From<HubResult<String>> for PageCommandResponse {
    fn from(result: HubResult<String>) -> Self {
        match result {
            Ok(result) => Self {
                result,
                error: String::new(),
            },
            Err(e) => Self {
                result: String::new(),
                error: e.to_string(),
            },
        }
    }
}

// ── Pushes ──────────────────────────────────────────────────────────────

/// `pageEventToHost`: a web event stamped with its origin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEventPush {
    pub page_name: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub event_target: String,
    pub event_name: String,
    pub event_data: String,
}

impl PageEventPush {
    pub fn new(page_name: &str, session_id: &str, event: PageEventRequest) -> Self {
        Self {
            page_name: page_name.to_string(),
            session_id: session_id.to_string(),
            event_target: event.event_target,
            event_name: event.event_name,
            event_data: event.event_data,
        }
    }
}

/// `pageUpdateToWeb`: controls changed by a host command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdatePush {
    pub page_name: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub controls: Vec<Control>,
    pub removed: Vec<String>,
}

/// `sessionCreated` / `sessionClosed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPush {
    pub page_name: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_decode_envelope() {
        let envelope = Envelope::decode(
            r#"{"id":"7","action":"registerHostClient","payload":{"pageName":"home","isApp":true}}"#,
        )
        .unwrap();

        assert_eq!(envelope.id, "7");
        assert_eq!(envelope.action, actions::REGISTER_HOST_CLIENT);

        let request: RegisterClientRequest = envelope.payload_as().unwrap();
        assert_eq!(request.page_name, "home");
        assert!(request.is_app);
    }

    #[test]
    fn test_decode_defaults_id_and_payload() {
        let envelope = Envelope::decode(r#"{"action":"somethingNew"}"#).unwrap();

        assert_eq!(envelope.id, "");
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn test_malformed_frames_are_protocol_errors() {
        for frame in ["not json", "[]", r#"{"id":"1"}"#, r#"{"action":5}"#] {
            let err = Envelope::decode(frame).unwrap_err();
            assert_eq!(err.error_code(), "PROTOCOL_ERROR", "frame: {}", frame);
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_bad_payload_is_not_fatal() {
        let envelope =
            Envelope::decode(r#"{"id":"1","action":"registerWebClient","payload":{"isApp":1}}"#)
                .unwrap();

        let err = envelope.payload_as::<RegisterClientRequest>().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PAYLOAD");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_web_client_may_omit_is_app() {
        let envelope =
            Envelope::decode(r#"{"id":"1","action":"registerWebClient","payload":{"pageName":"p"}}"#)
                .unwrap();

        let request: RegisterClientRequest = envelope.payload_as().unwrap();
        assert!(!request.is_app);
    }

    #[test]
    fn test_page_command_session_id_optional() {
        let envelope = Envelope::decode(
            r#"{"id":"2","action":"pageCommandFromHost","payload":{"pageName":"p","command":"get 0 x"}}"#,
        )
        .unwrap();

        let request: PageCommandRequest = envelope.payload_as().unwrap();
        assert_eq!(request.session_id, "");
        assert_eq!(request.command, "get 0 x");
    }

    #[test]
    fn test_reply_echoes_id_and_action() {
        let envelope = Envelope::decode(r#"{"id":"42","action":"pageCommandFromHost"}"#).unwrap();
        let response = PageCommandResponse::from(Err(HubError::PageNotFound {
            page_name: "nope".to_string(),
        }));

        let frame: Value = serde_json::from_str(&envelope.reply(&response).unwrap()).unwrap();

        assert_eq!(
            frame,
            json!({
                "id": "42",
                "action": "pageCommandFromHost",
                "payload": {"result": "", "error": "Page not found or access denied"}
            })
        );
    }

    #[test]
    fn test_register_response_fields() {
        let ok = RegisterClientResponse::from(Ok("0".to_string()));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, json!({"sessionID": "0", "error": ""}));
    }

    #[test]
    fn test_event_push_wire_names() {
        let event = PageEventRequest {
            event_target: "btn1".to_string(),
            event_name: "click".to_string(),
            event_data: String::new(),
        };
        let frame = encode_push(
            actions::PAGE_EVENT_TO_HOST,
            &PageEventPush::new("home", "0", event),
        )
        .unwrap();

        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["id"], "");
        assert_eq!(json["action"], "pageEventToHost");
        assert_eq!(
            json["payload"],
            json!({
                "pageName": "home",
                "sessionID": "0",
                "eventTarget": "btn1",
                "eventName": "click",
                "eventData": ""
            })
        );
    }

    #[test]
    fn test_update_push_carries_controls() {
        let push = PageUpdatePush {
            page_name: "home".to_string(),
            session_id: "0".to_string(),
            controls: vec![Control::new("1", "text", "0")],
            removed: vec!["2".to_string()],
        };

        let json = serde_json::to_value(&push).unwrap();
        assert_eq!(json["controls"][0]["id"], "1");
        assert_eq!(json["controls"][0]["type"], "text");
        assert_eq!(json["controls"][0]["parentID"], "0");
        assert_eq!(json["removed"], json!(["2"]));
    }
}
