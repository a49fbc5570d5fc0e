//! Wire message types exchanged with the host
//!
//! Outbound traffic is always an [`Envelope`]. Inbound payloads are decoded
//! once, at the boundary, into an [`InboundMessage`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Value of the `api` field on every envelope
pub const API_NAME: &str = "component";

/// Handshake action pushed by the host
pub const ACTION_REGISTERED: &str = "component-registered";

/// Theme push action
pub const ACTION_THEMES: &str = "themes";

/// Correlation identifier of one outbound envelope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an existing identifier string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A permission the component asks the host for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_types: Option<Vec<String>>,
}

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_types: None,
        }
    }
}

/// One outbound protocol message
///
/// Callbacks never travel with the envelope; they live in the correlation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub action: String,
    pub data: Option<Value>,
    pub message_id: MessageId,
    pub session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<Permission>>,
    pub api: String,
}

/// Environment descriptor delivered with the handshake
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub platform: Option<String>,

    /// The host's identifier for this component
    #[serde(default)]
    pub uuid: Option<String>,

    #[serde(default, deserialize_with = "theme_urls")]
    pub active_theme_urls: Option<Vec<String>>,

    /// Anything else the host sends along
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Handshake payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub session_key: Option<String>,

    #[serde(default)]
    pub component_data: Option<Map<String, Value>>,

    #[serde(default)]
    pub data: Option<Environment>,
}

/// Reference back to the call a reply answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalRef {
    pub message_id: MessageId,
}

/// Correlated reply payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub original: OriginalRef,

    #[serde(default)]
    pub data: Value,
}

/// Decode a theme URL list, keeping only non-empty strings
///
/// A `null` entry must not fail the whole handshake or theme push.
fn theme_urls<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|entries| {
        entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(url) if !url.is_empty() => Some(url),
                _ => None,
            })
            .collect()
    }))
}

#[derive(Debug, Deserialize)]
struct ThemesData {
    #[serde(default, deserialize_with = "theme_urls")]
    themes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ThemesPush {
    #[serde(default)]
    data: Option<ThemesData>,
}

/// Inbound message, classified by kind
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Session handshake
    Registered(Registration),

    /// Desired theme set
    Themes(Vec<String>),

    /// Answer to one of our calls
    Reply(Reply),

    /// Action this core does not handle
    Unrecognized { action: Option<String> },
}

impl InboundMessage {
    /// Classify a decoded payload
    ///
    /// Handshake first, then theme push, then anything carrying `original`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let action = value.get("action").and_then(Value::as_str).map(str::to_owned);

        match action.as_deref() {
            Some(ACTION_REGISTERED) => Ok(Self::Registered(serde_json::from_value(value)?)),
            Some(ACTION_THEMES) => {
                let push: ThemesPush = serde_json::from_value(value)?;
                let themes = push.data.and_then(|d| d.themes).unwrap_or_default();
                Ok(Self::Themes(themes))
            }
            _ if value.get("original").is_some_and(|o| !o.is_null()) => Ok(Self::Reply(serde_json::from_value(value)?)),
            _ => Ok(Self::Unrecognized { action }),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registered(_) => "registered",
            Self::Themes(_) => "themes",
            Self::Reply(_) => "reply",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serialize_shape() {
        let envelope = Envelope {
            action: "stream-context-item".to_string(),
            data: None,
            message_id: MessageId::from_string("id-1"),
            session_key: Some("key".to_string()),
            permissions: None,
            api: API_NAME.to_string(),
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "stream-context-item",
                "data": null,
                "messageId": "id-1",
                "sessionKey": "key",
                "api": "component"
            })
        );
    }

    #[test]
    fn test_envelope_with_permissions() {
        let envelope = Envelope {
            action: "save-items".to_string(),
            data: Some(json!({"items": []})),
            message_id: MessageId::from_string("id-2"),
            session_key: None,
            permissions: Some(vec![Permission::new("stream-items")]),
            api: API_NAME.to_string(),
        };

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""permissions":[{"name":"stream-items"}]"#));
        assert!(json.contains(r#""sessionKey":null"#));
    }

    #[test]
    fn test_classify_handshake() {
        let msg = InboundMessage::from_value(json!({
            "action": "component-registered",
            "sessionKey": "abc",
            "componentData": {"mode": "org"},
            "data": {
                "environment": "desktop",
                "platform": "linux",
                "uuid": "comp-1",
                "activeThemeUrls": ["https://a/theme.css"],
                "hostVersion": "3.1"
            }
        }))
        .unwrap();

        let InboundMessage::Registered(reg) = msg else {
            panic!("Wrong variant");
        };
        assert_eq!(reg.session_key.as_deref(), Some("abc"));
        assert_eq!(reg.component_data.unwrap()["mode"], "org");
        let env = reg.data.unwrap();
        assert_eq!(env.environment.as_deref(), Some("desktop"));
        assert_eq!(env.uuid.as_deref(), Some("comp-1"));
        assert_eq!(env.active_theme_urls.unwrap(), vec!["https://a/theme.css"]);
        assert_eq!(env.extra["hostVersion"], "3.1");
    }

    #[test]
    fn test_classify_themes() {
        let msg = InboundMessage::from_value(json!({"action": "themes", "data": {"themes": ["a", "b"]}})).unwrap();
        assert_eq!(msg, InboundMessage::Themes(vec!["a".to_string(), "b".to_string()]));

        let msg = InboundMessage::from_value(json!({"action": "themes", "data": {"themes": null}})).unwrap();
        assert_eq!(msg, InboundMessage::Themes(Vec::new()));
    }

    #[test]
    fn test_null_theme_urls_are_skipped() {
        let msg = InboundMessage::from_value(json!({
            "action": "component-registered",
            "sessionKey": "k",
            "data": {"activeThemeUrls": ["https://a.css", null, ""]}
        }))
        .unwrap();
        let InboundMessage::Registered(reg) = msg else {
            panic!("Wrong variant");
        };
        assert_eq!(reg.data.unwrap().active_theme_urls.unwrap(), vec!["https://a.css"]);

        let msg = InboundMessage::from_value(json!({"action": "themes", "data": {"themes": [null, "b", 7]}})).unwrap();
        assert_eq!(msg, InboundMessage::Themes(vec!["b".to_string()]));
    }

    #[test]
    fn test_classify_reply() {
        let msg = InboundMessage::from_value(json!({
            "action": "reply",
            "original": {"messageId": "m-9", "action": "stream-items"},
            "data": {"items": []}
        }))
        .unwrap();

        let InboundMessage::Reply(reply) = msg else {
            panic!("Wrong variant");
        };
        assert_eq!(reply.original.message_id.as_str(), "m-9");
        assert_eq!(reply.data, json!({"items": []}));
    }

    #[test]
    fn test_handshake_wins_over_original() {
        let msg = InboundMessage::from_value(json!({
            "action": "component-registered",
            "sessionKey": "k",
            "original": {"messageId": "x"}
        }))
        .unwrap();
        assert_eq!(msg.kind(), "registered");
    }

    #[test]
    fn test_classify_unrecognized() {
        let msg = InboundMessage::from_value(json!({"action": "something-else"})).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Unrecognized {
                action: Some("something-else".to_string())
            }
        );
        assert_eq!(msg.kind(), "unrecognized");
    }

    #[test]
    fn test_reply_without_message_id_is_error() {
        let result = InboundMessage::from_value(json!({"original": {"action": "x"}}));
        assert!(result.is_err());
    }
}
