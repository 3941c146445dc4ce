use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol envelope exchanged between clients and the relay. One closed
/// enum covers both directions: client actions are parsed into it, and
/// everything the relay pushes or fans out is serialized from it.
///
/// Unrecognized `type` values fail to parse and are dropped by the
/// dispatcher; the connection stays open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    // ── client → relay ──────────────────────────────────────────────
    /// First envelope on every connection; claims a display name.
    Auth { username: String },

    /// Create a new guild owned by the sender.
    CreateGuild { name: String },

    /// Join a guild by invite code.
    JoinGuild { invite_code: String },

    /// Make a guild the session's active guild.
    SwitchGuild { guild_id: String },

    // ── relayed to the rest of the active guild ─────────────────────
    // `sender` and `timestamp` are stamped by the relay; client-supplied
    // values are overwritten.
    /// A text message. Stored in guild history before fan-out.
    Text {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// Sender joined the guild's voice channel.
    VoiceJoin {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },

    /// Sender left the guild's voice channel. Also sent synthetically
    /// when a session disconnects while in the voice set.
    VoiceLeave {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },

    /// Opaque voice payload. Relayed, never stored or inspected.
    VoiceData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },

    /// Sender started sharing their screen.
    ScreenStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },

    /// Sender stopped sharing. Also sent synthetically on disconnect.
    ScreenStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },

    /// Opaque screen frame. Relayed, never stored or inspected.
    ScreenFrame {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },

    // ── relay → client ──────────────────────────────────────────────
    /// Guilds visible to the session, pushed right after auth.
    GuildList { guilds: Vec<GuildSummary> },

    /// Response to `create_guild`.
    GuildCreated { guild: GuildDescriptor },

    /// Response to `join_guild`.
    GuildJoined { guild: GuildDescriptor },

    /// First snapshot after `switch_guild`: stored text envelopes, oldest first.
    MessageHistory { messages: Vec<Envelope> },

    /// Second snapshot after `switch_guild`: names currently in voice.
    VoiceState { users: Vec<String> },

    /// Third snapshot after `switch_guild`: names currently sharing.
    ScreenState { users: Vec<String> },

    /// Request-scoped failure, sent only to the offending session.
    Error { message: String },
}

impl Envelope {
    /// Short name of the envelope kind, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Auth { .. } => "auth",
            Envelope::CreateGuild { .. } => "create_guild",
            Envelope::JoinGuild { .. } => "join_guild",
            Envelope::SwitchGuild { .. } => "switch_guild",
            Envelope::Text { .. } => "text",
            Envelope::VoiceJoin { .. } => "voice_join",
            Envelope::VoiceLeave { .. } => "voice_leave",
            Envelope::VoiceData { .. } => "voice_data",
            Envelope::ScreenStart { .. } => "screen_start",
            Envelope::ScreenStop { .. } => "screen_stop",
            Envelope::ScreenFrame { .. } => "screen_frame",
            Envelope::GuildList { .. } => "guild_list",
            Envelope::GuildCreated { .. } => "guild_created",
            Envelope::GuildJoined { .. } => "guild_joined",
            Envelope::MessageHistory { .. } => "message_history",
            Envelope::VoiceState { .. } => "voice_state",
            Envelope::ScreenState { .. } => "screen_state",
            Envelope::Error { .. } => "error",
        }
    }

    /// Stamp the authenticated display name onto a relayed envelope so
    /// attribution cannot be spoofed. No-op for non-relayed kinds.
    pub fn set_sender(&mut self, name: &str) {
        match self {
            Envelope::Text { sender, .. }
            | Envelope::VoiceJoin { sender }
            | Envelope::VoiceLeave { sender }
            | Envelope::VoiceData { sender, .. }
            | Envelope::ScreenStart { sender }
            | Envelope::ScreenStop { sender }
            | Envelope::ScreenFrame { sender, .. } => *sender = Some(name.to_string()),
            _ => {}
        }
    }
}

/// Full guild descriptor, returned from create/join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildDescriptor {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub invite_code: String,
    pub members: Vec<String>,
}

/// Compact guild entry for the post-auth `guild_list` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSummary {
    pub id: String,
    pub name: String,
    pub invite_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_parses() {
        let env: Envelope = serde_json::from_str(r#"{"type":"auth","username":"alice"}"#).unwrap();
        match env {
            Envelope::Auth { username } => assert_eq!(username, "alice"),
            other => panic!("expected auth, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<Envelope>(r#"{"type":"nuke_guild"}"#).is_err());
        assert!(serde_json::from_str::<Envelope>(r#"{"username":"alice"}"#).is_err());
    }

    #[test]
    fn test_text_skips_unset_fields() {
        let env = Envelope::Text {
            content: "hi".into(),
            sender: None,
            timestamp: None,
        };
        assert_eq!(
            serde_json::to_string(&env).unwrap(),
            r#"{"type":"text","content":"hi"}"#
        );
    }

    #[test]
    fn test_stamped_text_round_trips() {
        let env = Envelope::Text {
            content: "hi".into(),
            sender: Some("alice".into()),
            timestamp: Some("12:30:45".into()),
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""sender":"alice""#));
        assert!(json.contains(r#""timestamp":"12:30:45""#));
    }

    #[test]
    fn test_opaque_payload_is_preserved() {
        let raw = r#"{"type":"voice_data","chunk":"base64==","seq":7}"#;
        let mut env: Envelope = serde_json::from_str(raw).unwrap();
        env.set_sender("alice");

        let json = serde_json::to_string(&env).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "voice_data");
        assert_eq!(value["sender"], "alice");
        assert_eq!(value["chunk"], "base64==");
        assert_eq!(value["seq"], 7);
    }

    #[test]
    fn test_presence_envelope_without_extras() {
        let env: Envelope = serde_json::from_str(r#"{"type":"voice_join"}"#).unwrap();
        match env {
            Envelope::VoiceJoin { sender } => assert!(sender.is_none()),
            other => panic!("expected voice_join, got {:?}", other),
        }
    }

    #[test]
    fn test_set_sender_ignores_server_pushes() {
        let mut env = Envelope::Error {
            message: "nope".into(),
        };
        env.set_sender("mallory");
        assert_eq!(
            serde_json::to_string(&env).unwrap(),
            r#"{"type":"error","message":"nope"}"#
        );
    }
}
