use std::sync::Arc;

use chrono::Local;
use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::envelope::{Envelope, GuildDescriptor, GuildSummary};
use super::guild::{GuildState, PresenceKind};
use super::session::{OutboundFrame, RelaySession, SessionId};
use super::throttle::Throttle;
use super::validation;

/// Guild ids are the first 8 hex chars of a v4 UUID.
const GUILD_ID_LENGTH: usize = 8;

/// Invite codes: 6 chars from an unambiguous uppercase alphabet.
const INVITE_CODE_LENGTH: usize = 6;
const INVITE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Text throttle: burst of 10 messages, one token back per second.
const TEXT_BURST: u32 = 10;
const TEXT_REFILL_SECS: f64 = 1.0;

/// Request-scoped engine failures. None of these is fatal to the process;
/// the transport adapter either answers the offending session with an
/// `error` envelope or drops the action silently.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid invite code")]
    InvalidInvite,
    #[error("No such guild")]
    UnknownGuild,
    #[error("Not a member of this guild")]
    NotMember,
    #[error("No active guild")]
    NoGuild,
    #[error("Session not found")]
    NotConnected,
    #[error("Rate limit exceeded. Please slow down.")]
    Throttled,
}

/// Tunables handed down from the configuration layer.
#[derive(Debug, Clone)]
pub struct RelayLimits {
    /// Frames queued per session before deliveries start dropping.
    pub outbound_queue: usize,
    /// Stored text envelopes per guild; 0 disables the cap.
    pub history_limit: usize,
    /// Maximum text content length in bytes.
    pub max_message_length: usize,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            outbound_queue: 1024,
            history_limit: 500,
            max_message_length: 4000,
        }
    }
}

/// The authoritative process-wide store: every live session, every guild,
/// and the fan-out that connects them. Transport adapters call into this;
/// the engine never touches a socket itself.
///
/// Session handlers run concurrently; every read-modify-write on a guild
/// or on the registry goes through one of these methods, which serialize
/// access per dashmap shard.
pub struct RelayEngine {
    /// All currently connected sessions, keyed by session ID.
    sessions: DashMap<SessionId, RelaySession>,
    /// All guilds ever created, keyed by guild ID. Never removed.
    guilds: DashMap<String, GuildState>,
    text_throttle: Throttle,
    limits: RelayLimits,
}

impl RelayEngine {
    pub fn new(limits: RelayLimits) -> Self {
        Self {
            sessions: DashMap::new(),
            guilds: DashMap::new(),
            text_throttle: Throttle::new(TEXT_BURST, TEXT_REFILL_SECS),
            limits,
        }
    }

    // ── Session lifecycle ───────────────────────────────────────────

    /// Register a session under a claimed display name and push its initial
    /// guild list. Returns the session ID and the receiver feeding the
    /// connection's write loop. Colliding display names are allowed.
    pub fn connect(
        &self,
        display_name: &str,
    ) -> Result<(SessionId, mpsc::Receiver<OutboundFrame>), RelayError> {
        validation::validate_display_name(display_name).map_err(RelayError::Validation)?;

        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.limits.outbound_queue);
        self.sessions.insert(
            session_id,
            RelaySession::new(session_id, display_name.to_string(), tx),
        );

        info!(%session_id, name = %display_name, total = self.sessions.len(), "session connected");

        let guilds = self.guilds_visible_to(display_name);
        self.push_to(session_id, &Envelope::GuildList { guilds });

        Ok((session_id, rx))
    }

    /// Remove a session and clean up the presence it leaves behind.
    /// Safe to call more than once; only the first call does anything.
    pub fn disconnect(&self, session_id: SessionId) {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return;
        };

        if let Some(guild_id) = &session.current_guild {
            self.clear_presence(guild_id, &session.display_name);
        }

        info!(%session_id, name = %session.display_name, total = self.sessions.len(), "session disconnected");
    }

    // ── Guild directory ─────────────────────────────────────────────

    /// Create a guild owned by the calling session. The generated id and
    /// invite code are unique among live guilds.
    pub fn create_guild(
        &self,
        session_id: SessionId,
        name: &str,
    ) -> Result<GuildDescriptor, RelayError> {
        validation::validate_guild_name(name).map_err(RelayError::Validation)?;
        let owner = self.display_name_of(session_id)?;

        let guild_id = self.fresh_guild_id();
        let invite_code = self.fresh_invite_code();
        let guild = GuildState::new(guild_id.clone(), name.to_string(), owner, invite_code);
        let descriptor = guild.descriptor();
        self.guilds.insert(guild_id.clone(), guild);

        info!(%guild_id, name = %name, owner = %descriptor.owner, "guild created");
        Ok(descriptor)
    }

    /// Join the guild carrying `invite_code` (exact, case-sensitive match).
    /// Idempotent per display name.
    pub fn join_guild(
        &self,
        session_id: SessionId,
        invite_code: &str,
    ) -> Result<GuildDescriptor, RelayError> {
        let name = self.display_name_of(session_id)?;

        let mut guild = self
            .guilds
            .iter_mut()
            .find(|g| g.invite_code == invite_code)
            .ok_or(RelayError::InvalidInvite)?;
        guild.add_member(&name);

        info!(guild_id = %guild.id, name = %name, "joined guild");
        Ok(guild.descriptor())
    }

    /// Guilds whose member list contains `name`.
    pub fn guilds_visible_to(&self, name: &str) -> Vec<GuildSummary> {
        self.guilds
            .iter()
            .filter(|g| g.is_member(name))
            .map(|g| g.summary())
            .collect()
    }

    /// Make `guild_id` the session's active guild and push the three-part
    /// snapshot in fixed order: message history, voice state, screen state.
    /// Fails without side effects unless the guild exists and the session's
    /// display name is a member.
    pub fn switch_guild(&self, session_id: SessionId, guild_id: &str) -> Result<(), RelayError> {
        let name = self.display_name_of(session_id)?;

        let (messages, voice_users, screen_users) = {
            let guild = self.guilds.get(guild_id).ok_or(RelayError::UnknownGuild)?;
            if !guild.is_member(&name) {
                return Err(RelayError::NotMember);
            }
            let mut voice: Vec<String> = guild.voice.iter().cloned().collect();
            let mut screen: Vec<String> = guild.screen.iter().cloned().collect();
            voice.sort();
            screen.sort();
            (guild.history.clone(), voice, screen)
        };

        let previous = {
            let mut session = self
                .sessions
                .get_mut(&session_id)
                .ok_or(RelayError::NotConnected)?;
            session.current_guild.replace(guild_id.to_string())
        };

        // Switching away abandons any presence left in the old guild.
        if let Some(previous) = previous.filter(|p| p != guild_id) {
            self.clear_presence(&previous, &name);
        }

        info!(%session_id, %guild_id, name = %name, "switched guild");

        self.push_to(session_id, &Envelope::MessageHistory { messages });
        self.push_to(session_id, &Envelope::VoiceState { users: voice_users });
        self.push_to(session_id, &Envelope::ScreenState { users: screen_users });
        Ok(())
    }

    // ── In-guild actions ────────────────────────────────────────────

    /// Store a text message in the active guild's history, then fan it out
    /// to the other members with server-stamped sender and `HH:MM:SS`
    /// timestamp. The history append always precedes delivery.
    pub fn send_text(&self, session_id: SessionId, content: &str) -> Result<(), RelayError> {
        let (name, guild_id) = self.active_guild_of(session_id)?;
        validation::validate_message(content, self.limits.max_message_length)
            .map_err(RelayError::Validation)?;
        if !self.text_throttle.allow(&name) {
            return Err(RelayError::Throttled);
        }

        let envelope = Envelope::Text {
            content: content.to_string(),
            sender: Some(name),
            timestamp: Some(Local::now().format("%H:%M:%S").to_string()),
        };

        {
            let mut guild = self
                .guilds
                .get_mut(&guild_id)
                .ok_or(RelayError::UnknownGuild)?;
            guild.push_history(envelope.clone(), self.limits.history_limit);
        }

        self.broadcast(Some(&guild_id), &envelope, Some(session_id));
        Ok(())
    }

    pub fn voice_join(&self, session_id: SessionId) -> Result<(), RelayError> {
        self.update_presence(session_id, PresenceKind::Voice, true)
    }

    pub fn voice_leave(&self, session_id: SessionId) -> Result<(), RelayError> {
        self.update_presence(session_id, PresenceKind::Voice, false)
    }

    pub fn screen_start(&self, session_id: SessionId) -> Result<(), RelayError> {
        self.update_presence(session_id, PresenceKind::Screen, true)
    }

    pub fn screen_stop(&self, session_id: SessionId) -> Result<(), RelayError> {
        self.update_presence(session_id, PresenceKind::Screen, false)
    }

    /// Relay an opaque media envelope (`voice_data` / `screen_frame`) to
    /// the rest of the sender's guild. Nothing is stored or inspected.
    pub fn relay_media(&self, session_id: SessionId, mut envelope: Envelope) -> Result<(), RelayError> {
        let (name, guild_id) = self.active_guild_of(session_id)?;
        envelope.set_sender(&name);
        self.broadcast(Some(&guild_id), &envelope, Some(session_id));
        Ok(())
    }

    fn update_presence(
        &self,
        session_id: SessionId,
        kind: PresenceKind,
        active: bool,
    ) -> Result<(), RelayError> {
        let (name, guild_id) = self.active_guild_of(session_id)?;

        let changed = {
            let mut guild = self
                .guilds
                .get_mut(&guild_id)
                .ok_or(RelayError::UnknownGuild)?;
            if active {
                guild.presence_mut(kind).insert(name.clone())
            } else {
                guild.presence_mut(kind).remove(&name)
            }
        };

        // Leaving a set one isn't in is a silent no-op.
        if !active && !changed {
            return Ok(());
        }

        let envelope = match (kind, active) {
            (PresenceKind::Voice, true) => Envelope::VoiceJoin { sender: Some(name) },
            (PresenceKind::Voice, false) => Envelope::VoiceLeave { sender: Some(name) },
            (PresenceKind::Screen, true) => Envelope::ScreenStart { sender: Some(name) },
            (PresenceKind::Screen, false) => Envelope::ScreenStop { sender: Some(name) },
        };
        self.broadcast(Some(&guild_id), &envelope, Some(session_id));
        Ok(())
    }

    // ── Fan-out ─────────────────────────────────────────────────────

    /// Deliver an envelope to every live session in `scope`, except
    /// `exclude`. A `Some(guild_id)` scope selects sessions whose active
    /// guild matches; `None` is ungrouped mode and reaches every live
    /// session. The recipient set is recomputed from the registry on
    /// every call; there is no cached subscriber list.
    ///
    /// The envelope is serialized once and the frame shared across
    /// recipients. Deliveries are queued without blocking, so one stalled
    /// peer cannot delay the rest; each failure is logged, counted, and
    /// never aborts the remaining deliveries. A failed recipient is left
    /// in the registry — teardown belongs to its own transport task.
    pub(crate) fn broadcast(
        &self,
        scope: Option<&str>,
        envelope: &Envelope,
        exclude: Option<SessionId>,
    ) -> usize {
        let Some(frame) = encode(envelope) else {
            return 0;
        };

        let mut failures = 0;
        for session in self.sessions.iter() {
            if let Some(guild_id) = scope
                && session.current_guild.as_deref() != Some(guild_id)
            {
                continue;
            }
            if Some(session.id) == exclude {
                continue;
            }
            if !session.send(frame.clone()) {
                failures += 1;
                warn!(session_id = %session.id, kind = envelope.kind(), "dropped frame for unreachable session");
            }
        }
        failures
    }

    /// Queue an envelope for one session (responses and snapshots).
    pub fn push_to(&self, session_id: SessionId, envelope: &Envelope) {
        let Some(frame) = encode(envelope) else {
            return;
        };
        if let Some(session) = self.sessions.get(&session_id)
            && !session.send(frame)
        {
            warn!(%session_id, kind = envelope.kind(), "failed to queue frame for session");
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Remove `name` from a guild's presence sets, telling the remaining
    /// members via a synthetic leave/stop for each set it was in.
    fn clear_presence(&self, guild_id: &str, name: &str) {
        let (was_voice, was_screen) = {
            let Some(mut guild) = self.guilds.get_mut(guild_id) else {
                return;
            };
            (guild.voice.remove(name), guild.screen.remove(name))
        };

        if was_voice {
            let envelope = Envelope::VoiceLeave {
                sender: Some(name.to_string()),
            };
            self.broadcast(Some(guild_id), &envelope, None);
        }
        if was_screen {
            let envelope = Envelope::ScreenStop {
                sender: Some(name.to_string()),
            };
            self.broadcast(Some(guild_id), &envelope, None);
        }
    }

    fn display_name_of(&self, session_id: SessionId) -> Result<String, RelayError> {
        self.sessions
            .get(&session_id)
            .map(|s| s.display_name.clone())
            .ok_or(RelayError::NotConnected)
    }

    fn active_guild_of(&self, session_id: SessionId) -> Result<(String, String), RelayError> {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(RelayError::NotConnected)?;
        let guild_id = session.current_guild.clone().ok_or(RelayError::NoGuild)?;
        Ok((session.display_name.clone(), guild_id))
    }

    fn fresh_guild_id(&self) -> String {
        loop {
            let mut id = Uuid::new_v4().simple().to_string();
            id.truncate(GUILD_ID_LENGTH);
            if !self.guilds.contains_key(&id) {
                return id;
            }
        }
    }

    /// Generate an invite code no live guild is using. Uniqueness here
    /// makes `join_guild` lookups unambiguous.
    fn fresh_invite_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..INVITE_CODE_LENGTH)
                .map(|_| INVITE_CHARSET[rng.gen_range(0..INVITE_CHARSET.len())] as char)
                .collect();
            if !self.guilds.iter().any(|g| g.invite_code == code) {
                return code;
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn encode(envelope: &Envelope) -> Option<OutboundFrame> {
    match serde_json::to_string(envelope) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(error = %e, kind = envelope.kind(), "failed to serialize envelope");
            None
        }
    }
}
