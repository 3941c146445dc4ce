use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::envelope::{Envelope, GuildDescriptor, GuildSummary};

/// Which presence set an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Voice,
    Screen,
}

/// In-memory state for a guild. Guilds are never deleted and membership
/// only grows; the owner is always a member.
#[derive(Debug)]
pub struct GuildState {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub invite_code: String,
    /// Display names, insertion order. Duplicates are rejected on insert.
    pub members: Vec<String>,
    /// Stored `text` envelopes, oldest first.
    pub history: Vec<Envelope>,
    /// Display names currently in the voice channel.
    pub voice: HashSet<String>,
    /// Display names currently sharing their screen.
    pub screen: HashSet<String>,
    pub created_at: DateTime<Utc>,
}

impl GuildState {
    pub fn new(id: String, name: String, owner: String, invite_code: String) -> Self {
        Self {
            id,
            name,
            members: vec![owner.clone()],
            owner,
            invite_code,
            history: Vec::new(),
            voice: HashSet::new(),
            screen: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    /// Add a member. Idempotent — joining twice leaves one entry.
    pub fn add_member(&mut self, name: &str) {
        if !self.is_member(name) {
            self.members.push(name.to_string());
        }
    }

    /// Append a text envelope, evicting the oldest entry once `limit` is
    /// reached. A limit of zero means unbounded.
    pub fn push_history(&mut self, envelope: Envelope, limit: usize) {
        if limit > 0 && self.history.len() >= limit {
            self.history.remove(0);
        }
        self.history.push(envelope);
    }

    pub fn presence_mut(&mut self, kind: PresenceKind) -> &mut HashSet<String> {
        match kind {
            PresenceKind::Voice => &mut self.voice,
            PresenceKind::Screen => &mut self.screen,
        }
    }

    pub fn descriptor(&self) -> GuildDescriptor {
        GuildDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            invite_code: self.invite_code.clone(),
            members: self.members.clone(),
        }
    }

    pub fn summary(&self) -> GuildSummary {
        GuildSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            invite_code: self.invite_code.clone(),
        }
    }
}
