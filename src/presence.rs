//! Participant roster, own identity, and the playback-authority flag.
//!
//! [`Presence`] is the single source of truth for "am I the host". The
//! reconciliation engine asks it at the moment it handles a local player
//! notification, so a host handoff takes effect on the very next event.

use tracing::{debug, warn};

use crate::protocol::{Participant, ParticipantId};

/// Roster and identity state for one connection.
#[derive(Debug, Clone, Default)]
pub struct Presence {
    own_id: Option<ParticipantId>,
    is_authority: bool,
    roster: Vec<Participant>,
    roster_received: bool,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identity the server assigned to this connection.
    ///
    /// Returns `true` if the authority flag changed.
    pub fn apply_identity(&mut self, user_id: ParticipantId, is_host: bool) -> bool {
        debug!(%user_id, is_host, "identity assigned");
        self.own_id = Some(user_id);
        let changed = self.is_authority != is_host;
        self.is_authority = is_host;
        changed
    }

    /// Replace the roster wholesale.
    ///
    /// If our own entry is listed, its host bit becomes our authority flag,
    /// so a single `user_list` carries a complete handoff. Returns `true` if
    /// the authority flag changed.
    pub fn apply_user_list(&mut self, participants: Vec<Participant>) -> bool {
        let hosts = participants.iter().filter(|p| p.is_host).count();
        if hosts > 1 {
            warn!(hosts, "roster lists more than one host");
        }
        self.roster = participants;
        self.roster_received = true;

        let own_flag = self
            .own_id
            .as_ref()
            .and_then(|id| self.roster.iter().find(|p| &p.id == id))
            .map(|p| p.is_host);
        match own_flag {
            Some(flag) if flag != self.is_authority => {
                debug!(is_host = flag, "authority changed by roster update");
                self.is_authority = flag;
                true
            }
            _ => false,
        }
    }

    /// Identity known and at least one roster received.
    pub fn is_established(&self) -> bool {
        self.own_id.is_some() && self.roster_received
    }

    pub fn own_id(&self) -> Option<&ParticipantId> {
        self.own_id.as_ref()
    }

    /// Whether this participant currently holds playback authority.
    pub fn is_authority(&self) -> bool {
        self.is_authority
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// The participant currently flagged as host, if any.
    pub fn host(&self) -> Option<&Participant> {
        self.roster.iter().find(|p| p.is_host)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn participant(id: &str, is_host: bool) -> Participant {
        Participant {
            id: id.into(),
            username: format!("user-{id}"),
            is_host,
        }
    }

    #[test]
    fn established_after_identity_and_roster() {
        let mut presence = Presence::new();
        assert!(!presence.is_established());

        presence.apply_user_list(vec![participant("a", true)]);
        assert!(!presence.is_established());

        presence.apply_identity("b".into(), false);
        assert!(presence.is_established());
        assert_eq!(presence.own_id().map(String::as_str), Some("b"));
    }

    #[test]
    fn roster_replacement_transfers_authority_atomically() {
        let mut presence = Presence::new();
        presence.apply_identity("a".into(), true);
        presence.apply_user_list(vec![participant("a", true), participant("b", false)]);
        assert!(presence.is_authority());

        let changed =
            presence.apply_user_list(vec![participant("a", false), participant("b", true)]);

        assert!(changed);
        assert!(!presence.is_authority());
        assert_eq!(presence.host().map(|p| p.id.as_str()), Some("b"));
        assert_eq!(presence.roster().len(), 2);
    }

    #[test]
    fn identity_alone_sets_authority() {
        let mut presence = Presence::new();
        assert!(presence.apply_identity("a".into(), true));
        assert!(presence.is_authority());
        assert!(!presence.apply_identity("a".into(), true));
    }

    #[test]
    fn roster_without_own_entry_keeps_flag() {
        let mut presence = Presence::new();
        presence.apply_identity("a".into(), true);

        let changed = presence.apply_user_list(vec![participant("z", false)]);

        assert!(!changed);
        assert!(presence.is_authority());
        assert!(presence.roster().iter().any(|p| p.id == "z"));
    }
}
