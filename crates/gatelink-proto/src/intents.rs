//! Gateway intents bitmask.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Set of event groups the client subscribes to, sent in `Identify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(u64);

impl Intents {
    /// Guild create/update/delete and role/channel events.
    pub const GUILDS: Self = Self(1 << 0);
    /// Member add/update/remove (privileged).
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    /// Ban add/remove.
    pub const GUILD_BANS: Self = Self(1 << 2);
    /// Emoji updates.
    pub const GUILD_EMOJIS: Self = Self(1 << 3);
    /// Integration updates.
    pub const GUILD_INTEGRATIONS: Self = Self(1 << 4);
    /// Webhook updates.
    pub const GUILD_WEBHOOKS: Self = Self(1 << 5);
    /// Invite create/delete.
    pub const GUILD_INVITES: Self = Self(1 << 6);
    /// Voice state updates.
    pub const GUILD_VOICE_STATES: Self = Self(1 << 7);
    /// Presence updates (privileged).
    pub const GUILD_PRESENCES: Self = Self(1 << 8);
    /// Guild message create/update/delete.
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    /// Guild message reactions.
    pub const GUILD_MESSAGE_REACTIONS: Self = Self(1 << 10);
    /// Guild typing start.
    pub const GUILD_MESSAGE_TYPING: Self = Self(1 << 11);
    /// Direct message create/update/delete.
    pub const DIRECT_MESSAGES: Self = Self(1 << 12);
    /// Direct message reactions.
    pub const DIRECT_MESSAGE_REACTIONS: Self = Self(1 << 13);
    /// Direct message typing start.
    pub const DIRECT_MESSAGE_TYPING: Self = Self(1 << 14);

    /// No intents.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from a raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether every bit in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_intents() {
        let intents = Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::GUILD_MEMBERS;
        assert_eq!(intents.bits(), 1 | (1 << 9) | (1 << 1));
        assert!(intents.contains(Intents::GUILD_MESSAGES));
        assert!(!intents.contains(Intents::DIRECT_MESSAGES));
    }

    #[test]
    fn test_bitor_assign() {
        let mut intents = Intents::empty();
        assert!(intents.is_empty());
        intents |= Intents::GUILDS;
        assert_eq!(intents, Intents::GUILDS);
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&(Intents::GUILDS | Intents::GUILD_BANS)).unwrap();
        assert_eq!(json, "5");
        let parsed: Intents = serde_json::from_str("513").unwrap();
        assert_eq!(parsed, Intents::GUILDS | Intents::GUILD_MESSAGES);
    }
}
