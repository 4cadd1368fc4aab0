//! Shared types for the yomi text-to-speech bot.
//!
//! This crate holds the identifiers, scopes, and voice data types that every
//! other yomi crate exchanges. It carries no behavior beyond validation and
//! string conversions, so it can sit at the bottom of the dependency graph.

pub mod voice;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use voice::{AudioFormat, Preset, PresetId, SpeechRequest, SpeechResponse};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw 64-bit value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

snowflake_id!(
    /// A guild (server) on the chat platform.
    GuildId
);
snowflake_id!(
    /// A text or voice channel.
    ChannelId
);
snowflake_id!(
    /// A platform user.
    UserId
);

/// Ownership domain of a preset assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Assignment applies to everyone in a guild.
    Guild,
    /// Assignment applies to a single user across guilds.
    User,
}

impl Scope {
    /// Returns the string label stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guild => "guild",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a scope label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scope: {0}")]
pub struct UnknownScope(pub String);

impl FromStr for Scope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guild" => Ok(Self::Guild),
            "user" => Ok(Self::User),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_round_trips_through_str() {
        for scope in [Scope::Guild, Scope::User] {
            assert_eq!(scope.as_str().parse::<Scope>(), Ok(scope));
        }
        assert_eq!(
            "channel".parse::<Scope>(),
            Err(UnknownScope("channel".to_string()))
        );
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&ChannelId(1234567890123456789)).unwrap();
        assert_eq!(json, "1234567890123456789");
        let parsed: GuildId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, GuildId(42));
    }
}
