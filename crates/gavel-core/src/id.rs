//! Snowflake identifiers for platform entities.
//!
//! Every entity the platform hands us (guilds, channels, users, roles,
//! interactions) is addressed by a 64-bit snowflake. Wrapping each kind in
//! its own newtype keeps a channel id from being passed where a role id is
//! expected, while serializing as a bare integer.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Wraps a raw snowflake.
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw snowflake.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// A guild (community). Gavel serves exactly one.
    GuildId
);
snowflake_id!(
    /// A channel inside a guild.
    ChannelId
);
snowflake_id!(
    /// A platform user.
    UserId
);
snowflake_id!(
    /// A guild role. The guild's public role shares the guild's id.
    RoleId
);
snowflake_id!(
    /// A single inbound interaction, used to address replies.
    InteractionId
);
