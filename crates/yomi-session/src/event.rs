use serde::Deserialize;
use yomi_types::{ChannelId, GuildId, UserId};

/// A guild member as seen in an event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    pub filename: String,
}

/// A user mention inside message content, `<@id>` or `<@!id>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Mention {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextMessage {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author: Member,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

/// Events delivered by the chat platform gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    MessageCreated(TextMessage),
    VoiceStateUpdate {
        guild_id: GuildId,
        member: Member,
        before: Option<ChannelId>,
        after: Option<ChannelId>,
    },
}
