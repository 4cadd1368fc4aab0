use crate::error::PersistenceError;
use serde::Serialize;
use yomi_types::{ChannelId, GuildId};

/// The identity of a live session, as persisted in a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionState {
    pub guild_id: GuildId,
    pub voice_channel_id: ChannelId,
    pub reading_channel_id: ChannelId,
}

impl SessionState {
    pub const ENCODED_LEN: usize = 24;

    /// Three big-endian u64: guild, voice channel, reading channel.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..8].copy_from_slice(&self.guild_id.get().to_be_bytes());
        out[8..16].copy_from_slice(&self.voice_channel_id.get().to_be_bytes());
        out[16..24].copy_from_slice(&self.reading_channel_id.get().to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let bytes: &[u8; Self::ENCODED_LEN] = bytes
            .try_into()
            .map_err(|_| PersistenceError::InvalidRecord(bytes.len()))?;
        let word = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            u64::from_be_bytes(buf)
        };
        Ok(Self {
            guild_id: GuildId(word(0)),
            voice_channel_id: ChannelId(word(1)),
            reading_channel_id: ChannelId(word(2)),
        })
    }
}
