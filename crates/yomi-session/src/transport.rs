//! The voice connection a session plays into.

use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use yomi_audio::FrameSource;
use yomi_types::{ChannelId, GuildId};

/// A voice handle for one guild.
///
/// The transport pulls 20 ms stereo frames from the registered source while
/// it is open. Registering a new source replaces the previous one.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn open(&self, channel: ChannelId) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    fn set_frame_source(&self, source: Box<dyn FrameSource>);
}

/// Creates one transport per session.
pub trait TransportFactory: Send + Sync {
    fn create(&self, guild: GuildId, voice_channel: ChannelId) -> Arc<dyn VoiceTransport>;
}
