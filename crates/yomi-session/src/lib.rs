//! Voice sessions for the yomi bot.
//!
//! A [`Session`] binds one voice channel to one reading channel. Messages
//! posted in the reading channel become [`SpeechTask`]s, which the session
//! worker synthesizes through the engine registry and the player streams
//! into the session's [`VoiceTransport`]. The [`SessionRouter`] indexes
//! live sessions and routes platform events to them, and
//! [`SessionPersistence`] keeps a lease per session so a restarted process
//! can rejoin.

pub mod error;
pub mod event;
pub mod message;
pub mod persistence;
pub mod player;
pub mod presence;
pub mod router;
pub mod session;
pub mod state;
pub mod task;
pub mod transport;

pub use error::{EnqueueError, PersistenceError, RouterError, SessionError, TransportError};
pub use event::{Attachment, Member, Mention, PlatformEvent, TextMessage};
pub use message::{prepare_segments, Announcements, MessageRules};
pub use persistence::{session_key, PersistenceConfig, RestoreSummary, SessionPersistence};
pub use player::{PlayerSource, PlayerState, TrackPlayer};
pub use presence::{is_voice_channel_empty, VoiceMember, VoiceStateCache, VoiceStates};
pub use router::{SessionObserver, SessionRouter};
pub use session::{Session, SessionConfig, SessionContext, SessionStatus};
pub use state::SessionState;
pub use task::{Speaker, SpeechTask};
pub use transport::{TransportFactory, VoiceTransport};
