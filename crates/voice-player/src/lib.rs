pub mod config;
mod controller;
pub mod decode;
pub mod error;
pub mod notify;
pub mod ogg;
pub mod player;
pub mod playlists;
pub mod queue;
pub mod registry;
pub mod resolve;
pub mod signal;
pub mod transport;

pub use config::{DecoderCommand, PlayerConfig};
pub use decode::Frame;
pub use error::{
    DecodeError, OggError, PlaybackError, PlaylistError, QueueError, ResolveError, SessionError,
    TransportError,
};
pub use notify::{Notifier, NotifyError};
pub use player::Player;
pub use playlists::{Playlist, PlaylistBook};
pub use queue::TrackQueue;
pub use registry::{Session, SessionRegistry};
pub use resolve::Resolver;
pub use signal::{CancelToken, ControlSignal, SignalSlot};
pub use transport::{TransportExit, TransportStage, VoiceConnection, VoiceGateway};
pub use voice_player_types::{
    ExhaustPolicy, PlaybackEndReason, PlayerState, PlayerStatus, Track,
};
