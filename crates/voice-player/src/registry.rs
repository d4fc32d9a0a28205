//! Voice sessions keyed by guild.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use voice_player_types::Track;

use crate::config::PlayerConfig;
use crate::error::{PlaylistError, SessionError};
use crate::notify::{Notifier, notify_user};
use crate::player::Player;
use crate::playlists::{Playlist, PlaylistBook};
use crate::transport::VoiceGateway;

/// Where a session reports messages and how it joins voice.
#[derive(Clone)]
struct Binding {
    notifier: Arc<dyn Notifier>,
    gateway: Arc<dyn VoiceGateway>,
}

/// One guild's player, playlists and latest request context.
pub struct Session {
    player: Player,
    playlists: Mutex<PlaylistBook>,
    binding: Mutex<Option<Binding>>,
}

impl Session {
    pub fn new(config: PlayerConfig, playlists: PlaylistBook) -> Self {
        Self {
            player: Player::new(config),
            playlists: Mutex::new(playlists),
            binding: Mutex::new(None),
        }
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    fn book(&self) -> MutexGuard<'_, PlaylistBook> {
        self.playlists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn binding(&self) -> Option<Binding> {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Route future messages and voice joins through the latest requester.
    pub fn bind(&self, notifier: Arc<dyn Notifier>, gateway: Arc<dyn VoiceGateway>) {
        *self.binding.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Binding { notifier, gateway });
    }

    /// Queue one track and make sure playback is running.
    ///
    /// Returns whether a new playback loop was started.
    pub fn queue_single(&self, track: Track) -> Result<bool, SessionError> {
        let binding = self.binding().ok_or(SessionError::NoGateway)?;
        self.player.queue_append(track);
        Ok(self.player.start(binding.notifier, binding.gateway))
    }

    /// Replace the queue with a stored playlist and make sure playback is running.
    pub fn set_playlist(&self, title: &str) -> Result<bool, SessionError> {
        let binding = self.binding().ok_or(SessionError::NoGateway)?;
        let tracks = match self.book().get(title) {
            Ok(playlist) => playlist.tracks.clone(),
            Err(err) => {
                tracing::debug!(playlist = %title, error = %err, "set playlist failed");
                notify_user(
                    binding.notifier.as_ref(),
                    &format!("Sorry, I can't find the playlist {title:?}."),
                );
                return Err(err.into());
            }
        };
        self.player.set_queue(tracks);
        Ok(self.player.start(binding.notifier, binding.gateway))
    }

    pub fn playlists(&self) -> Vec<Playlist> {
        self.book().all().to_vec()
    }

    pub fn add_playlist(&self, playlist: Playlist) -> Result<(), PlaylistError> {
        self.book().insert(playlist)
    }

    pub fn remove_playlist(&self, title: &str) -> Result<Playlist, PlaylistError> {
        self.book().remove(title)
    }
}

/// All live sessions, addressable by guild id or generated session id.
pub struct SessionRegistry {
    config: PlayerConfig,
    seed_playlists: Vec<Playlist>,
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    guilds: HashMap<String, u64>,
    sessions: HashMap<u64, Arc<Session>>,
}

impl SessionRegistry {
    /// Registry whose new sessions start with `seed_playlists` in their book.
    pub fn new(config: PlayerConfig, seed_playlists: Vec<Playlist>) -> Self {
        Self {
            config,
            seed_playlists,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session for `guild`, created on first use, bound to the given requester.
    pub fn from_or_create(
        &self,
        guild: &str,
        notifier: Arc<dyn Notifier>,
        gateway: Arc<dyn VoiceGateway>,
    ) -> (Arc<Session>, u64) {
        let (session, id) = {
            let mut inner = self.lock();
            let existing = inner
                .guilds
                .get(guild)
                .and_then(|id| inner.sessions.get(id).map(|session| (session.clone(), *id)));
            match existing {
                Some(found) => found,
                None => {
                    let id = generate_session_id(&inner.sessions);
                    let session = Arc::new(Session::new(self.config.clone(), self.seed_book()));
                    inner.sessions.insert(id, session.clone());
                    inner.guilds.insert(guild.to_string(), id);
                    tracing::info!(guild = %guild, session = id, "session created");
                    (session, id)
                }
            }
        };
        session.bind(notifier, gateway);
        (session, id)
    }

    pub fn from_guild(&self, guild: &str) -> Result<Arc<Session>, SessionError> {
        let inner = self.lock();
        let id = inner
            .guilds
            .get(guild)
            .ok_or_else(|| SessionError::GuildNotFound(guild.to_string()))?;
        inner
            .sessions
            .get(id)
            .cloned()
            .ok_or(SessionError::NotFound(*id))
    }

    pub fn get(&self, id: u64) -> Result<Arc<Session>, SessionError> {
        self.lock()
            .sessions
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    pub fn exists(&self, id: u64) -> bool {
        self.lock().sessions.contains_key(&id)
    }

    fn seed_book(&self) -> PlaylistBook {
        let mut book = PlaylistBook::new();
        for playlist in &self.seed_playlists {
            if let Err(err) = book.insert(playlist.clone()) {
                tracing::warn!(playlist = %playlist.title, error = %err, "skipping seed playlist");
            }
        }
        book
    }
}

/// Six-digit id not yet in use.
fn generate_session_id(taken: &HashMap<u64, Arc<Session>>) -> u64 {
    let mut rng = rand::rng();
    loop {
        let id = rng.random_range(100_000..1_000_000);
        if !taken.contains_key(&id) {
            return id;
        }
    }
}
