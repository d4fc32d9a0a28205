//! Named playlists and the per-session playlist book.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use voice_player_types::Track;

use crate::error::PlaylistError;

/// A titled, categorised list of tracks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Playlist {
    pub title: String,
    pub category: String,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        tracks: Vec<Track>,
    ) -> Result<Self, PlaylistError> {
        let title = title.into();
        let category = category.into();
        if title.trim().is_empty() {
            return Err(PlaylistError::EmptyTitle);
        }
        if category.trim().is_empty() {
            return Err(PlaylistError::EmptyCategory);
        }
        Ok(Self {
            title,
            category,
            tracks,
        })
    }

    /// Shuffle tracks in place.
    pub fn shuffle(&mut self) {
        self.tracks.shuffle(&mut rand::rng());
    }
}

/// Playlists kept sorted by title, unique per title.
///
/// Reads are far more frequent than inserts, so inserts pay for a re-sort and
/// lookups binary-search.
#[derive(Debug, Default)]
pub struct PlaylistBook {
    playlists: Vec<Playlist>,
    titles: HashSet<String>,
}

impl PlaylistBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// All playlists, sorted by title.
    pub fn all(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn insert(&mut self, playlist: Playlist) -> Result<(), PlaylistError> {
        if !self.titles.insert(playlist.title.clone()) {
            return Err(PlaylistError::PlaylistExists(playlist.title));
        }
        self.playlists.push(playlist);
        self.playlists.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(())
    }

    pub fn get(&mut self, title: &str) -> Result<&Playlist, PlaylistError> {
        let index = self.position(title)?;
        Ok(&self.playlists[index])
    }

    pub fn remove(&mut self, title: &str) -> Result<Playlist, PlaylistError> {
        let index = self.position(title)?;
        self.titles.remove(title);
        Ok(self.playlists.remove(index))
    }

    fn position(&mut self, title: &str) -> Result<usize, PlaylistError> {
        if !self.titles.contains(title) {
            return Err(PlaylistError::PlaylistNotFound(title.to_string()));
        }
        match self
            .playlists
            .binary_search_by(|p| p.title.as_str().cmp(title))
        {
            Ok(index) => Ok(index),
            Err(_) => {
                tracing::error!(playlist = %title, "data integrity issue: title indexed but playlist missing");
                self.titles.remove(title);
                Err(PlaylistError::PlaylistNotFound(title.to_string()))
            }
        }
    }
}
