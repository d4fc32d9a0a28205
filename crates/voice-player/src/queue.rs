//! Track queue with a play cursor and an exhaust policy.
//!
//! One [`TrackQueue`] serves both ephemeral request queues ([`ExhaustPolicy::Clear`])
//! and playlist-backed queues ([`ExhaustPolicy::Wrap`]). Every operation takes the
//! queue mutex, so request handlers may mutate it while the controller is playing.

use std::sync::{Mutex, MutexGuard, PoisonError};

use voice_player_types::{ExhaustPolicy, Track};

use crate::error::QueueError;

/// Thread-safe ordered track list with a cursor.
///
/// Invariant: `current < tracks.len()` whenever the list is non-empty.
#[derive(Debug, Default)]
pub struct TrackQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    tracks: Vec<Track>,
    current: usize,
    policy: ExhaustPolicy,
}

impl TrackQueue {
    /// Empty queue with the given policy.
    pub fn new(policy: ExhaustPolicy) -> Self {
        Self::with_tracks(Vec::new(), policy)
    }

    /// Queue pre-filled with `tracks`, cursor on the first.
    pub fn with_tracks(tracks: Vec<Track>, policy: ExhaustPolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                tracks,
                current: 0,
                policy,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a track at the tail.
    pub fn append(&self, track: Track) {
        self.lock().tracks.push(track);
    }

    /// Insert a track at `index`; indices past the end append.
    ///
    /// The cursor position is left untouched, so inserting at the cursor makes the
    /// new track current for the next [`TrackQueue::current`] read.
    pub fn insert(&self, index: isize, track: Track) -> Result<(), QueueError> {
        let Ok(index) = usize::try_from(index) else {
            return Err(QueueError::InvalidIndex(index));
        };
        let mut inner = self.lock();
        if index >= inner.tracks.len() {
            inner.tracks.push(track);
        } else {
            inner.tracks.insert(index, track);
        }
        Ok(())
    }

    /// Track under the cursor plus a snapshot of the whole list.
    pub fn current(&self) -> Result<(Track, Vec<Track>), QueueError> {
        let inner = self.lock();
        if inner.tracks.is_empty() {
            return Err(QueueError::NoSongs);
        }
        match inner.tracks.get(inner.current) {
            Some(track) => Ok((track.clone(), inner.tracks.clone())),
            None => Err(QueueError::Corrupted {
                current: inner.current,
                len: inner.tracks.len(),
            }),
        }
    }

    /// Advance the cursor.
    ///
    /// Returns the new current track and whether the queue ended. Past the last
    /// track the cursor resets to 0; with [`ExhaustPolicy::Clear`] the list is dropped
    /// and `(None, true)` is returned, otherwise the first track comes back.
    pub fn skip_next(&self) -> (Option<Track>, bool) {
        let mut inner = self.lock();
        inner.current += 1;
        if inner.current >= inner.tracks.len() {
            inner.current = 0;
            if inner.policy == ExhaustPolicy::Clear {
                inner.tracks.clear();
                return (None, true);
            }
        }
        (inner.tracks.get(inner.current).cloned(), false)
    }

    /// Replace the whole list and policy, resetting the cursor.
    pub fn replace(&self, tracks: Vec<Track>, policy: ExhaustPolicy) {
        let mut inner = self.lock();
        inner.tracks = tracks;
        inner.current = 0;
        inner.policy = policy;
    }

    /// Drop every track.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.tracks.clear();
        inner.current = 0;
    }

    /// Flip between clear and wrap; returns the new policy.
    pub fn toggle_exhaust_policy(&self) -> ExhaustPolicy {
        let mut inner = self.lock();
        inner.policy = match inner.policy {
            ExhaustPolicy::Clear => ExhaustPolicy::Wrap,
            ExhaustPolicy::Wrap => ExhaustPolicy::Clear,
        };
        inner.policy
    }

    pub fn policy(&self) -> ExhaustPolicy {
        self.lock().policy
    }

    pub fn len(&self) -> usize {
        self.lock().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tracks.is_empty()
    }

    /// Ordered copy of the list.
    pub fn snapshot(&self) -> Vec<Track> {
        self.lock().tracks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track::new(id)
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(Track::id).collect()
    }

    #[test]
    fn append_preserves_insertion_order() {
        let q = TrackQueue::new(ExhaustPolicy::Clear);
        for id in ["a", "b", "c", "d"] {
            q.append(track(id));
        }
        let (current, list) = q.current().unwrap();
        assert_eq!(current.id(), "a");
        assert_eq!(ids(&list), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn current_on_empty_queue_reports_no_songs() {
        let q = TrackQueue::new(ExhaustPolicy::Wrap);
        assert_eq!(q.current().unwrap_err(), QueueError::NoSongs);
    }

    #[test]
    fn skip_next_on_single_ephemeral_track_ends_and_clears() {
        let q = TrackQueue::with_tracks(vec![track("a")], ExhaustPolicy::Clear);
        assert_eq!(q.skip_next(), (None, true));
        assert!(q.is_empty());
        assert_eq!(q.current().unwrap_err(), QueueError::NoSongs);
    }

    #[test]
    fn skip_next_on_single_playlist_track_wraps() {
        let q = TrackQueue::with_tracks(vec![track("a")], ExhaustPolicy::Wrap);
        let (next, ended) = q.skip_next();
        assert_eq!(next.map(|t| t.url), Some("a".to_string()));
        assert!(!ended);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn skip_next_moves_to_following_track() {
        let q = TrackQueue::with_tracks(vec![track("a"), track("b")], ExhaustPolicy::Clear);
        let (next, ended) = q.skip_next();
        assert_eq!(next, Some(track("b")));
        assert!(!ended);
        assert_eq!(q.current().unwrap().0, track("b"));
    }

    #[test]
    fn skip_next_on_empty_queue_ends() {
        let q = TrackQueue::new(ExhaustPolicy::Clear);
        assert_eq!(q.skip_next(), (None, true));
        let q = TrackQueue::new(ExhaustPolicy::Wrap);
        assert_eq!(q.skip_next(), (None, false));
    }

    #[test]
    fn insert_rejects_negative_index() {
        let q = TrackQueue::new(ExhaustPolicy::Clear);
        assert_eq!(q.insert(-1, track("a")), Err(QueueError::InvalidIndex(-1)));
        assert!(q.is_empty());
    }

    #[test]
    fn insert_past_end_appends() {
        let q = TrackQueue::with_tracks(vec![track("a")], ExhaustPolicy::Clear);
        q.insert(10, track("b")).unwrap();
        assert_eq!(ids(&q.snapshot()), vec!["a", "b"]);
    }

    #[test]
    fn insert_in_middle_shifts_tail() {
        let q = TrackQueue::with_tracks(vec![track("a"), track("c")], ExhaustPolicy::Clear);
        q.insert(1, track("b")).unwrap();
        assert_eq!(ids(&q.snapshot()), vec!["a", "b", "c"]);
    }

    #[test]
    fn insert_at_cursor_becomes_current() {
        let q = TrackQueue::with_tracks(vec![track("a"), track("b")], ExhaustPolicy::Clear);
        q.skip_next();
        q.insert(1, track("x")).unwrap();
        assert_eq!(q.current().unwrap().0, track("x"));
    }

    #[test]
    fn replace_resets_cursor_and_policy() {
        let q = TrackQueue::with_tracks(vec![track("a"), track("b")], ExhaustPolicy::Clear);
        q.skip_next();
        q.replace(vec![track("x"), track("y")], ExhaustPolicy::Wrap);
        assert_eq!(q.current().unwrap().0, track("x"));
        assert_eq!(q.policy(), ExhaustPolicy::Wrap);
    }

    #[test]
    fn toggle_flips_policy() {
        let q = TrackQueue::new(ExhaustPolicy::Clear);
        assert_eq!(q.toggle_exhaust_policy(), ExhaustPolicy::Wrap);
        assert_eq!(q.toggle_exhaust_policy(), ExhaustPolicy::Clear);
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let q = std::sync::Arc::new(TrackQueue::new(ExhaustPolicy::Clear));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = q.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        q.append(track(&format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.len(), 200);
    }
}
