//! Query-to-track resolution boundary.

use voice_player_types::Track;

use crate::error::ResolveError;

/// Turns a user query (search text or URL) into a playable [`Track`].
pub trait Resolver: Send + Sync {
    fn resolve(&self, query: &str) -> Result<Track, ResolveError>;

    /// Resolve several queries, keeping the successes and logging failures.
    fn resolve_all(&self, queries: &[String]) -> (Vec<Track>, Vec<ResolveError>) {
        let mut tracks = Vec::with_capacity(queries.len());
        let mut failures = Vec::new();
        for query in queries {
            match self.resolve(query) {
                Ok(track) => tracks.push(track),
                Err(err) => {
                    tracing::warn!(query = %query, error = %err, "resolution failed");
                    failures.push(err);
                }
            }
        }
        (tracks, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PrefixResolver;

    impl Resolver for PrefixResolver {
        fn resolve(&self, query: &str) -> Result<Track, ResolveError> {
            match query.strip_prefix("ok:") {
                Some(id) => Ok(Track::new(id)),
                None => Err(ResolveError::ResolutionFailed {
                    query: query.to_string(),
                    reason: "unknown scheme".into(),
                }),
            }
        }
    }

    #[test]
    fn resolve_all_splits_successes_and_failures() {
        let queries = vec!["ok:a".to_string(), "bad".to_string(), "ok:b".to_string()];
        let (tracks, failures) = PrefixResolver.resolve_all(&queries);
        assert_eq!(tracks, vec![Track::new("a"), Track::new("b")]);
        assert_eq!(failures.len(), 1);
    }
}
