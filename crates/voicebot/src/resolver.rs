//! Resolves console/CLI queries to local files or direct URLs.

use std::path::{Path, PathBuf};

use voice_player::{ResolveError, Resolver, Track};

/// Accepts existing file paths (absolute, or relative to `media_dir`) and http(s) URLs.
pub struct LocalResolver {
    media_dir: Option<PathBuf>,
}

impl LocalResolver {
    pub fn new(media_dir: Option<PathBuf>) -> Self {
        Self { media_dir }
    }

    fn find_file(&self, query: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(query);
        if direct.is_file() {
            return Some(direct);
        }
        let in_library = self.media_dir.as_ref()?.join(query);
        in_library.is_file().then_some(in_library)
    }
}

impl Resolver for LocalResolver {
    fn resolve(&self, query: &str) -> Result<Track, ResolveError> {
        let query = query.trim();
        let failed = |reason: &str| ResolveError::ResolutionFailed {
            query: query.to_string(),
            reason: reason.to_string(),
        };
        if query.is_empty() {
            return Err(failed("empty query"));
        }
        if query.starts_with("http://") || query.starts_with("https://") {
            let name = query
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or(query);
            return Ok(Track::new(query).with_name(name));
        }
        let path = self
            .find_file(query)
            .ok_or_else(|| failed("no such file"))?;
        let path = path.canonicalize().unwrap_or(path);
        Ok(Track::new(format!("file://{}", path.display()))
            .with_name(display_name(&path))
            .with_path(path))
    }
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
