//! Recursive filename and content search.
//!
//! Queries are regular expressions compiled with the `regex` crate, which
//! matches in linear time, so a hostile pattern cannot stall the daemon.
//! Hidden entries are never visited. Files are scanned as lossy UTF-8, so
//! binary files are searched like text.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{stream, FutureExt, StreamExt};
use protocol::messages::{EntryKind, SearchHit, SearchMatch, SearchRequest, SearchResponse};
use regex::{Regex, RegexBuilder};
use tokio::fs;
use tracing::{debug, warn};

use super::browser::{read_children, Child};
use super::classify::classify;
use super::error::FsError;
use super::guard::PathGuard;
use super::{DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_FILE_SIZE};

/// Upper bound on the compiled size of a search pattern (1MB).
pub const PATTERN_SIZE_LIMIT: usize = 1024 * 1024;

/// Bounds applied to a single search.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    /// Results returned to the caller; `total_results` still counts all hits.
    pub max_results: usize,
    /// Content matches kept per file.
    pub max_matches_per_file: usize,
    /// Sibling entries searched at once.
    pub max_concurrency: usize,
    /// Files larger than this are matched by name only.
    pub max_file_size: u64,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_results: 100,
            max_matches_per_file: 10,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Per-search state shared by every level of the walk.
struct Query<'a> {
    pattern: Regex,
    file_types: &'a [String],
}

/// Filename and content search under the guard's root.
pub struct SearchEngine {
    guard: Arc<PathGuard>,
    limits: SearchLimits,
}

impl SearchEngine {
    /// Create a search engine with default limits.
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self {
            guard,
            limits: SearchLimits::default(),
        }
    }

    /// Replace the search limits.
    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The active limits.
    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    /// Search names and contents below `request.path`.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, FsError> {
        if request.query.is_empty() {
            return Err(FsError::InvalidArgument(
                "search query is required".to_string(),
            ));
        }

        let dir = self.guard.resolve(&request.path)?;

        let pattern = RegexBuilder::new(&request.query)
            .case_insensitive(!request.case_sensitive)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|e| FsError::InvalidArgument(format!("invalid search pattern: {}", e)))?;

        let metadata = fs::metadata(&dir)
            .await
            .map_err(|e| FsError::from_io(e, request.path.as_str()))?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(request.path.clone()));
        }

        // The top level must be readable; deeper failures are skipped.
        let children = read_children(&dir)
            .await
            .map_err(|e| FsError::from_io(e, request.path.as_str()))?;

        let query = Query {
            pattern,
            file_types: &request.file_types,
        };
        let mut results = self.search_children(children, &query).await;

        let total_results = results.len();
        results.truncate(self.limits.max_results);

        debug!(
            query = %request.query,
            path = %request.path,
            total = total_results,
            "Search complete"
        );

        Ok(SearchResponse {
            query: request.query.clone(),
            search_path: self.guard.relative(&dir),
            total_results,
            results,
        })
    }

    async fn search_children(&self, children: Vec<Child>, query: &Query<'_>) -> Vec<SearchHit> {
        stream::iter(children.into_iter().filter(|c| !c.is_hidden()))
            .map(|child| self.search_entry(child, query))
            .buffered(self.limits.max_concurrency)
            .flat_map(stream::iter)
            .collect()
            .await
    }

    fn search_dir<'a>(
        &'a self,
        dir: PathBuf,
        query: &'a Query<'a>,
    ) -> BoxFuture<'a, Vec<SearchHit>> {
        async move {
            match read_children(&dir).await {
                Ok(children) => self.search_children(children, query).await,
                Err(e) => {
                    warn!(
                        path = %self.guard.relative(&dir),
                        error = %e,
                        "Skipping unreadable directory"
                    );
                    Vec::new()
                }
            }
        }
        .boxed()
    }

    async fn search_entry(&self, child: Child, query: &Query<'_>) -> Vec<SearchHit> {
        let path = self.guard.relative(&child.path);

        if child.is_dir {
            let mut hits = Vec::new();
            if query.pattern.is_match(&child.name) {
                hits.push(SearchHit {
                    kind: EntryKind::Directory,
                    name: child.name,
                    path,
                    language: None,
                    filename_matched: true,
                    content_matches: None,
                });
            }
            hits.extend(self.search_dir(child.path, query).await);
            return hits;
        }

        let language = classify(&child.name);
        if !query.file_types.is_empty() && !query.file_types.iter().any(|t| t == language) {
            return Vec::new();
        }

        let filename_matched = query.pattern.is_match(&child.name);
        let content_matches = self.scan_file(&child.path, &query.pattern).await;

        if !filename_matched && content_matches.is_empty() {
            return Vec::new();
        }

        vec![SearchHit {
            kind: EntryKind::File,
            name: child.name,
            path,
            language: Some(language.to_string()),
            filename_matched,
            content_matches: Some(content_matches),
        }]
    }

    /// Collect content matches; unreadable, oversized or out-of-root files yield none.
    async fn scan_file(&self, path: &std::path::Path, pattern: &Regex) -> Vec<SearchMatch> {
        if !self.guard.contains(path) {
            debug!(path = %self.guard.relative(path), "Not scanning link outside root");
            return Vec::new();
        }

        match fs::metadata(path).await {
            Ok(m) if m.len() <= self.limits.max_file_size => {}
            _ => return Vec::new(),
        }

        match fs::read(path).await {
            Ok(bytes) => scan_lines(
                &String::from_utf8_lossy(&bytes),
                pattern,
                self.limits.max_matches_per_file,
            ),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable file");
                Vec::new()
            }
        }
    }
}

/// Match `pattern` against each `\n`-separated line, keeping the first `limit` hits.
pub(crate) fn scan_lines(text: &str, pattern: &Regex, limit: usize) -> Vec<SearchMatch> {
    text.split('\n')
        .enumerate()
        .filter_map(|(index, line)| {
            pattern.find(line).map(|m| SearchMatch {
                line_number: index + 1,
                line: line.trim().to_string(),
                matched: m.as_str().to_string(),
            })
        })
        .take(limit)
        .collect()
}
