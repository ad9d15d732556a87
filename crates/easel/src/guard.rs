//! Content guard: cached banned-word matching over submitted prompts.

use easel_db::{DbError, EaselDb};
use easel_protocol::BannedWord;
use regex::Regex;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// How long a fetched list stays fresh. Add/remove invalidates early.
const LIST_TTL: Duration = Duration::from_secs(30);

struct CachedList {
    words: Vec<BannedWord>,
    fetched_at: Instant,
}

pub struct ContentGuard {
    db: EaselDb,
    cache: Mutex<Option<CachedList>>,
    ttl: Duration,
}

impl ContentGuard {
    pub fn new(db: EaselDb) -> Self {
        Self::with_ttl(db, LIST_TTL)
    }

    fn with_ttl(db: EaselDb, ttl: Duration) -> Self {
        Self {
            db,
            cache: Mutex::new(None),
            ttl,
        }
    }

    /// Distinct banned entries matching `text`, in stored casing.
    pub async fn check(&self, text: &str) -> Result<Vec<BannedWord>, DbError> {
        let words = self.current_list().await?;
        let lowered = text.to_lowercase();
        Ok(words
            .into_iter()
            .filter(|entry| entry_matches(entry, &lowered))
            .collect())
    }

    /// Drop the cached list after any add/remove.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    async fn current_list(&self) -> Result<Vec<BannedWord>, DbError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.words.clone());
                }
            }
        }
        let words = self.db.list_banned_words().await?;
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(CachedList {
                words: words.clone(),
                fetched_at: Instant::now(),
            });
        }
        Ok(words)
    }
}

fn entry_matches(entry: &BannedWord, lowered_text: &str) -> bool {
    let lowered_word = entry.word.to_lowercase();
    if entry.partial {
        return lowered_text.contains(&lowered_word);
    }
    let pattern = format!(r"\b{}\b", regex::escape(&lowered_word));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(lowered_text),
        Err(err) => {
            warn!("Banned word {:?} failed to compile: {err}", entry.word);
            false
        }
    }
}
