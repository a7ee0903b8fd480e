//! Conversation log and weather cache
//!
//! A single in-memory store owned by the composition root. The cache is a
//! read-through layer in front of the weather tools: callers pick the max age
//! on every read, and stale entries stay put until an explicit sweep. The log
//! is append-only and bounded; once full, the oldest record is dropped.


use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::config::CacheConfig;

/// Store handle shared between tool handlers
pub type SharedStore = Arc<tokio::sync::Mutex<ConversationStore>>;

/// Source of the current time for cache ages and log timestamps
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[inline]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    #[inline]
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    #[inline]
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A cached tool result. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct CacheSummary<'a> {
    key: &'a str,
    #[serde(rename = "type")]
    category: &'a str,
    timestamp: DateTime<Utc>,
    age_minutes: i64,
    data_preview: String,
}

#[derive(Debug)]
pub struct ConversationStore {
    cache: BTreeMap<String, CacheEntry>,
    log: VecDeque<LogRecord>,
    log_capacity: usize,
    preview_length: usize,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    #[inline]
    pub fn new(settings: &CacheConfig) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    #[inline]
    pub fn with_clock(settings: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: BTreeMap::new(),
            log: VecDeque::new(),
            log_capacity: settings.log_capacity.max(1),
            preview_length: settings.preview_length,
            clock,
        }
    }

    /// Wrap the store for sharing across handlers
    #[inline]
    pub fn into_shared(self) -> SharedStore {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    #[inline]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Return the cached value for `key` if it is at most `max_age_minutes` old.
    ///
    /// A stale entry reads as a miss but is left in place for `sweep_expired`.
    #[inline]
    pub fn get_cached(&self, key: &str, max_age_minutes: u64) -> Option<String> {
        let entry = self.cache.get(key)?;
        let age = self.age_of(entry);

        if within_max_age(age, max_age_minutes) {
            debug!("Cache hit for {} (age {}s)", key, age.num_seconds());
            Some(entry.value.clone())
        } else {
            debug!("Cache entry for {} is stale (age {}s)", key, age.num_seconds());
            None
        }
    }

    /// Insert or overwrite the entry for `key`, stamped with the current time
    #[inline]
    pub fn put_cached(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        category: impl Into<String>,
    ) {
        let entry = CacheEntry {
            value: value.into(),
            category: category.into(),
            created_at: self.clock.now(),
        };
        self.cache.insert(key.into(), entry);
    }

    /// Remove every entry older than `max_age_minutes`; an entry exactly at the bound stays.
    #[inline]
    pub fn sweep_expired(&mut self, max_age_minutes: u64) -> usize {
        let now = self.clock.now();
        let before = self.cache.len();

        self.cache
            .retain(|_, entry| within_max_age(clamped_age(entry.created_at, now), max_age_minutes));

        let removed = before - self.cache.len();
        debug!("Swept {} expired cache entries", removed);
        removed
    }

    #[inline]
    pub fn log(&mut self, role: impl Into<String>, content: impl Into<String>) {
        if self.log.len() >= self.log_capacity {
            self.log.pop_front();
        }

        self.log.push_back(LogRecord {
            timestamp: self.clock.now(),
            role: role.into(),
            content: content.into(),
        });
    }

    /// Render the log as a JSON array, keeping only the newest `limit` records when given
    #[inline]
    pub fn render_log(&self, limit: Option<usize>) -> String {
        let skip = limit.map_or(0, |limit| self.log.len().saturating_sub(limit));
        let records: Vec<&LogRecord> = self.log.iter().skip(skip).collect();
        to_pretty_json(&records)
    }

    /// Render every cache entry with its category and current age
    #[inline]
    pub fn render_cache(&self) -> String {
        let now = self.clock.now();
        let summary: Vec<CacheSummary<'_>> = self
            .cache
            .iter()
            .map(|(key, entry)| CacheSummary {
                key,
                category: &entry.category,
                timestamp: entry.created_at,
                age_minutes: clamped_age(entry.created_at, now).num_minutes(),
                data_preview: preview(&entry.value, self.preview_length),
            })
            .collect();
        to_pretty_json(&summary)
    }

    #[inline]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    #[inline]
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    #[inline]
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.cache.get(key)
    }

    #[inline]
    pub fn records(&self) -> impl Iterator<Item = &LogRecord> {
        self.log.iter()
    }

    fn age_of(&self, entry: &CacheEntry) -> TimeDelta {
        clamped_age(entry.created_at, self.clock.now())
    }
}

/// Cache key for alerts in a state, normalized to upper case
#[inline]
pub fn alerts_cache_key(state: &str) -> String {
    format!("alerts_{}", state.trim().to_uppercase())
}

/// Cache key for a forecast, rounded to two decimal places (about 1 km)
#[inline]
pub fn forecast_cache_key(latitude: f64, longitude: f64) -> String {
    format!(
        "forecast_{}_{}",
        rounded_coordinate(latitude),
        rounded_coordinate(longitude)
    )
}

// -0.004 and 0.004 name the same place
fn rounded_coordinate(value: f64) -> String {
    let formatted = format!("{value:.2}");
    match formatted.strip_prefix('-') {
        Some(magnitude) if magnitude.bytes().all(|b| b == b'0' || b == b'.') => {
            magnitude.to_string()
        }
        _ => formatted,
    }
}

fn clamped_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
    (now - created_at).max(TimeDelta::zero())
}

fn within_max_age(age: TimeDelta, max_age_minutes: u64) -> bool {
    i64::try_from(max_age_minutes)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .is_none_or(|bound| age <= bound)
}

fn preview(value: &str, max_chars: usize) -> String {
    if value.chars().count() > max_chars {
        let mut truncated: String = value.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    } else {
        value.to_string()
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}
