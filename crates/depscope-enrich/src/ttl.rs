//! Freshness policy for cached latest-version lookups

use chrono::{DateTime, Duration, Utc};
use depscope_core::NpmMetaLatest;

/// Entries never expire sooner than this...
pub const MIN_TTL: Duration = Duration::hours(5);
/// ...nor later than this.
pub const MAX_TTL: Duration = Duration::days(15);

/// How long a latest-version lookup stays valid: 3% of the time since that
/// version was published, clamped to `[MIN_TTL, MAX_TTL]`. Recently
/// published packages are rechecked often, stale ones rarely.
pub fn latest_ttl(since_publish: Duration) -> Duration {
    let scaled = since_publish * 3 / 100;
    scaled.clamp(MIN_TTL, MAX_TTL)
}

/// Build a cache entry for a freshly fetched latest version.
pub fn latest_entry(
    version: String,
    published_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> NpmMetaLatest {
    let ttl = match published_at {
        Some(published) => latest_ttl(now - published),
        None => MIN_TTL,
    };
    NpmMetaLatest {
        version,
        published_at: published_at.map(|t| t.to_rfc3339()),
        fetched_at: now.to_rfc3339(),
        valid_until: (now + ttl).to_rfc3339(),
    }
}

/// An entry is fresh until its `valid_until`. Unparseable timestamps count as
/// expired.
pub fn is_fresh(entry: &NpmMetaLatest, now: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(&entry.valid_until).is_ok_and(|until| until > now)
}
