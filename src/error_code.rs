//! Stable error codes for field cache failures.
//!
//! Route handlers and alerting use these instead of matching on error text.
//!
//! | Prefix | Category | Description                               |
//! |--------|----------|-------------------------------------------|
//! | FC1xxx | config   | Caller or settings mistakes               |
//! | FC2xxx | upstream | The system of record (Airtable) failed    |
//! | FC3xxx | cache    | The key/value backing store failed        |
//!
//! ## Example
//!
//! ```rust
//! use field_cache::error_code::CacheErrorCode;
//!
//! let code = CacheErrorCode::CacheBackend;
//! assert_eq!(code.code(), "FC3001");
//! assert_eq!(code.name(), "CacheBackendError");
//! assert_eq!(code.alert_channel(), "cache");
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheErrorCode {
    /// FC1001: Missing key or non-positive TTL on a resource config
    InvalidConfig,
    /// FC1002: Settings file or environment could not be loaded
    Configuration,
    /// FC1003: A cache entry could not be encoded
    Serialization,
    /// FC2001: Loader rejected, timed out, or returned malformed data
    UpstreamFetch,
    /// FC3001: Backing store unreachable or protocol error
    CacheBackend,
    /// FC3002: Waiting on another instance's refresh lease took too long
    ConcurrentRefreshTimeout,
}

impl CacheErrorCode {
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig => "FC1001",
            Self::Configuration => "FC1002",
            Self::Serialization => "FC1003",
            Self::UpstreamFetch => "FC2001",
            Self::CacheBackend => "FC3001",
            Self::ConcurrentRefreshTimeout => "FC3002",
        }
    }

    /// Distinct name of every code; `from_name` inverts it.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidConfig => "InvalidConfigError",
            Self::Configuration => "ConfigurationError",
            Self::Serialization => "SerializationError",
            Self::UpstreamFetch => "UpstreamFetchError",
            Self::CacheBackend => "CacheBackendError",
            Self::ConcurrentRefreshTimeout => "ConcurrentRefreshTimeout",
        }
    }

    /// Name used in the `error` field of HTTP error bodies. Callers only tell
    /// "cache down" from "data source down", so a lease timeout reports as
    /// `CacheBackendError`; the exact code travels in the body's `code` field.
    #[inline]
    pub fn body_name(&self) -> &'static str {
        match self {
            Self::ConcurrentRefreshTimeout => Self::CacheBackend.name(),
            other => other.name(),
        }
    }

    /// Returns `"config"`, `"upstream"` or `"cache"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidConfig | Self::Configuration | Self::Serialization => "config",
            Self::UpstreamFetch => "upstream",
            Self::CacheBackend | Self::ConcurrentRefreshTimeout => "cache",
        }
    }

    /// Who gets paged: "cache down" and "data source down" go to different places.
    /// A lease timeout is reported on the cache channel.
    #[inline]
    pub fn alert_channel(&self) -> &'static str {
        match self.category() {
            "upstream" => "upstream",
            "cache" => "cache",
            _ => "app",
        }
    }

    /// HTTP status the route handlers answer with.
    #[inline]
    pub fn http_status(&self) -> u16 {
        500
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let code = match name {
            "InvalidConfigError" => Self::InvalidConfig,
            "ConfigurationError" => Self::Configuration,
            "SerializationError" => Self::Serialization,
            "UpstreamFetchError" => Self::UpstreamFetch,
            "CacheBackendError" => Self::CacheBackend,
            "ConcurrentRefreshTimeout" => Self::ConcurrentRefreshTimeout,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for CacheErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CacheErrorCode; 6] = [
        CacheErrorCode::InvalidConfig,
        CacheErrorCode::Configuration,
        CacheErrorCode::Serialization,
        CacheErrorCode::UpstreamFetch,
        CacheErrorCode::CacheBackend,
        CacheErrorCode::ConcurrentRefreshTimeout,
    ];

    #[test]
    fn names_round_trip() {
        for code in ALL {
            assert_eq!(CacheErrorCode::from_name(code.name()), Some(code));
        }
        assert_eq!(CacheErrorCode::from_name("Nope"), None);
    }

    #[test]
    fn lease_timeout_reports_as_a_backend_failure() {
        assert_eq!(CacheErrorCode::ConcurrentRefreshTimeout.body_name(), "CacheBackendError");
        assert_eq!(CacheErrorCode::ConcurrentRefreshTimeout.name(), "ConcurrentRefreshTimeout");
        for code in ALL {
            if code != CacheErrorCode::ConcurrentRefreshTimeout {
                assert_eq!(code.body_name(), code.name());
            }
        }
    }

    #[test]
    fn cache_and_upstream_alert_separately() {
        assert_eq!(CacheErrorCode::UpstreamFetch.alert_channel(), "upstream");
        assert_eq!(CacheErrorCode::CacheBackend.alert_channel(), "cache");
        assert_eq!(
            CacheErrorCode::ConcurrentRefreshTimeout.alert_channel(),
            "cache"
        );
        assert_eq!(CacheErrorCode::InvalidConfig.alert_channel(), "app");
    }
}
