//! Service configuration.

pub use crate::inject::InjectionPolicy;

use std::time::Duration;

/// Per-service SELECT result cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultCacheConfig {
    pub enabled: bool,
    /// Maximum number of cached results; `None` means unbounded.
    pub capacity: Option<usize>,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: None,
        }
    }
}

/// Options a [`Service`](crate::Service) is constructed with.
///
/// Options only apply when the registry creates the service; later
/// `get_instance` calls for the same data source reuse the existing one.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// What to do when a bound value matches an injection signature.
    pub injection_policy: InjectionPolicy,
    /// SELECT result cache.
    pub result_cache: ResultCacheConfig,
    /// Clear the result cache after every successful non-SELECT statement.
    pub invalidate_cache_on_write: bool,
    /// Emit executed statements via `tracing` (target `sqlbridge.sql`).
    pub log_statements: bool,
    /// Truncate logged SQL to this many bytes. `None` disables truncation.
    pub max_logged_sql: Option<usize>,
    /// Connect timeout handed to the native driver.
    pub connect_timeout: Option<Duration>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            injection_policy: InjectionPolicy::Reject,
            result_cache: ResultCacheConfig::default(),
            invalidate_cache_on_write: false,
            log_statements: true,
            max_logged_sql: Some(200),
            connect_timeout: None,
        }
    }
}

impl ServiceOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the injection screening policy.
    pub fn injection_policy(mut self, policy: InjectionPolicy) -> Self {
        self.injection_policy = policy;
        self
    }

    /// Bound the result cache to `cap` entries (LRU eviction).
    pub fn result_cache_capacity(mut self, cap: usize) -> Self {
        self.result_cache = ResultCacheConfig {
            enabled: cap > 0,
            capacity: Some(cap),
        };
        self
    }

    /// Disable SELECT result caching.
    pub fn no_result_cache(mut self) -> Self {
        self.result_cache.enabled = false;
        self
    }

    /// Clear cached results whenever a write succeeds.
    pub fn invalidate_cache_on_write(mut self) -> Self {
        self.invalidate_cache_on_write = true;
        self
    }

    /// Stop logging statements.
    pub fn no_statement_log(mut self) -> Self {
        self.log_statements = false;
        self
    }

    /// Set maximum SQL length to log.
    pub fn max_logged_sql(mut self, len: usize) -> Self {
        self.max_logged_sql = Some(len);
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let opts = ServiceOptions::default();
        assert_eq!(opts.injection_policy, InjectionPolicy::Reject);
        assert!(opts.result_cache.enabled);
        assert_eq!(opts.result_cache.capacity, None);
        assert!(!opts.invalidate_cache_on_write);
        assert!(opts.log_statements);
        assert_eq!(opts.max_logged_sql, Some(200));
    }

    #[test]
    fn test_options_builder() {
        let opts = ServiceOptions::new()
            .injection_policy(InjectionPolicy::Warn)
            .result_cache_capacity(32)
            .invalidate_cache_on_write()
            .connect_timeout(Duration::from_secs(5));
        assert_eq!(opts.injection_policy, InjectionPolicy::Warn);
        assert_eq!(opts.result_cache.capacity, Some(32));
        assert!(opts.invalidate_cache_on_write);
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let opts = ServiceOptions::new().result_cache_capacity(0);
        assert!(!opts.result_cache.enabled);
    }
}
