//! # Runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the dispatcher, its
//! admission filters and the peer observer.
//!
//! Config is used in two ways:
//! 1. **Dispatcher creation**: `Dispatcher::builder(config, outbound)`
//! 2. **Standalone filters**: `Limit::new(config.limit)`, `Pause::new(config.pause)`, ...
//!
//! Loading and merging configuration files is left to the surrounding
//! bootstrap layer. It hands over a flat option map which
//! [`Config::from_options`] understands (durations in milliseconds):
//!
//! | key                | type | default | meaning                                  |
//! |--------------------|------|---------|------------------------------------------|
//! | `enabled`/`active` | bool | `true`  | on/off gate                              |
//! | `pauseEnabled`     | bool | `true`  | pause filter participates                |
//! | `pauseTimeout`     | i64  | `0`     | `<0` wait forever, `0` fail fast, `>0` ms |
//! | `semaphoreEnabled` | bool | `false` | limit filter participates                |
//! | `semaphoreLimit`   | i64  | `1000`  | permit pool size (`<=0` → default)        |
//! | `semaphoreTimeout` | i64  | `0`     | `0` block until free, `>0` ms             |
//! | `keepAliveTimeout` | i64  | `0`     | observer keep-alive (`<=0` → default)     |
//!
//! ## Sentinel values
//! - `pauseTimeout` and `semaphoreTimeout` are intentionally **asymmetric**:
//!   zero fails fast for the pause filter but blocks for the limit filter.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

/// Flat option map handed over by the bootstrap layer.
pub type Options = HashMap<String, Value>;

/// Default permit pool size of the limit filter.
pub const SEMAPHORE_LIMIT_DEFAULT: usize = 1000;

/// Baseline added to every keep-alive threshold to avoid flapping.
pub const KEEP_ALIVE_BASELINE: Duration = Duration::from_secs(20);

fn opt_bool(opts: &Options, key: &str) -> Option<bool> {
    opts.get(key).and_then(Value::as_bool)
}

fn opt_i64(opts: &Options, key: &str) -> Option<i64> {
    opts.get(key).and_then(Value::as_i64)
}

fn opt_str(opts: &Options, key: &str) -> Option<String> {
    opts.get(key).and_then(Value::as_str).map(str::to_string)
}

/// How the pause filter waits for its shared lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PauseWait {
    /// Wait as long as it takes (`pauseTimeout < 0`).
    Forever,
    /// Reject immediately if paused (`pauseTimeout == 0`).
    FailFast,
    /// Wait up to the given bound (`pauseTimeout > 0`).
    Bounded(Duration),
}

/// Settings of the on/off gate.
#[derive(Clone, Debug)]
pub struct OnOffConfig {
    /// Initial state of the gate.
    pub active: bool,
}

impl Default for OnOffConfig {
    fn default() -> Self {
        Self { active: true }
    }
}

impl OnOffConfig {
    /// Reads `enabled` (preferred) or `active`.
    pub fn from_options(opts: &Options) -> Self {
        let active = opt_bool(opts, "enabled")
            .or_else(|| opt_bool(opts, "active"))
            .unwrap_or(true);
        Self { active }
    }
}

/// Settings of the pause filter.
#[derive(Clone, Debug)]
pub struct PauseConfig {
    /// When `false` the filter is a passthrough.
    pub enabled: bool,

    /// Wait bound in milliseconds.
    ///
    /// - `< 0` = wait unconditionally
    /// - `0` = fail immediately while paused
    /// - `> 0` = wait up to that many milliseconds
    pub timeout_ms: i64,
}

impl Default for PauseConfig {
    /// `enabled = true`, `timeout_ms = 0` (fail fast).
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 0,
        }
    }
}

impl PauseConfig {
    /// Reads `pauseEnabled` and `pauseTimeout`.
    pub fn from_options(opts: &Options) -> Self {
        let def = Self::default();
        Self {
            enabled: opt_bool(opts, "pauseEnabled").unwrap_or(def.enabled),
            timeout_ms: opt_i64(opts, "pauseTimeout").unwrap_or(def.timeout_ms),
        }
    }

    /// Interprets `timeout_ms` as a [`PauseWait`].
    #[inline]
    pub fn wait(&self) -> PauseWait {
        match self.timeout_ms {
            t if t < 0 => PauseWait::Forever,
            0 => PauseWait::FailFast,
            t => PauseWait::Bounded(Duration::from_millis(t.unsigned_abs())),
        }
    }
}

/// Settings of the bounded-concurrency filter.
#[derive(Clone, Debug)]
pub struct LimitConfig {
    /// Disabled by default; when `false` the filter is a passthrough.
    pub enabled: bool,

    /// Size of the permit pool.
    pub limit: usize,

    /// Wait bound for a permit (`0s` = block until one is free).
    pub timeout: Duration,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: SEMAPHORE_LIMIT_DEFAULT,
            timeout: Duration::ZERO,
        }
    }
}

impl LimitConfig {
    /// Reads `semaphoreEnabled`, `semaphoreLimit` and `semaphoreTimeout`.
    ///
    /// Non-positive limits fall back to [`SEMAPHORE_LIMIT_DEFAULT`];
    /// non-positive timeouts mean "block".
    pub fn from_options(opts: &Options) -> Self {
        let limit = match opt_i64(opts, "semaphoreLimit") {
            Some(n) if n > 0 => usize::try_from(n).unwrap_or(SEMAPHORE_LIMIT_DEFAULT),
            _ => SEMAPHORE_LIMIT_DEFAULT,
        };
        let timeout = match opt_i64(opts, "semaphoreTimeout") {
            Some(ms) if ms > 0 => Duration::from_millis(ms.unsigned_abs()),
            _ => Duration::ZERO,
        };
        Self {
            enabled: opt_bool(opts, "semaphoreEnabled").unwrap_or(false),
            limit,
            timeout,
        }
    }

    /// Returns the permit wait bound as an `Option`.
    ///
    /// - `None` → block until a permit is free
    /// - `Some(d)` → give up after `d`
    #[inline]
    pub fn permit_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }
}

/// Settings of the peer observer.
#[derive(Clone, Debug)]
pub struct ObserverConfig {
    /// Requested keep-alive timeout (`0s` = default threshold).
    ///
    /// The effective threshold is always inflated by [`KEEP_ALIVE_BASELINE`],
    /// see [`ObserverConfig::keep_alive_threshold`].
    pub keep_alive_timeout: Duration,

    /// Protocol version a compatible responder advertises.
    pub protocol_version: String,

    /// Whether responders that advertise no version (legacy headers) are compatible.
    pub legacy_header_enabled: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            keep_alive_timeout: Duration::ZERO,
            protocol_version: "1".to_string(),
            legacy_header_enabled: false,
        }
    }
}

impl ObserverConfig {
    /// Reads `keepAliveTimeout`, `protocolVersion` and `legacyHeaderEnabled`.
    pub fn from_options(opts: &Options) -> Self {
        let def = Self::default();
        let keep_alive_timeout = match opt_i64(opts, "keepAliveTimeout") {
            Some(ms) if ms > 0 => Duration::from_millis(ms.unsigned_abs()),
            _ => def.keep_alive_timeout,
        };
        Self {
            keep_alive_timeout,
            protocol_version: opt_str(opts, "protocolVersion").unwrap_or(def.protocol_version),
            legacy_header_enabled: opt_bool(opts, "legacyHeaderEnabled")
                .unwrap_or(def.legacy_header_enabled),
        }
    }

    /// Effective keep-alive threshold.
    ///
    /// - `0s` → `2 × baseline`
    /// - `t > 0` → `baseline + min(baseline, t)`
    #[inline]
    pub fn keep_alive_threshold(&self) -> Duration {
        keep_alive_threshold(self.keep_alive_timeout)
    }
}

/// Inflates a requested keep-alive timeout by [`KEEP_ALIVE_BASELINE`].
pub(crate) fn keep_alive_threshold(requested: Duration) -> Duration {
    if requested.is_zero() {
        KEEP_ALIVE_BASELINE * 2
    } else {
        KEEP_ALIVE_BASELINE + requested.min(KEEP_ALIVE_BASELINE)
    }
}

/// Global configuration for the dispatcher runtime.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `omit_internal_logs`: mute request logs for routines with scope `"internal"`
/// - `onoff`, `pause`, `limit`: admission filter settings
/// - `observer`: peer observer settings
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Mute per-request logs of `"internal"` routines (pings and the like).
    ///
    /// Defaults to `true` unless `RPCVISOR_OMIT_PING_LOGS=false`.
    pub omit_internal_logs: bool,

    /// On/off gate settings.
    pub onoff: OnOffConfig,
    /// Pause filter settings.
    pub pause: PauseConfig,
    /// Limit filter settings.
    pub limit: LimitConfig,
    /// Peer observer settings.
    pub observer: ObserverConfig,
}

impl Config {
    /// Builds a config from the flat option map; missing keys keep defaults.
    pub fn from_options(opts: &Options) -> Self {
        let def = Self::default();
        Self {
            bus_capacity: opt_i64(opts, "busCapacity")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(def.bus_capacity),
            omit_internal_logs: opt_bool(opts, "omitInternalLogs").unwrap_or(def.omit_internal_logs),
            onoff: OnOffConfig::from_options(opts),
            pause: PauseConfig::from_options(opts),
            limit: LimitConfig::from_options(opts),
            observer: ObserverConfig::from_options(opts),
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - pause enabled and failing fast, limit disabled with 1000 permits
    /// - observer keep-alive threshold `40s`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            omit_internal_logs: omit_internal_logs_from_env(),
            onoff: OnOffConfig::default(),
            pause: PauseConfig::default(),
            limit: LimitConfig::default(),
            observer: ObserverConfig::default(),
        }
    }
}

fn omit_internal_logs_from_env() -> bool {
    std::env::var("RPCVISOR_OMIT_PING_LOGS").map_or(true, |v| v != "false")
}
