//! Runtime check configuration.
//!
//! The check level is set via the `RANGEGUARD_MODE` environment variable:
//! - `strict` (default): every access is validated and failures are logged.
//!   Range tables are trusted as published.
//! - `audited`: like strict, but every published range table is audited for
//!   sortedness and disjointness once, off the hot path.
//! - `off`: no validation. Every access is reported valid; benchmarking
//!   baseline only.
//!
//! Log sizing can be overridden with `RANGEGUARD_LOG_WORDS` and
//! `RANGEGUARD_MAX_ERRORS`.

use std::sync::OnceLock;

use crate::error_record::RECORD_WORDS;

/// Default cap on records written per context (action) per unit of work.
pub const MAX_ERRORS_PER_CONTEXT: u32 = 6;

/// Default log capacity in 32-bit words.
pub const DEFAULT_LOG_CAPACITY_WORDS: usize = 4096;

/// Default number of per-context counters.
pub const DEFAULT_CONTEXT_SLOTS: usize = 256;

/// How much checking the guard performs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckLevel {
    /// Validate every access and log failures.
    #[default]
    Strict,
    /// Strict, plus a table audit on every publish.
    Audited,
    /// Pure passthrough.
    Off,
}

impl CheckLevel {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "default" | "on" => Self::Strict,
            "audited" | "audit" | "debug" | "paranoid" => Self::Audited,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::Strict,
        }
    }

    /// Returns true if accesses are validated at all.
    #[must_use]
    pub const fn validation_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Returns true if published tables must pass [`RangeTable::audit`].
    ///
    /// [`RangeTable::audit`]: crate::range_table::RangeTable::audit
    #[must_use]
    pub const fn audits_tables(self) -> bool {
        matches!(self, Self::Audited)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Audited => "audited",
            Self::Off => "off",
        }
    }
}

/// Sizing and policy for one guard instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    pub level: CheckLevel,
    /// Records allowed per context before further failures are dropped.
    pub max_errors_per_context: u32,
    /// Error log capacity in words (not counting the exported cursor word).
    pub log_capacity_words: usize,
    /// Number of per-context counters; action ids at or above this are unscoped.
    pub context_slots: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            level: CheckLevel::Strict,
            max_errors_per_context: MAX_ERRORS_PER_CONTEXT,
            log_capacity_words: DEFAULT_LOG_CAPACITY_WORDS,
            context_slots: DEFAULT_CONTEXT_SLOTS,
        }
    }
}

impl GuardConfig {
    /// Build a config from the process environment, falling back to defaults
    /// for anything unset or unparsable. The level comes from [`check_level`],
    /// so it is fixed for the life of the process.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            level: check_level(),
            ..Self::from_lookup(|key| std::env::var(key).ok())
        }
    }

    /// Build a config from an arbitrary key lookup (testable without touching
    /// the process environment).
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let level = lookup("RANGEGUARD_MODE")
            .map(|v| CheckLevel::from_str_loose(&v))
            .unwrap_or(defaults.level);
        let max_errors_per_context = lookup("RANGEGUARD_MAX_ERRORS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.max_errors_per_context);
        let log_capacity_words = lookup("RANGEGUARD_LOG_WORDS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(defaults.log_capacity_words);
        Self {
            level,
            max_errors_per_context,
            log_capacity_words,
            context_slots: defaults.context_slots,
        }
    }

    /// Number of whole records the log can hold.
    #[must_use]
    pub const fn record_capacity(&self) -> usize {
        self.log_capacity_words / RECORD_WORDS
    }
}

static GLOBAL_LEVEL: OnceLock<CheckLevel> = OnceLock::new();

/// Get the configured check level (reads env var on first call, caches thereafter).
#[must_use]
pub fn check_level() -> CheckLevel {
    *GLOBAL_LEVEL.get_or_init(|| {
        std::env::var("RANGEGUARD_MODE")
            .map(|v| CheckLevel::from_str_loose(&v))
            .unwrap_or_default()
    })
}
