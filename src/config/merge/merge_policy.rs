//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources win key by key; tables merge rather than replace.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.root", ".genloom")?
        .set_default("scheduler.max_concurrency", 4)?
        .set_default("rate_limit.calls", 10)?
        .set_default("rate_limit.window_secs", 60)
}
