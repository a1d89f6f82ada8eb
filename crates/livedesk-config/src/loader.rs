// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! `./livedesk.toml` > `~/.config/livedesk/livedesk.toml` > `/etc/livedesk/livedesk.toml`,
//! with `LIVEDESK_*` environment variables on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LivedeskConfig;

/// System-wide config path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/livedesk/livedesk.toml";

/// Config file name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "livedesk.toml";

/// Sections an environment variable may address, as `LIVEDESK_<SECTION>_<KEY>`.
const ENV_SECTIONS: &[&str] = &[
    "server",
    "bus",
    "livechat",
    "auth",
    "agentic",
    "knowledge",
    "assignment",
    "alarm",
    "prometheus",
];

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/livedesk/livedesk.toml`
/// 3. `~/.config/livedesk/livedesk.toml`
/// 4. `./livedesk.toml`
/// 5. `LIVEDESK_*` environment variables
pub fn load_config() -> Result<LivedeskConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the defaults. No files, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<LivedeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LivedeskConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LivedeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LivedeskConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LivedeskConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// `~/.config/livedesk/livedesk.toml` on this platform.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("livedesk").join(LOCAL_CONFIG_FILE))
}

/// Env provider mapping the first `_` after a known section to a dot, so
/// `LIVEDESK_BUS_REDIS_URL` becomes `bus.redis_url`, not `bus.redis.url`.
fn env_provider() -> Env {
    Env::prefixed("LIVEDESK_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    ENV_SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("bus_redis_url"), "bus.redis_url");
        assert_eq!(map_env_key("agentic_greeting_confidence"), "agentic.greeting_confidence");
        assert_eq!(map_env_key("server_port"), "server.port");
    }

    #[test]
    fn unknown_section_passes_through() {
        assert_eq!(map_env_key("whatever_key"), "whatever_key");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("livedesk.toml", "[server]\nport = 9000\n")?;
            jail.set_env("LIVEDESK_SERVER_PORT", "9100");
            jail.set_env("LIVEDESK_BUS_REDIS_URL", "redis://cache:6379");

            let config = load_config_from_path(Path::new("livedesk.toml"))?;
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.bus.redis_url.as_deref(), Some("redis://cache:6379"));
            Ok(())
        });
    }
}
