// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading as the binary does it, with process environment
//! overrides. Tests here mutate env vars and run serially.

use std::path::Path;

use serial_test::serial;

const PORT_VAR: &str = "LIVEDESK_SERVER_PORT";
const TTL_VAR: &str = "LIVEDESK_BUS_CONNECTION_TTL_SECS";

#[test]
#[serial]
fn env_overrides_reach_explicit_path_config() {
    // SAFETY: serialized with every other env-mutating test in this crate.
    unsafe { std::env::set_var(PORT_VAR, "9191") };
    let loaded = livedesk_config::load_and_validate_path(Path::new("missing-livedesk.toml"));
    unsafe { std::env::remove_var(PORT_VAR) };

    let config = loaded.expect("defaults plus env should validate");
    assert_eq!(config.server.port, 9191);
    assert_eq!(config.bus.channel, "pubsub:livechat");
}

#[test]
#[serial]
fn env_value_breaking_ping_ratio_is_rejected() {
    // ping_interval_secs defaults to 30, so a TTL under 90 is too short.
    unsafe { std::env::set_var(TTL_VAR, "60") };
    let loaded = livedesk_config::load_and_validate_path(Path::new("missing-livedesk.toml"));
    unsafe { std::env::remove_var(TTL_VAR) };

    let errors = loaded.expect_err("ttl shorter than three pings must fail");
    assert!(!errors.is_empty());
}
