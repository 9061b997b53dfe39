// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Concrete log sink selection for the `log` facade used throughout this
//! workspace's crates.
//!
//! Three environment-driven modes:
//! - default: [`env_logger`] with its usual human-readable format on
//!   stderr, filtered by `RUST_LOG` (default `info`);
//! - `EAM_DEBUG_JOURNAL=1`, or stderr not a tty and `EAM_TESTING` unset:
//!   the same sink, but each line is prefixed with the sd-daemon priority
//!   marker (`<6>`, `<3>`, ...) that systemd's own stderr-to-journal bridge
//!   recognizes and turns into the journal entry's `PRIORITY` field -
//!   see sd-daemon(3);
//! - `EAM_TESTING=1`: always plain stderr, regardless of tty detection, so
//!   integration tests get deterministic, unstructured output.

use std::io::{IsTerminal, Write};

use env_logger::Builder;

use crate::environment::{ENV_DEBUG_JOURNAL, ENV_TESTING};

/// Install the process-global logger. Idempotent only in the sense that
/// `env_logger` itself refuses a second `try_init`; callers should call
/// this exactly once, at the top of `main`.
pub fn init() {
    let testing = env_flag(ENV_TESTING);
    let journal = !testing && (env_flag(ENV_DEBUG_JOURNAL) || !std::io::stderr().is_terminal());

    let mut builder = Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if journal {
        builder.format(|buf, record| {
            let priority = journal_priority(record.level());
            writeln!(buf, "<{priority}>{}: {}", record.target(), record.args())
        });
    }

    builder.init();
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

/// Map a `log::Level` onto the syslog/sd-daemon priority scale.
fn journal_priority(level: log::Level) -> u8 {
    match level {
        log::Level::Error => 3,
        log::Level::Warn => 4,
        log::Level::Info => 6,
        log::Level::Debug | log::Level::Trace => 7,
    }
}
