// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: Option<&str> = option_env!("GIT_HASH");

/// Well-known bus name the daemon claims on the system bus.
pub const BUS_NAME: &str = "com.endlessm.AppManager";
/// Root object path advertising `Install`/`Update`/`Uninstall`/`GetUserCapabilities`.
pub const ROOT_PATH: &str = "/com/endlessm/AppManager";
/// Parent path under which each `RemoteTxn` is allocated a numbered child object.
pub const TRANSACTIONS_PATH: &str = "/com/endlessm/AppManager/Transactions";

/// How often the idle timer re-evaluates whether the daemon should shut down.
pub const IDLE_TICK: std::time::Duration = std::time::Duration::from_secs(60);

/// Environment variable forcing stderr output over journal routing, for test harnesses.
pub const ENV_TESTING: &str = "EAM_TESTING";
/// Environment variable forcing journal-flavored output even when stderr is a tty.
pub const ENV_DEBUG_JOURNAL: &str = "EAM_DEBUG_JOURNAL";
