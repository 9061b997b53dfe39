// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::error::Error as _;
use std::process::ExitCode;

fn main() -> ExitCode {
    eam::logging::init();
    let _guard = eam::runtime::init();

    match eam::runtime::block_on(eam::run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            match chain(&error) {
                Some(rest) => eprintln!("{error} failed: {rest}"),
                None => eprintln!("{error} failed"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Join every error in `error`'s source chain (but not `error` itself, which
/// the caller already printed as the "<operation> failed" lead-in) with ": ".
fn chain(error: &eam::Error) -> Option<String> {
    let mut messages = Vec::new();
    let mut source = error.source();
    while let Some(error) = source {
        messages.push(error.to_string());
        source = error.source();
    }
    if messages.is_empty() {
        None
    } else {
        Some(messages.join(": "))
    }
}
