// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;

use crate::environment;

#[derive(Debug, Parser)]
#[command(about = "Print version information")]
pub struct Command {
    #[arg(long, help = "Include the build's git commit hash")]
    full: bool,
}

pub fn handle(command: Command) {
    if command.full {
        print_full();
    } else {
        print();
    }
}

fn print() {
    println!("{} {}", environment::NAME, environment::VERSION);
}

fn print_full() {
    match environment::GIT_HASH {
        Some(hash) => println!("{} {} ({hash})", environment::NAME, environment::VERSION),
        None => print(),
    }
}
