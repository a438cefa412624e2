// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    env,
    error::Error,
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{value_parser, Arg, ArgMatches, Command};
use env_logger::Builder;
use log::LevelFilter;
use nix::{
    fcntl::{Flock, FlockArg},
    unistd::getpid,
};

use mpathd::mpath::{run, MpathError, MpathResult, RunConfig, MPATHD_PID_PATH, VERSION};

fn parse_args() -> Command {
    Command::new("mpathd")
        .version(VERSION)
        .about("Publishes the multipath topology on D-Bus")
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Sets level for generation of log messages."),
        )
        .arg(
            Arg::new("sim")
                .long("sim")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Reads multipath topology from a captured multipathd reply."),
        )
        .arg(
            Arg::new("multipathd_timeout")
                .long("multipathd-timeout")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Sets the timeout for requests to multipathd in milliseconds."),
        )
}

/// To ensure only one instance of mpathd runs at a time, acquire an
/// exclusive lock. Return an error if lock attempt fails.
fn trylock_pid_file() -> MpathResult<Flock<File>> {
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(MPATHD_PID_PATH)
        .map_err(|err| {
            MpathError::Chained(
                format!("Failed to create or open the mpathd PID file at {MPATHD_PID_PATH}"),
                Box::new(MpathError::from(err)),
            )
        })?;
    match Flock::lock(f, FlockArg::LockExclusiveNonblock) {
        Ok(mut f) => {
            f.set_len(0)?;
            f.write_all(getpid().to_string().as_bytes())?;
            Ok(f)
        }
        Err((mut f, _)) => {
            let mut buf = String::new();

            if f.read_to_string(&mut buf).is_err() {
                buf = "<unreadable>".to_string();
            }

            Err(MpathError::Msg(format!(
                "Daemon already running with supposed pid: {buf}"
            )))
        }
    }
}

fn init_logger(args: &ArgMatches) {
    let mut builder = Builder::new();
    if let Some(log_level) = args.get_one::<String>("log_level") {
        builder.filter(
            Some("mpathd"),
            LevelFilter::from_str(log_level)
                .expect("argument parser only accepts valid log levels"),
        );
    } else if let Ok(s) = env::var("RUST_LOG") {
        builder.parse_filters(&s);
    }
    builder.init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args().get_matches();

    let _mpathd_file = trylock_pid_file()?;

    init_logger(&args);

    let mut config = RunConfig {
        sim: args.get_one::<PathBuf>("sim").cloned(),
        ..Default::default()
    };
    if let Some(ms) = args.get_one::<u64>("multipathd_timeout") {
        config.multipathd_timeout = Duration::from_millis(*ms);
    }

    run(config)?;
    Ok(())
}
