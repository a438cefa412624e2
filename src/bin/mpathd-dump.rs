// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{env, error::Error, path::PathBuf, sync::Arc};

use clap::{value_parser, Arg, Command};
use env_logger::Builder;
use serde_json::json;

use mpathd::{
    engine::{list_all_maps, MultipathLibrary, MultipathdLibrary, SimLibrary, Snapshot},
    mpath::VERSION,
};

fn parse_args() -> Command {
    Command::new("mpathd-dump")
        .version(VERSION)
        .about("Prints the multipath snapshot and the map identities mpathd would publish")
        .arg(
            Arg::new("sim")
                .long("sim")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Reads multipath topology from a captured multipathd reply."),
        )
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args().get_matches();

    let mut builder = Builder::new();
    if let Ok(s) = env::var("RUST_LOG") {
        builder.parse_filters(&s);
    }
    builder.init();

    let library: Arc<dyn MultipathLibrary> = match args.get_one::<PathBuf>("sim") {
        Some(capture) => Arc::new(SimLibrary::from_capture(capture)?),
        None => Arc::new(MultipathdLibrary::default()),
    };

    let snapshot = Snapshot::open(Arc::clone(&library))?;
    let records = serde_json::to_value(snapshot.records())?;
    snapshot.close();

    let identities = list_all_maps(library)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "maps": records,
            "identities": identities,
        }))?
    );
    Ok(())
}
