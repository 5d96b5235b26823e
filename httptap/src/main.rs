// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! The httptap CLI.
use clap::Parser;
use tracing::metadata::LevelFilter;

use std::{fs, io, path::PathBuf, sync::Arc};

use net_record::{
    ignore::IgnoreList, listener::DebugListener, PeerAddr, Recorder, RecorderConfig,
};
use tracing_subscriber::prelude::*;

mod replay;
mod script;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(clap::Parser, Debug)]
enum Command {
    /// Debug: run an event script through the recorder and print what it
    /// reconstructed
    Replay {
        /// JSON-lines event script
        file: PathBuf,
        /// Never record connections to this address. May be repeated.
        #[clap(long, value_name = "HOST:PORT", value_parser = parse_host_port)]
        ignore: Vec<PeerAddr>,
        /// Also record requests this process served
        #[clap(long)]
        server: bool,
        /// Don't record requests this process made
        #[clap(long)]
        no_client: bool,
        /// Replay independent connections on concurrent tasks
        #[clap(long)]
        parallel: bool,
        /// Log each record as soon as it is published
        #[clap(long)]
        live: bool,
        /// Print a preview of each response body
        #[clap(long)]
        bodies: bool,
    },
}

fn parse_host_port(s: &str) -> Result<PeerAddr, String> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected HOST:PORT, got {s:?}"))?;
    let port = port
        .parse()
        .map_err(|e| format!("bad port {port:?}: {e}"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok(PeerAddr::new(host, port))
}

struct ReplayOptions {
    parallel: bool,
    live: bool,
    bodies: bool,
}

fn do_replay(file: PathBuf, config: RecorderConfig, opts: ReplayOptions) -> Result<(), Error> {
    let events = script::parse(io::BufReader::new(fs::File::open(file)?))?;
    tracing::debug!(events = events.len(), "loaded script");

    let rec = Arc::new(Recorder::new(config));
    if opts.live {
        rec.records().subscribe(Arc::new(DebugListener {}));
    }

    if opts.parallel {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        rt.block_on(replay::replay_parallel(rec.clone(), events))?;
    } else {
        replay::replay(&rec, events);
    }

    for record in rec.records().snapshot() {
        let record = record.read();
        println!("{}", replay::summary(&record));
        if opts.bodies {
            println!("    {}", replay::body_line(&record));
        }
    }
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::Layer::new().without_time())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Command::parse();

    match args {
        Command::Replay {
            file,
            ignore,
            server,
            no_client,
            parallel,
            live,
            bodies,
        } => {
            let ignore = ignore
                .into_iter()
                .fold(IgnoreList::default(), |list, addr| list.add(addr));
            let config = RecorderConfig::default()
                .with_ignore(ignore)
                .record_server(server)
                .record_client(!no_client);
            do_replay(
                file,
                config,
                ReplayOptions {
                    parallel,
                    live,
                    bodies,
                },
            )?
        }
    }
    Ok(())
}
