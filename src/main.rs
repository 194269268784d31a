//! A small maintenance binary for file-backed stores: inspect, back up,
//! restore, sort, or wipe a store by name.
//!
//! ```text
//! larder <store> show
//! larder <store> backup [archive]
//! larder <store> restore [archive]
//! larder <store> sort
//! larder <store> wipe
//! ```

use std::env;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use larder::settings::Settings;
use larder::store::Store;
use larder::Result;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<()> {
    let (name, command) = match args {
        [name, command, ..] => (name.as_str(), command.as_str()),
        _ => {
            println!("usage: larder <store> <show|backup|restore|sort|wipe> [archive]");
            return Ok(());
        }
    };
    let settings = Settings::load()?;
    let mut store = Store::open(name, &settings)?;
    let archive = args.get(2).map(String::as_str);
    match command {
        "show" => println!("{store}"),
        "backup" => {
            let path = store.backup(archive)?;
            println!("backed up to {}", path.display());
        }
        "restore" => store.restore(archive)?,
        "sort" => store.sort(true)?,
        "wipe" => store.wipe()?,
        other => {
            println!("unknown command: {other}");
        }
    }
    Ok(())
}
