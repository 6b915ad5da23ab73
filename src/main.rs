use std::process;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tupledb::{client::client_start, config::Config, server::server_start};

const USAGE: &str =
    "Usage: cargo run client|server [--listen ADDR] [--data-dir DIR] [--spaces N] [--init]";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("{}", USAGE);
        process::exit(1);
    }
    let config = match Config::from_args(&args[2..]) {
        Ok(config) => config,
        Err(e) => {
            println!("{}", e);
            println!("{}", USAGE);
            process::exit(1);
        }
    };
    match &*args[1] {
        "client" => client_start(&config)?,
        "server" => server_start(&config)?,
        _ => {
            println!("{}", USAGE);
            process::exit(1);
        }
    }
    Ok(())
}
