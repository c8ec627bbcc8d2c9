use std::env;
use std::process::ExitCode;

use origin_server::error::Result;
use origin_server::prelude::*;
use origin_server::signal;

fn main() -> ExitCode {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.conf".to_string());

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    info!(
        "loaded {} server block(s) from {}",
        config.servers.len(),
        config_path
    );

    signal::install_handlers()?;

    let poll = Poll::new()?;
    let mut server = Server::new(config, &poll)?;
    server.run(poll)
}
