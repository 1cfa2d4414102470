use std::process;

use clap::Parser;

use swarm_claim::color;
use swarm_claim::config::{CliArgs, Command, Config};

mod commands;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = CliArgs::parse();

    let loaded = if cli.command == Command::Init {
        Config::load_without_file(&cli)
    } else {
        Config::load(&cli)
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", color::error("error:"), e);
            process::exit(2);
        }
    };
    log::debug!("holder {} using {}", config.holder, config.claims_dir);

    let result = match cli.command {
        Command::Init => commands::cmd_init(&config, cli.config.as_deref()),
        Command::Claim { ref resource, wait } => commands::cmd_claim(&config, resource, wait),
        Command::Renew { ref resource } => commands::cmd_renew(&config, resource),
        Command::Check { ref resource } => commands::cmd_check(&config, resource),
        Command::Release { ref resource } => commands::cmd_release(&config, resource),
        Command::List => commands::cmd_list(&config),
        Command::Gc => commands::cmd_gc(&config),
        Command::NextSlot => commands::cmd_next_slot(&config),
        Command::Dispatch { ref action } => commands::cmd_dispatch(&config, action),
    };

    match result {
        Ok(exit) => process::exit(exit.code()),
        Err(e) => {
            eprintln!("{} {}", color::error("error:"), e);
            process::exit(2);
        }
    }
}
