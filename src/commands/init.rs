use std::fs;
use std::path::Path;

use swarm_claim::config::{Config, DEFAULT_CONFIG_FILE};

use super::Exit;

/// Write a default config file and create the claims directory.
pub fn cmd_init(config: &Config, config_path: Option<&str>) -> Result<Exit, String> {
    println!("Initializing swarm-claim...");

    let config_path = Path::new(config_path.unwrap_or(DEFAULT_CONFIG_FILE));
    if config_path.exists() {
        println!("  Config already exists: {}", config_path.display());
    } else {
        fs::write(config_path, Config::default_toml())
            .map_err(|e| format!("failed to create {}: {}", config_path.display(), e))?;
        println!("  Created {}", config_path.display());
    }

    fs::create_dir_all(&config.claims_dir)
        .map_err(|e| format!("failed to create claims dir {}: {}", config.claims_dir, e))?;
    println!("  Created claims directory: {}", config.claims_dir);
    println!("  Holder for this shell: {}", config.holder);

    Ok(Exit::Success)
}
