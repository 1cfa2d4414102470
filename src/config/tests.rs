use std::collections::HashMap;
use std::fs;

use super::env::{apply_env_from, CLAIMS_DIR_VAR, LEDGER_VAR, SLOT_DIR_VAR, TTL_VAR};
use super::*;
use crate::slot::Slot;
use crate::testutil::with_temp_cwd;

fn cli(args: &[&str]) -> CliArgs {
    let mut full = vec!["swarm-claim"];
    full.extend_from_slice(args);
    parse_args(full).unwrap()
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.claims_dir, DEFAULT_CLAIMS_DIR);
    assert_eq!(config.ttl_secs, 120);
    assert_eq!(config.ledger_path, DEFAULT_LEDGER_PATH);
    assert_eq!(config.slots.resource_id(1), "memory/lessons/L-001.md");
    assert_eq!(config.slot_max_attempts, 5);
    assert!(!config.holder.is_empty());
}

#[test]
fn test_parse_toml_sections() {
    let content = r#"
[leases]
dir = "shared/claims"
ttl_secs = 600

[ledger]
path = "logs/frontier.md"

[slots]
dir = "records"
prefix = "record-"
width = 0
suffix = ""
slot_type = "record"
max_attempts = 9
"#;
    let config = Config::from_toml(content).unwrap();

    assert_eq!(config.claims_dir, "shared/claims");
    assert_eq!(config.ttl_secs, 600);
    assert_eq!(config.ledger_path, "logs/frontier.md");
    assert_eq!(config.slots.resource_id(12), "records/record-12");
    assert_eq!(config.slots.slot_type, "record");
    assert_eq!(config.slot_max_attempts, 9);
}

#[test]
fn test_parse_toml_partial_keeps_defaults() {
    let config = Config::from_toml("[leases]\nttl_secs = 30\n").unwrap();
    assert_eq!(config.ttl_secs, 30);
    assert_eq!(config.claims_dir, DEFAULT_CLAIMS_DIR);
    assert_eq!(config.slots.prefix, "L-");
}

#[test]
fn test_parse_toml_ignores_unknown_keys() {
    let config = Config::from_toml("[leases]\ncolour = \"blue\"\n[extra]\nx = 1\n").unwrap();
    assert_eq!(config.ttl_secs, 120);
}

#[test]
fn test_parse_toml_invalid_value() {
    let err = Config::from_toml("[leases]\nttl_secs = \"soon\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_default_toml_round_trips() {
    let config = Config::from_toml(&Config::default_toml()).unwrap();
    let defaults = Config::default();
    assert_eq!(config.claims_dir, defaults.claims_dir);
    assert_eq!(config.ttl_secs, defaults.ttl_secs);
    assert_eq!(config.ledger_path, defaults.ledger_path);
    assert_eq!(config.slots, defaults.slots);
    assert_eq!(config.corpus_root, defaults.corpus_root);
}

#[test]
fn test_env_overrides() {
    let vars: HashMap<&str, &str> = [
        (CLAIMS_DIR_VAR, "/mnt/shared/claims"),
        (TTL_VAR, "45"),
        (LEDGER_VAR, "/mnt/shared/dispatch.md"),
        (SLOT_DIR_VAR, "notes"),
    ]
    .into_iter()
    .collect();
    let mut config = Config::default();

    apply_env_from(&mut config, |name| vars.get(name).map(|v| v.to_string()));

    assert_eq!(config.claims_dir, "/mnt/shared/claims");
    assert_eq!(config.ttl_secs, 45);
    assert_eq!(config.ledger_path, "/mnt/shared/dispatch.md");
    assert_eq!(config.slots.dir, "notes");
}

#[test]
fn test_env_ignores_unparseable_ttl() {
    let mut config = Config::default();
    apply_env_from(&mut config, |name| (name == TTL_VAR).then(|| "two minutes".to_string()));
    assert_eq!(config.ttl_secs, 120);
}

#[test]
fn test_cli_overrides_file_and_env() {
    let mut config = Config::from_toml("[leases]\nttl_secs = 600\ndir = \"file-dir\"\n").unwrap();
    apply_env_from(&mut config, |name| (name == TTL_VAR).then(|| "300".to_string()));

    config.apply_cli(&cli(&["--ttl", "15", "--holder", "S9", "list"]));

    assert_eq!(config.ttl_secs, 15);
    assert_eq!(config.claims_dir, "file-dir");
    assert_eq!(config.holder, "S9");
}

#[test]
fn test_validate_rejects_non_positive_ttl() {
    let mut config = Config::default();
    config.ttl_secs = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_validate_rejects_ttl_beyond_duration_range() {
    let config = Config::load_without_file(&cli(&["--ttl", "9223372036854775807", "check", "x"]));
    assert!(matches!(config, Err(ConfigError::Invalid(_))));

    let mut config = Config::default();
    config.ttl_secs = i64::MAX / 1000;
    assert!(config.validate().is_ok());
    assert_eq!(config.ttl().num_seconds(), i64::MAX / 1000);
}

#[test]
fn test_oversized_ttl_from_file_is_rejected_on_load() {
    with_temp_cwd(|| {
        fs::write(DEFAULT_CONFIG_FILE, "[leases]\nttl_secs = 9223372036854775807\n").unwrap();
        let err = Config::load(&cli(&["list"])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    });
}

#[test]
fn test_slot_path_is_relative_to_corpus_root() {
    let slot = Slot {
        index: 7,
        resource_id: "memory/lessons/L-007.md".to_string(),
    };
    let mut config = Config::default();
    assert_eq!(config.slot_path(&slot), std::path::PathBuf::from("memory/lessons/L-007.md"));

    config = Config::from_toml("[slots]\ncorpus_root = \"/srv/agents\"\n").unwrap();
    assert_eq!(
        config.slot_path(&slot),
        std::path::PathBuf::from("/srv/agents/memory/lessons/L-007.md")
    );
}

#[test]
fn test_load_reads_config_from_cwd() {
    with_temp_cwd(|| {
        fs::write(DEFAULT_CONFIG_FILE, "[leases]\ndir = \"from-file\"\n").unwrap();

        let config = Config::load(&cli(&["--ttl", "60", "gc"])).unwrap();

        assert_eq!(config.claims_dir, "from-file");
        assert_eq!(config.ttl_secs, 60);
    });
}

#[test]
fn test_load_missing_explicit_config_is_error() {
    with_temp_cwd(|| {
        let err = Config::load(&cli(&["--config", "nope.toml", "list"])).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    });
}

#[test]
fn test_parse_args_commands() {
    assert_eq!(
        cli(&["claim", "docs/x.md"]).command,
        Command::Claim {
            resource: "docs/x.md".to_string(),
            wait: None
        }
    );
    assert_eq!(
        cli(&["claim", "docs/x.md", "--wait", "30"]).command,
        Command::Claim {
            resource: "docs/x.md".to_string(),
            wait: Some(30)
        }
    );
    assert_eq!(cli(&["next-slot"]).command, Command::NextSlot);
    assert_eq!(
        cli(&["dispatch", "done", "F-3"]).command,
        Command::Dispatch {
            action: DispatchCommand::Done {
                unit: "F-3".to_string()
            }
        }
    );
}

#[test]
fn test_parse_args_global_flags_after_subcommand() {
    let args = cli(&["check", "r", "--dir", "elsewhere"]);
    assert_eq!(args.dir.as_deref(), Some("elsewhere"));
}

#[test]
fn test_parse_args_requires_command() {
    assert!(parse_args(["swarm-claim"]).is_err());
    assert!(parse_args(["swarm-claim", "explode"]).is_err());
}
