//! Configuration loading with the process environment
//!
//! These tests mutate process-wide environment variables and run serially.

mod common;

use serial_test::serial;

use tokenview::cli::{Cli, Commands};
use tokenview::config::Config;

use common::temp_config_file;

const VARS: [&str; 5] = [
    "PORT",
    "TOKENVIEW_PORT",
    "TOKENVIEW_OIDC_CLIENT_ID",
    "TOKENVIEW_OIDC_DISABLED",
    "TOKENVIEW_BUILD_TIME",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_env_overrides_file_and_cli_overrides_env() {
    clear_env();
    let (_dir, path) = temp_config_file(
        r#"
server:
  port: 4000
oidc:
  client_id: from-file
"#,
    );
    std::env::set_var("TOKENVIEW_PORT", "5000");
    std::env::set_var("TOKENVIEW_OIDC_CLIENT_ID", "from-env");

    let from_env = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();
    assert_eq!(from_env.server.port, 5000);
    assert_eq!(from_env.oidc.client_id.as_deref(), Some("from-env"));

    let cli = Cli {
        command: Commands::Serve {
            host: Some("0.0.0.0".to_string()),
            port: Some(6000),
        },
        ..Cli::default()
    };
    let from_cli = Config::load(path.to_str().unwrap(), &cli).unwrap();
    assert_eq!(from_cli.server.port, 6000);
    assert_eq!(from_cli.server.host, "0.0.0.0");

    clear_env();
}

#[test]
#[serial]
fn test_build_time_disables_oidc() {
    clear_env();
    std::env::set_var("TOKENVIEW_BUILD_TIME", "1");

    let dir = tempfile::TempDir::new().unwrap();
    let config = Config::load(
        dir.path().join("absent.yaml").to_str().unwrap(),
        &Cli::default(),
    )
    .unwrap();

    assert!(config.oidc.disabled);
    assert!(config.oidc.resolve().unwrap().is_none());

    clear_env();
}
