// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::path::PathBuf;

use clap::builder::ValueHint;
use clap_derive::Parser;
use eyre::WrapErr;
use figment::Figment;
use figment::providers::{Format, Json, Serialized};
use tracing::info;

use fen_kernel::config::Config;

#[derive(Parser, Debug)]
pub struct Args {
    #[arg(
        short,
        long,
        value_name = "config",
        help = "Path to the configuration (json) file. Created with defaults if missing.",
        value_hint = ValueHint::FilePath,
        default_value = "fen-config.json"
    )]
    pub config_file: PathBuf,

    #[arg(
        long,
        value_name = "verbs-dir",
        help = "Directory tree holding verb source files (one .verb file per verb)",
        value_hint = ValueHint::DirPath,
        default_value = "world/verbs"
    )]
    pub verbs_dir: PathBuf,

    #[arg(
        long,
        value_name = "functions-dir",
        help = "Directory tree holding function source files (one .func file per function)",
        value_hint = ValueHint::DirPath,
        default_value = "world/functions"
    )]
    pub functions_dir: PathBuf,

    #[arg(
        long,
        value_name = "telnet-port",
        help = "Override the telnet listener port from the config file"
    )]
    pub telnet_port: Option<u16>,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}

/// Defaults, then the config file, then command-line overrides. A missing
/// file is written out with the defaults first so operators have something
/// to edit. Any malformed or unknown key is fatal.
pub fn load_config(args: &Args) -> Result<Config, eyre::Error> {
    if !args.config_file.exists() {
        let defaults = serde_json::to_string_pretty(&Config::default())
            .expect("default config serialization cannot fail");
        std::fs::write(&args.config_file, defaults).wrap_err_with(|| {
            format!(
                "unable to write default config to {}",
                args.config_file.display()
            )
        })?;
        info!(path = %args.config_file.display(), "Wrote default configuration");
    }

    let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Json::file(&args.config_file))
        .extract()
        .wrap_err_with(|| format!("invalid configuration in {}", args.config_file.display()))?;

    if let Some(port) = args.telnet_port {
        config.server.telnet_port = port;
    }
    if args.debug {
        config.server.debug = true;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args_for(config_file: PathBuf) -> Args {
        let mut args = Args::parse_from(["fen-daemon"]);
        args.config_file = config_file;
        args
    }

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fen-config.json");
        let config = load_config(&args_for(path.clone())).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.telnet_port, 1701);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fen-config.json");
        std::fs::write(&path, r#"{"server": {"telnetPort": 4321}}"#).unwrap();
        let config = load_config(&args_for(path)).unwrap();
        assert_eq!(config.server.telnet_port, 4321);
        assert_eq!(config.server.websocket_port, 1702);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fen-config.json");
        std::fs::write(&path, r#"{"server": {"telnetPort": 4321}}"#).unwrap();
        let mut args = args_for(path);
        args.telnet_port = Some(9999);
        args.debug = true;
        let config = load_config(&args).unwrap();
        assert_eq!(config.server.telnet_port, 9999);
        assert!(config.server.debug);
    }

    #[test]
    fn test_unknown_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fen-config.json");
        std::fs::write(&path, r#"{"server": {"telnetProt": 4321}}"#).unwrap();
        assert!(load_config(&args_for(path)).is_err());
    }
}
