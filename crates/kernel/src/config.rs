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

//! Config is loaded by the daemon and passed by reference into the
//! components that need it. The on-disk form is one JSON document; a missing
//! file is written out with these defaults. Key casing follows the file
//! format, not Rust convention.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scripting: ScriptingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub telnet_port: u16,
    pub websocket_port: u16,
    pub websocket_enabled: bool,
    /// Reserved for the HTTP/admin surface; accepted so configs carrying it
    /// keep loading, but nothing binds it.
    pub http_port: u16,
    pub http_enabled: bool,
    pub public_base_url: String,
    pub debug: bool,
    /// Failed logins tolerated before the session is closed.
    pub max_login_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            telnet_port: 1701,
            websocket_port: 1702,
            websocket_enabled: true,
            http_port: 1703,
            http_enabled: false,
            public_base_url: "http://localhost:1703".to_string(),
            debug: false,
            max_login_attempts: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fen.db"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct LoggingConfig {
    pub console: bool,
    pub file: bool,
    pub file_path: PathBuf,
    /// trace | debug | info | warn | error
    pub level: String,
    /// How many rotated log files to keep.
    pub rotation_count: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console: true,
            file: false,
            file_path: PathBuf::from("fen.log"),
            level: "info".to_string(),
            rotation_count: 5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct ScriptingConfig {
    pub max_call_depth: usize,
    pub max_execution_time_ms: u64,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 100,
            max_execution_time_ms: 5000,
        }
    }
}

impl ScriptingConfig {
    pub fn execution_budget(&self) -> Duration {
        Duration::from_millis(self.max_execution_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.server.telnet_port, 1701);
        assert_eq!(c.server.websocket_port, 1702);
        assert_eq!(c.scripting.max_call_depth, 100);
        assert_eq!(c.scripting.max_execution_time_ms, 5000);
    }

    #[test]
    fn test_file_keys_are_camel_case() {
        let text = serde_json::to_string(&Config::default()).unwrap();
        assert!(text.contains("\"maxCallDepth\""));
        assert!(text.contains("\"maxExecutionTimeMs\""));
        assert!(text.contains("\"telnetPort\""));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let c: Config =
            serde_json::from_str(r#"{"server": {"telnetPort": 4000}, "scripting": {}}"#).unwrap();
        assert_eq!(c.server.telnet_port, 4000);
        assert_eq!(c.server.websocket_port, 1702);
        assert_eq!(c.scripting.max_call_depth, 100);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{"srever": {}}"#).is_err());
        assert!(serde_json::from_str::<Config>(r#"{"server": {"telnetPrt": 1}}"#).is_err());
    }
}
