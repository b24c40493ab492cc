//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "radar", version, about = "Passive Albion Online network observer")]
pub struct Cli {
    /// Run with development-oriented defaults (verbose logging, relaxed timeouts).
    #[arg(long)]
    pub dev: bool,

    /// Skip the interactive adapter prompt and capture on this IPv4 address.
    #[arg(long)]
    pub ip: Option<String>,

    /// Optional TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the HTTP/WebSocket bind port.
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    pub fn into_overrides(self) -> crate::config::CliOverrides {
        crate::config::CliOverrides {
            ip: self.ip,
            config_path: self.config,
            port: self.port,
            dev: self.dev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_long_flags() {
        let cli = Cli::parse_from([
            "radar",
            "--dev",
            "--ip",
            "10.0.0.2",
            "--config",
            "radar.toml",
            "--port",
            "9000",
        ]);
        assert!(cli.dev);
        assert_eq!(cli.ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(cli.config, Some(PathBuf::from("radar.toml")));
        assert_eq!(cli.port, Some(9000));
    }

    #[test]
    fn defaults_are_all_absent() {
        let cli = Cli::parse_from(["radar"]);
        assert!(!cli.dev);
        assert_eq!(cli.ip, None);
        assert_eq!(cli.config, None);
        assert_eq!(cli.port, None);
    }
}
