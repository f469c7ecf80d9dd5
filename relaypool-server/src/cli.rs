use clap::Parser;
use relaypool_types::RelayConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "relaypool",
    about = "relaypool - multi-account reverse proxy for LLM APIs",
    version = env!("GIT_VERSION"),
    author
)]
pub struct Cli {
    #[arg(short, long, env = "RELAYPOOL_CONFIG", help = "Path to relaypool.json")]
    pub config: Option<PathBuf>,

    #[arg(short, long, env = "RELAYPOOL_PORT", help = "Override the configured port")]
    pub port: Option<u16>,

    #[arg(short, long, env = "RELAYPOOL_BIND", help = "Override the configured bind address")]
    pub bind: Option<String>,

    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "RELAYPOOL_LOG_DIR", help = "Also write daily-rolling logs here")]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    /// Command line and environment win over the file.
    pub fn apply_overrides(&self, config: &mut RelayConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            config.bind = bind.to_string();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_file_values() {
        let cli = Cli::try_parse_from(["relaypool", "--port", "9100", "--bind", "0.0.0.0"]).unwrap();
        let mut config = RelayConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.get_socket_addr(), "0.0.0.0:9100");
    }

    #[test]
    fn test_blank_bind_keeps_config() {
        let cli = Cli::try_parse_from(["relaypool", "--bind", "  "]).unwrap();
        let mut config = RelayConfig { port: 7000, ..RelayConfig::default() };
        cli.apply_overrides(&mut config);
        assert_eq!(config.get_socket_addr(), "127.0.0.1:7000");
    }

    #[test]
    fn test_config_path_flag() {
        let cli = Cli::try_parse_from(["relaypool", "-c", "/etc/relaypool.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/relaypool.json")));
    }
}
