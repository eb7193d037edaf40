//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "studsync",
    version,
    about = "Mirror your Stud.IP courses to a local folder",
    long_about = "Mirrors the document tree of your selected Stud.IP courses under a local \
                  directory, downloading only files that are new or changed since the last pass."
)]
pub struct Cli {
    /// Change the course selection interactively, then exit.
    #[arg(short = 'c', long)]
    pub configure: bool,

    /// Overwrite local files whose remote copy changed since the last pass.
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Keep running, checking every `interval` seconds from the config.
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Replace the password stored in the OS keyring, then exit.
    #[arg(long)]
    pub password: bool,

    /// Use an alternate config file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_invocation() {
        let cli = Cli::parse_from(["studsync"]);
        assert!(!cli.configure);
        assert!(!cli.force);
        assert!(!cli.daemon);
        assert!(!cli.password);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from(["studsync", "-d", "-f"]);
        assert!(cli.daemon);
        assert!(cli.force);
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["studsync", "--config", "/tmp/alt.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/alt.toml")));
    }
}
