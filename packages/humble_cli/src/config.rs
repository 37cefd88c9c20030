use crate::models::{ChoicePeriod, ClaimFilter, MatchMode};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The missing Humble Bundle CLI
///
/// List purchased bundles, show their details, search products and download items.
#[derive(Parser, Debug)]
#[command(name = "humble-cli", version, about, long_about = None, propagate_version = true)]
pub struct Args {
    /// Path to an optional settings file in YAML format
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Set the authentication session key
    ///
    /// The key is the value of the `_simpleauth_sess` cookie of a logged in browser session.
    Auth {
        #[arg(value_name = "SESSION-KEY")]
        session_key: String,
    },

    /// List all your purchased bundles
    #[command(visible_alias = "ls")]
    List {
        /// Print bundles with the specified fields only, as CSV
        #[arg(long = "field", value_delimiter = ',', value_parser = ["key", "name", "size", "claimed"], ignore_case = true)]
        fields: Vec<String>,

        /// Show claimed or unclaimed bundles only
        #[arg(long, value_enum, default_value_t = ClaimFilter::All)]
        claimed: ClaimFilter,
    },

    /// List your Humble Choices
    ListChoices {
        /// The month and year to use, e.g. 'january-2023', or 'current'
        #[arg(long, default_value = "current")]
        period: ChoicePeriod,
    },

    /// Print details of a certain bundle. The key can be partially entered
    #[command(visible_alias = "info")]
    Details {
        #[arg(value_name = "BUNDLE-KEY")]
        bundle_key: String,
    },

    /// Search through all bundle products for keywords
    Search {
        #[arg(value_name = "KEYWORDS", required = true)]
        keywords: Vec<String>,

        /// Whether all or any of the keywords should match
        #[arg(long, value_enum, default_value_t = MatchMode::Any)]
        mode: MatchMode,
    },

    /// Selectively download items from a bundle. The key can be partially entered
    #[command(visible_alias = "d")]
    Download {
        #[arg(value_name = "BUNDLE-KEY")]
        bundle_key: String,

        /// Download only specified items, e.g. '1,3-5,10-'
        #[arg(short, long)]
        item_numbers: Option<String>,

        #[command(flatten)]
        options: DownloadArgs,
    },

    /// Download items from multiple bundles listed in an input file
    ///
    /// Each line holds a bundle key optionally followed by a comma and the bundle name,
    /// as printed by `list --field key,name`.
    #[command(visible_alias = "b")]
    BulkDownload {
        #[arg(value_name = "INPUT-FILE")]
        input: PathBuf,

        #[command(flatten)]
        options: DownloadArgs,
    },
}

/// Filters shared by the download commands
#[derive(clap::Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Filter downloaded items by format (can be repeated)
    #[arg(short, long = "format", value_delimiter = ',')]
    pub formats: Vec<String>,

    /// Filter downloaded items by maximum size, e.g. 14MB or 4GiB
    #[arg(short = 's', long)]
    pub max_size: Option<String>,

    /// Download only the .torrent files of items
    #[arg(short, long)]
    pub torrents: bool,

    /// Download into the current directory instead of a bundle directory
    #[arg(short, long)]
    pub cur_dir: bool,
}

/// Application settings
///
/// Every field has a default, so the settings file is optional and may be partial.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the site and its API
    pub base_url: String,
    /// Number of bundle keys requested per API call
    pub batch_size: usize,
    /// Timeout of API calls
    pub api_timeout_secs: u64,
    /// Timeout of content-length lookups
    pub size_timeout_secs: u64,
    /// Read timeout of file downloads
    pub download_read_timeout_secs: u64,
    /// Total attempts per file download
    pub retry_attempts: u32,
    /// Pause between download attempts
    pub retry_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://www.humblebundle.com".to_owned(),
            batch_size: 10,
            api_timeout_secs: 30,
            size_timeout_secs: 10,
            download_read_timeout_secs: 30,
            retry_attempts: 3,
            retry_delay_secs: 5,
        }
    }
}

impl Settings {
    /// Reads settings from `path`, or returns the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let file = File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let settings: Self = serde_yaml::from_reader(BufReader::new(file))
            .context("Failed to parse config YAML")?;
        settings.validate()
    }

    fn validate(self) -> Result<Self> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be at least 1");
        anyhow::ensure!(self.retry_attempts > 0, "retry_attempts must be at least 1");
        Ok(self)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn size_timeout(&self) -> Duration {
        Duration::from_secs(self.size_timeout_secs)
    }

    pub fn download_read_timeout(&self) -> Duration {
        Duration::from_secs(self.download_read_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.retry_delay(), Duration::from_secs(5));
        assert_eq!(settings.base_url, "https://www.humblebundle.com");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size: 4\nretry_delay_secs: 1").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.batch_size, 4);
        assert_eq!(settings.retry_delay_secs, 1);
        assert_eq!(settings.api_timeout_secs, 30);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size: 0").unwrap();
        assert!(Settings::load(Some(file.path())).is_err());
    }

    #[test]
    fn parses_download_command() {
        let args = Args::parse_from([
            "humble-cli", "download", "abc", "-f", "pdf,EPUB", "-s", "1GB", "-i", "1-3", "-c",
        ]);
        let Command::Download { bundle_key, item_numbers, options } = args.command else {
            panic!("expected download command");
        };
        assert_eq!(bundle_key, "abc");
        assert_eq!(item_numbers.as_deref(), Some("1-3"));
        assert_eq!(options.formats, vec!["pdf", "EPUB"]);
        assert_eq!(options.max_size.as_deref(), Some("1GB"));
        assert!(options.cur_dir);
        assert!(!options.torrents);
    }

    #[test]
    fn parses_list_fields_and_filters() {
        let args = Args::parse_from(["humble-cli", "ls", "--field", "key,name", "--claimed", "no"]);
        let Command::List { fields, claimed } = args.command else {
            panic!("expected list command");
        };
        assert_eq!(fields, vec!["key", "name"]);
        assert_eq!(claimed, ClaimFilter::No);
    }

    #[test]
    fn rejects_unknown_field_and_period() {
        assert!(Args::try_parse_from(["humble-cli", "list", "--field", "price"]).is_err());
        assert!(Args::try_parse_from(["humble-cli", "list-choices", "--period", "smarch-2020"]).is_err());
    }

    #[test]
    fn requires_a_subcommand() {
        let err = Args::try_parse_from(["humble-cli"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
