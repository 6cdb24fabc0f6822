//! Command-line arguments
//!
//! Every storage option can also come from a `CASCVIEW_*` environment
//! variable, so a shell can point at one installation once and then run
//! several commands against it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use cascview_formats::root::LocaleFlags;
use cascview_storage::{MissingFilePolicy, StorageConfig};

/// Browse and extract files from CASC storage
#[derive(Debug, Parser)]
#[command(name = "cascview", version, about)]
pub struct Cli {
    /// Installation root, the directory holding `.build.info`
    #[arg(short, long, env = "CASCVIEW_PATH", global = true)]
    pub path: Option<PathBuf>,

    /// Read everything from the CDN instead of a local installation
    #[arg(long, env = "CASCVIEW_ONLINE", global = true)]
    pub online: bool,

    /// Product code, e.g. `wow` or `wow_classic`
    #[arg(long, env = "CASCVIEW_PRODUCT", global = true)]
    pub product: Option<String>,

    /// CDN host names, space-separated
    #[arg(long, env = "CASCVIEW_CDN_HOSTS", value_delimiter = ' ', global = true)]
    pub cdn_hosts: Vec<String>,

    /// CDN path prefix, e.g. `tpr/wow`
    #[arg(long, env = "CASCVIEW_CDN_PATH", global = true)]
    pub cdn_path: Option<String>,

    /// Build config key for online sessions
    #[arg(long, env = "CASCVIEW_BUILD_KEY", global = true)]
    pub build_key: Option<String>,

    /// CDN config key for online sessions
    #[arg(long, env = "CASCVIEW_CDN_KEY", global = true)]
    pub cdn_key: Option<String>,

    /// Directory caching CDN downloads
    #[arg(long, env = "CASCVIEW_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// CDN request timeout in seconds
    #[arg(long, env = "CASCVIEW_TIMEOUT", default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Listfile naming the files of the root table
    #[arg(short, long, env = "CASCVIEW_LISTFILE", global = true)]
    pub listfile: Option<PathBuf>,

    /// Locale to select, e.g. `enUS`, `deDE` or `all`
    #[arg(long, env = "CASCVIEW_LOCALE", default_value = "enUS", global = true)]
    pub locale: String,

    /// Return empty data for files that cannot be found
    #[arg(long, global = true)]
    pub empty_missing: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the opened build and table sizes
    Info,

    /// List files, optionally under a folder prefix
    Ls {
        /// Path prefix such as `Interface\Icons`
        prefix: Option<String>,

        /// Show content key and file data id
        #[arg(short = 'L', long)]
        long: bool,
    },

    /// Write a file to stdout
    Cat {
        /// File path
        path: String,
    },

    /// Decode a file to disk
    Extract {
        /// File path or 32-character content key
        target: String,

        /// Output file
        dest: PathBuf,
    },

    /// List install and download manifest tags
    Tags {
        /// Show entries carrying this tag instead
        tag: Option<String>,
    },
}

impl Cli {
    /// Storage configuration described by the arguments
    pub fn storage_config(&self) -> Result<StorageConfig> {
        let locale = LocaleFlags::from_code(&self.locale)
            .with_context(|| format!("unknown locale '{}'", self.locale))?;

        let mut config = if self.online {
            let product = self
                .product
                .clone()
                .context("--online needs --product")?;
            let config = StorageConfig::online(product);
            match &self.path {
                Some(path) => config.with_path(path),
                None => config,
            }
        } else {
            let Some(path) = &self.path else {
                bail!("no installation given; pass --path or --online");
            };
            let mut config = StorageConfig::new(path);
            if let Some(product) = &self.product {
                config = config.with_product(product.clone());
            }
            config
        };
        if let Some(cdn_path) = &self.cdn_path {
            config = config.with_cdn(self.cdn_hosts.clone(), cdn_path.clone());
        } else if !self.cdn_hosts.is_empty() {
            config.cdn_hosts.clone_from(&self.cdn_hosts);
        }
        match (&self.build_key, &self.cdn_key) {
            (Some(build), Some(cdn)) => config = config.with_build(build.clone(), cdn.clone()),
            (None, None) => {}
            _ => bail!("--build-key and --cdn-key go together"),
        }
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if self.empty_missing {
            config = config.with_missing_files(MissingFilePolicy::Empty);
        }
        // Tags need the download manifest too
        let download = matches!(self.command, Command::Tags { .. });

        Ok(config
            .with_timeout(Duration::from_secs(self.timeout))
            .with_locale(locale)
            .with_manifests(true, download))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cascview").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_local_config() {
        let cli = parse(&["--path", "/games/wow", "--locale", "deDE", "ls", "Interface"]);
        let config = cli.storage_config().unwrap();
        assert_eq!(config.base_path, PathBuf::from("/games/wow"));
        assert!(!config.online);
        assert_eq!(config.locale_flags(), LocaleFlags::DE_DE);
        assert!(!config.load_download);
    }

    #[test]
    fn test_online_config() {
        let cli = parse(&[
            "--online",
            "--product",
            "wow_classic",
            "--cdn-hosts",
            "a.test b.test",
            "--cdn-path",
            "tpr/wow",
            "--build-key",
            "0123456789abcdef0123456789abcdef",
            "--cdn-key",
            "fedcba9876543210fedcba9876543210",
            "tags",
        ]);
        let config = cli.storage_config().unwrap();
        assert!(config.online);
        assert_eq!(config.product.as_deref(), Some("wow_classic"));
        assert_eq!(config.cdn_hosts, vec!["a.test", "b.test"]);
        assert_eq!(config.cdn_path.as_deref(), Some("tpr/wow"));
        assert!(config.load_download);
    }

    #[test]
    fn test_config_errors() {
        assert!(parse(&["info"]).storage_config().is_err());
        assert!(parse(&["--online", "info"]).storage_config().is_err());
        assert!(
            parse(&["--path", ".", "--locale", "xxYY", "info"])
                .storage_config()
                .is_err()
        );
        assert!(
            parse(&["--path", ".", "--build-key", "00", "info"])
                .storage_config()
                .is_err()
        );
    }
}
