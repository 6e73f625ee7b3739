// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Global flags plus the create, info, restart and reload subcommands.

use clap::{Args, Parser, Subcommand, ValueEnum};
use sitewright::lifecycle::ServiceFlags;
use sitewright::site::{SiteRequest, SslKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sitewright")]
#[command(about = "Provision containerised PHP sites with rollback on failure")]
#[command(version)]
pub struct Cli {
    /// Settings file (default: /etc/sitewright/config.yml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results and errors only
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a PHP site
    Create(CreateArgs),

    /// Show a site's record
    Info {
        url: String,

        #[arg(long, value_enum, default_value_t = InfoFormat::Table)]
        format: InfoFormat,
    },

    /// Restart site services (all of them when no service flag is given)
    Restart {
        url: String,

        #[command(flatten)]
        services: RestartServices,
    },

    /// Reload nginx and/or php configuration without a restart
    Reload {
        url: String,

        #[command(flatten)]
        services: ReloadServices,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InfoFormat {
    Table,
    Json,
}

#[derive(Args)]
pub struct RestartServices {
    #[arg(long)]
    pub nginx: bool,
    #[arg(long)]
    pub php: bool,
    /// Only for sites with a local database
    #[arg(long)]
    pub db: bool,
}

impl From<RestartServices> for ServiceFlags {
    fn from(s: RestartServices) -> Self {
        ServiceFlags {
            nginx: s.nginx,
            php: s.php,
            db: s.db,
        }
    }
}

#[derive(Args)]
pub struct ReloadServices {
    #[arg(long)]
    pub nginx: bool,
    #[arg(long)]
    pub php: bool,
}

impl From<ReloadServices> for ServiceFlags {
    fn from(s: ReloadServices) -> Self {
        ServiceFlags {
            nginx: s.nginx,
            php: s.php,
            db: false,
        }
    }
}

#[derive(Args)]
pub struct CreateArgs {
    /// Site URL, e.g. example.com
    pub url: String,

    /// Enable page caching with the shared redis
    #[arg(long)]
    pub cache: bool,

    /// Run a redis for this site instead of the shared one (with --cache)
    #[arg(long)]
    pub with_local_redis: bool,

    /// PHP version: 5.6, 7.0, 7.2-7.4, 8.0-8.4 or latest
    #[arg(long)]
    pub php: Option<String>,

    /// Comma-separated extra domains served by the site
    #[arg(long)]
    pub alias_domains: Option<String>,

    /// SSL mode: le, self, inherit, custom or none (bare flag means le)
    #[arg(long, num_args = 0..=1, default_missing_value = "le", value_name = "MODE")]
    pub ssl: Option<SslKind>,

    /// Private key for --ssl=custom
    #[arg(long)]
    pub ssl_key: Option<PathBuf>,

    /// Certificate for --ssl=custom
    #[arg(long)]
    pub ssl_crt: Option<PathBuf>,

    /// Issue a wildcard certificate
    #[arg(long)]
    pub wildcard: bool,

    /// Give the site a database (shared server unless --local-db or --dbhost)
    #[arg(long)]
    pub with_db: bool,

    /// Run a database container for this site
    #[arg(long)]
    pub local_db: bool,

    #[arg(long)]
    pub dbname: Option<String>,

    #[arg(long)]
    pub dbuser: Option<String>,

    #[arg(long)]
    pub dbpass: Option<String>,

    /// Remote database server as host or host:port
    #[arg(long)]
    pub dbhost: Option<String>,

    #[arg(long)]
    pub admin_email: Option<String>,

    /// Document root below htdocs, e.g. public
    #[arg(long)]
    pub public_dir: Option<String>,

    /// Do not wait for the site to answer through the proxy
    #[arg(long)]
    pub skip_status_check: bool,

    /// Reset a populated database instead of refusing
    #[arg(long)]
    pub force: bool,
}

impl From<CreateArgs> for SiteRequest {
    fn from(a: CreateArgs) -> Self {
        SiteRequest {
            url: a.url,
            php: a.php,
            cache: a.cache,
            local_cache: a.with_local_redis,
            alias_domains: a.alias_domains,
            ssl: a.ssl.unwrap_or_default(),
            ssl_key: a.ssl_key,
            ssl_crt: a.ssl_crt,
            wildcard: a.wildcard,
            // Any database option implies a database.
            with_db: a.with_db || a.local_db || a.dbhost.is_some(),
            local_db: a.local_db,
            dbname: a.dbname,
            dbuser: a.dbuser,
            dbpass: a.dbpass,
            dbhost: a.dbhost,
            admin_email: a.admin_email,
            public_dir: a.public_dir,
            skip_status_check: a.skip_status_check,
            force: a.force,
        }
    }
}
