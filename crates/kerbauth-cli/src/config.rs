use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kerbauth_core::{
    AuthSettings, AuthType, AuthenticationStrategy, CredentialCache, KerbAuthError, KerberosTools,
    MutualAuthentication,
};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry::Registry};

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Prepare Kerberos / NTLM credentials and authenticate HTTP requests with them
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(
        short,
        long,
        help = "Authentication method: kerberos, ntlm or keytab",
        default_value_t = AuthType::Kerberos,
        value_parser = parse_auth_type
    )]
    pub auth_type: AuthType,

    /// Username; for kerberos, omit it to use the ambient login identity
    #[arg(short, long, help = "Username for authentication")]
    pub username: Option<String>,

    /// Password for kerberos and ntlm. Prefer the environment variable over the flag.
    #[arg(
        short = 'P',
        long,
        env = "KERBAUTH_PASSWORD",
        hide_env_values = true,
        help = "Password for authentication"
    )]
    pub password: Option<String>,

    #[arg(short, long, help = "Kerberos realm or NTLM domain", default_value = "")]
    pub domain: String,

    #[arg(short, long, help = "Keytab file (keytab authentication only)")]
    pub keytab: Option<PathBuf>,

    #[arg(long, help = "Host name used for the Kerberos service principal")]
    pub hostname_override: Option<String>,

    #[arg(long, help = "Credential cache for keytab tickets [default: ./credentials_cache]")]
    pub ccache: Option<PathBuf>,

    #[arg(long, default_value = "kinit", help = "Path to kinit")]
    pub kinit: PathBuf,

    #[arg(long, default_value = "klist", help = "Path to klist")]
    pub klist: PathBuf,

    #[arg(long, help = "Mutual authentication policy", default_value_t = MutualArg::Optional)]
    pub mutual: MutualArg,

    /// Verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase logging verbosity")]
    pub verbose: u8,

    #[arg(long, help = "Write logs to this file instead of stderr")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Establish local credentials and report the selected authentication type
    Login,
    /// Authenticate a request against a URL and report the final status
    Probe {
        url: String,
    },
}

fn parse_auth_type(value: &str) -> Result<AuthType, String> {
    value.parse().map_err(|e: KerbAuthError| e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MutualArg {
    Required,
    Optional,
    Disabled,
}

impl std::fmt::Display for MutualArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

impl From<MutualArg> for MutualAuthentication {
    fn from(value: MutualArg) -> Self {
        match value {
            MutualArg::Required => Self::Required,
            MutualArg::Optional => Self::Optional,
            MutualArg::Disabled => Self::Disabled,
        }
    }
}

/// Initialize structured logging to stderr or to `log_file`
pub fn init_logging(verbose_level: u8, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    // Bridge logs from the `log` crate to `tracing`
    LogTracer::init().ok();

    let (nb_writer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    if LOG_GUARD.set(guard).is_err() {
        tracing::warn!("LOG_GUARD was already set. This may indicate a problem in initialization.");
    }

    let filter_str = match verbose_level {
        0 => "warn,kerbauth=info,kerbauth_core=info,ureq=error,sspi=error",
        1 => "info,kerbauth=debug,kerbauth_core=debug,ureq=warn,sspi=error",
        2 => "debug,ureq=info,sspi=warn",
        _ => "trace",
    };

    let subscriber = Registry::default().with(EnvFilter::new(filter_str)).with(
        fmt::layer()
            .with_writer(nb_writer)
            .with_target(true)
            .with_ansi(log_file.is_none())
            .compact(),
    );

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Map command line arguments onto a strategy
pub fn strategy_from_args(args: &Args) -> anyhow::Result<AuthenticationStrategy> {
    let hostname_override = args
        .hostname_override
        .clone()
        .filter(|host| !host.trim().is_empty());

    let strategy = match args.auth_type {
        AuthType::Kerberos => match &args.username {
            None => AuthenticationStrategy::AmbientKerberos { hostname_override },
            Some(username) => AuthenticationStrategy::PasswordKerberos {
                username: username.clone(),
                password: require_password(args)?,
                domain: args.domain.clone(),
                hostname_override,
            },
        },
        AuthType::Ntlm => AuthenticationStrategy::Ntlm {
            username: args
                .username
                .clone()
                .context("ntlm authentication needs --username")?,
            password: require_password(args)?,
            domain: args.domain.clone(),
        },
        AuthType::Keytab => AuthenticationStrategy::Keytab {
            username: args
                .username
                .clone()
                .context("keytab authentication needs --username")?,
            keytab: args
                .keytab
                .clone()
                .context("keytab authentication needs --keytab")?,
            domain: args.domain.clone(),
        },
    };

    Ok(strategy)
}

fn require_password(args: &Args) -> anyhow::Result<String> {
    args.password
        .clone()
        .with_context(|| format!("{} authentication needs a password", args.auth_type))
}

pub fn settings_from_args(args: &Args) -> AuthSettings {
    let tools = KerberosTools::builder()
        .kinit(args.kinit.clone())
        .klist(args.klist.clone())
        .build();

    let settings = AuthSettings::builder()
        .tools(tools)
        .mutual(args.mutual.into());

    match &args.ccache {
        Some(path) => settings.ccache(CredentialCache::new(path.clone())).build(),
        None => settings.build(),
    }
}
