use std::borrow::Cow;

pub mod authenticator;
pub mod ccache;
pub mod command;
pub mod config;
pub mod credentials;
pub mod handler;
pub mod http;
pub mod keytab;
pub mod kerberos;
pub mod ntlm;
pub mod session;
pub mod strategy;
pub mod tickets;

pub use authenticator::{AuthType, Authenticator};
pub use ccache::CredentialCache;
pub use command::{CommandOutcome, CommandRunner, Invocation, SystemCommandRunner, ToolExit};
pub use config::{AuthSettings, KerberosTools, MutualAuthentication, Platform};
pub use credentials::Principal;
pub use handler::{AuthHandler, KerberosHandler, NtlmHandler};
pub use http::HttpResponse;
pub use keytab::KeytabAuthenticator;
pub use kerberos::KerberosAuthenticator;
pub use ntlm::NtlmAuthenticator;
pub use session::Session;
pub use strategy::{AnyAuthenticator, AuthenticationStrategy};
pub use tickets::{TicketAcquirer, TicketOrigin};

#[derive(Debug, thiserror::Error)]
pub enum KerbAuthError {
    #[error("{auth_type} authentication is not supported on {platform}")]
    UnsupportedPlatform {
        auth_type: AuthType,
        platform: &'static str,
    },

    #[error("{origin}: `{tool}` {exit}{}", stderr_suffix(.stderr))]
    TicketAcquisitionFailed {
        origin: TicketOrigin,
        tool: String,
        exit: ToolExit,
        stderr: String,
    },

    #[error("failed to run `{program}`: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("unknown authentication type: {0}")]
    UnknownAuthType(String),

    #[error("invalid session: {0}")]
    InvalidSession(Cow<'static, str>),

    #[error("SSPI error: {0}")]
    SspiError(#[from] sspi::Error),

    #[error("SSPI username error: {0}")]
    UsernameError(&'static str),

    #[error("Authentication error: {0}")]
    Auth(&'static str),

    #[error("Kerberos handshakes need the `gssapi` feature of kerbauth-core")]
    GssapiUnavailable,

    #[error("GSSAPI error: {0}")]
    Gssapi(String),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" ({stderr})")
    }
}
