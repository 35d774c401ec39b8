use std::fmt::Debug;
use std::path::PathBuf;

use crate::KerbAuthError;
use crate::authenticator::{AuthType, Authenticator};
use crate::command::CommandRunner;
use crate::config::AuthSettings;
use crate::handler::AuthHandler;
use crate::keytab::KeytabAuthenticator;
use crate::kerberos::KerberosAuthenticator;
use crate::ntlm::NtlmAuthenticator;
use crate::session::Session;

/// What the caller asked for, before any local credential state exists.
#[derive(Clone)]
pub enum AuthenticationStrategy {
    AmbientKerberos {
        hostname_override: Option<String>,
    },
    PasswordKerberos {
        username: String,
        password: String,
        domain: String,
        hostname_override: Option<String>,
    },
    Ntlm {
        username: String,
        password: String,
        domain: String,
    },
    Keytab {
        username: String,
        keytab: PathBuf,
        domain: String,
    },
}

impl Debug for AuthenticationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmbientKerberos { hostname_override } => f
                .debug_struct("AmbientKerberos")
                .field("hostname_override", hostname_override)
                .finish(),
            Self::PasswordKerberos {
                username,
                domain,
                hostname_override,
                ..
            } => f
                .debug_struct("PasswordKerberos")
                .field("username", username)
                .field("domain", domain)
                .field("hostname_override", hostname_override)
                .finish_non_exhaustive(),
            Self::Ntlm {
                username, domain, ..
            } => f
                .debug_struct("Ntlm")
                .field("username", username)
                .field("domain", domain)
                .finish_non_exhaustive(),
            Self::Keytab {
                username,
                keytab,
                domain,
            } => f
                .debug_struct("Keytab")
                .field("username", username)
                .field("keytab", keytab)
                .field("domain", domain)
                .finish(),
        }
    }
}

impl AuthenticationStrategy {
    pub fn auth_type(&self) -> AuthType {
        match self {
            Self::AmbientKerberos { .. } | Self::PasswordKerberos { .. } => AuthType::Kerberos,
            Self::Ntlm { .. } => AuthType::Ntlm,
            Self::Keytab { .. } => AuthType::Keytab,
        }
    }

    /// Performs the strategy's local setup and returns the ready authenticator.
    ///
    /// Either every required ticket exists afterwards or an error is returned and nothing is
    /// handed out.
    pub fn into_authenticator(
        self,
        runner: &dyn CommandRunner,
        settings: &AuthSettings,
    ) -> Result<AnyAuthenticator, KerbAuthError> {
        match self {
            Self::AmbientKerberos { hostname_override } => {
                KerberosAuthenticator::ambient(runner, settings, hostname_override)
                    .map(AnyAuthenticator::Kerberos)
            }
            Self::PasswordKerberos {
                username,
                password,
                domain,
                hostname_override,
            } => KerberosAuthenticator::with_password(
                runner,
                settings,
                &username,
                &password,
                &domain,
                hostname_override,
            )
            .map(AnyAuthenticator::Kerberos),
            Self::Ntlm {
                username,
                password,
                domain,
            } => Ok(AnyAuthenticator::Ntlm(NtlmAuthenticator::new(
                username, password, domain,
            ))),
            Self::Keytab {
                username,
                keytab,
                domain,
            } => KeytabAuthenticator::new(runner, settings, &username, keytab, &domain)
                .map(AnyAuthenticator::Keytab),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AnyAuthenticator {
    Kerberos(KerberosAuthenticator),
    Ntlm(NtlmAuthenticator),
    Keytab(KeytabAuthenticator),
}

impl Authenticator for AnyAuthenticator {
    fn auth_handler(&self, session: &Session) -> Result<AuthHandler, KerbAuthError> {
        match self {
            Self::Kerberos(authenticator) => authenticator.auth_handler(session),
            Self::Ntlm(authenticator) => authenticator.auth_handler(session),
            Self::Keytab(authenticator) => authenticator.auth_handler(session),
        }
    }

    fn auth_type(&self) -> AuthType {
        match self {
            Self::Kerberos(authenticator) => authenticator.auth_type(),
            Self::Ntlm(authenticator) => authenticator.auth_type(),
            Self::Keytab(authenticator) => authenticator.auth_type(),
        }
    }
}
