use tracing::{info, instrument};

use crate::KerbAuthError;
use crate::authenticator::{AuthType, Authenticator};
use crate::command::CommandRunner;
use crate::config::{AuthSettings, MutualAuthentication};
use crate::credentials::Principal;
use crate::handler::{AuthHandler, KerberosHandler};
use crate::session::Session;
use crate::tickets::TicketAcquirer;

/// Kerberos through the host's default credential cache.
///
/// Built either from the ambient login identity or from a username and password, in which case
/// a fresh ticket is requested with `kinit` before the authenticator exists.
#[derive(Debug, Clone)]
pub struct KerberosAuthenticator {
    hostname_override: Option<String>,
    mutual: MutualAuthentication,
}

impl KerberosAuthenticator {
    /// Reuses a valid ticket or runs `kinit` for the logged-in identity.
    #[instrument(name = "kerberos.ambient", level = "info", skip(runner, settings))]
    pub fn ambient(
        runner: &dyn CommandRunner,
        settings: &AuthSettings,
        hostname_override: Option<String>,
    ) -> Result<Self, KerbAuthError> {
        TicketAcquirer::new(runner, &settings.tools).ensure_ambient_ticket()?;
        Ok(Self::ready(hostname_override, settings.mutual))
    }

    /// Requests a ticket for `username@domain`, feeding `password` to the `kinit` prompt.
    #[instrument(
        name = "kerberos.password",
        level = "info",
        skip(runner, settings, password)
    )]
    pub fn with_password(
        runner: &dyn CommandRunner,
        settings: &AuthSettings,
        username: &str,
        password: &str,
        domain: &str,
        hostname_override: Option<String>,
    ) -> Result<Self, KerbAuthError> {
        let principal = Principal::new(username, domain);
        TicketAcquirer::new(runner, &settings.tools).acquire_with_password(&principal, password)?;
        Ok(Self::ready(hostname_override, settings.mutual))
    }

    fn ready(hostname_override: Option<String>, mutual: MutualAuthentication) -> Self {
        let hostname_override = hostname_override.filter(|host| !host.is_empty());
        info!(hostname_override = ?hostname_override, "kerberos authenticator ready");
        Self {
            hostname_override,
            mutual,
        }
    }

    pub fn hostname_override(&self) -> Option<&str> {
        self.hostname_override.as_deref()
    }

    pub fn mutual(&self) -> MutualAuthentication {
        self.mutual
    }
}

impl Authenticator for KerberosAuthenticator {
    fn auth_handler(&self, session: &Session) -> Result<AuthHandler, KerbAuthError> {
        Ok(AuthHandler::Kerberos(KerberosHandler::new(
            session,
            self.hostname_override(),
            self.mutual,
            None,
        )))
    }

    fn auth_type(&self) -> AuthType {
        AuthType::Kerberos
    }
}
