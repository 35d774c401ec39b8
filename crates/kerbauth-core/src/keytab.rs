use std::path::{Path, PathBuf};

use tracing::{error, info, instrument};

use crate::KerbAuthError;
use crate::authenticator::{AuthType, Authenticator};
use crate::ccache::CredentialCache;
use crate::command::CommandRunner;
use crate::config::{AuthSettings, MutualAuthentication};
use crate::credentials::Principal;
use crate::handler::{AuthHandler, KerberosHandler};
use crate::session::Session;
use crate::tickets::TicketAcquirer;

/// Kerberos from a keytab, without any password prompt.
///
/// The ticket lands in a dedicated cache (`<cwd>/credentials_cache` unless
/// [`AuthSettings::ccache`] says otherwise). That path is handed to `kinit` and to every handler
/// explicitly, so the process environment is left alone.
#[derive(Debug, Clone)]
pub struct KeytabAuthenticator {
    principal: Principal,
    keytab: PathBuf,
    ccache: CredentialCache,
    mutual: MutualAuthentication,
}

impl KeytabAuthenticator {
    #[instrument(name = "keytab.new", level = "info", skip(runner, settings, keytab), fields(keytab = %keytab.as_ref().display()))]
    pub fn new(
        runner: &dyn CommandRunner,
        settings: &AuthSettings,
        username: &str,
        keytab: impl AsRef<Path>,
        domain: &str,
    ) -> Result<Self, KerbAuthError> {
        if !settings.platform.supports_keytab() {
            error!(platform = settings.platform.name(), "keytab is not supported on this platform");
            return Err(KerbAuthError::UnsupportedPlatform {
                auth_type: AuthType::Keytab,
                platform: settings.platform.name(),
            });
        }

        let ccache = match &settings.ccache {
            Some(ccache) => ccache.clone(),
            None => CredentialCache::in_current_dir()?,
        };
        let principal = Principal::new(username, domain);
        let keytab = keytab.as_ref().to_path_buf();

        TicketAcquirer::new(runner, &settings.tools).acquire_with_keytab(&principal, &keytab, &ccache)?;
        info!(
            user = principal.username(),
            realm = principal.realm(),
            ccache = %ccache.krb5ccname(),
            "keytab authenticator ready"
        );

        Ok(Self {
            principal,
            keytab,
            ccache,
            mutual: settings.mutual,
        })
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn keytab(&self) -> &Path {
        &self.keytab
    }

    pub fn ccache(&self) -> &CredentialCache {
        &self.ccache
    }
}

impl Authenticator for KeytabAuthenticator {
    fn auth_handler(&self, session: &Session) -> Result<AuthHandler, KerbAuthError> {
        Ok(AuthHandler::Kerberos(KerberosHandler::new(
            session,
            None,
            self.mutual,
            Some(self.ccache.clone()),
        )))
    }

    fn auth_type(&self) -> AuthType {
        AuthType::Keytab
    }
}
