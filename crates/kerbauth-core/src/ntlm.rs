use std::fmt::Debug;

use crate::KerbAuthError;
use crate::authenticator::{AuthType, Authenticator};
use crate::handler::{AuthHandler, NtlmHandler};
use crate::session::Session;

/// NTLM with explicit credentials. Nothing is checked or run at construction.
#[derive(Clone)]
pub struct NtlmAuthenticator {
    username: String,
    password: String,
    domain: String,
}

impl NtlmAuthenticator {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Debug for NtlmAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtlmAuthenticator")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl Authenticator for NtlmAuthenticator {
    fn auth_handler(&self, session: &Session) -> Result<AuthHandler, KerbAuthError> {
        NtlmHandler::new(&self.domain, &self.username, &self.password, session).map(AuthHandler::Ntlm)
    }

    fn auth_type(&self) -> AuthType {
        AuthType::Ntlm
    }
}
