use std::fmt::{self, Display};
use std::str::FromStr;

use crate::KerbAuthError;
use crate::handler::AuthHandler;
use crate::session::Session;

/// Stable identifier of an authentication strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    Kerberos,
    Ntlm,
    Keytab,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kerberos => "kerberos",
            Self::Ntlm => "ntlm",
            Self::Keytab => "keytab",
        }
    }
}

impl Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = KerbAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kerberos" => Ok(Self::Kerberos),
            "ntlm" => Ok(Self::Ntlm),
            "keytab" => Ok(Self::Keytab),
            _ => Err(KerbAuthError::UnknownAuthType(s.to_owned())),
        }
    }
}

/// Capability shared by every strategy.
///
/// Local credential state is established when the strategy is constructed; producing a handler
/// never runs an external tool.
pub trait Authenticator {
    /// A fresh handler bound to `session`, ready to answer its server's challenges.
    fn auth_handler(&self, session: &Session) -> Result<AuthHandler, KerbAuthError>;

    fn auth_type(&self) -> AuthType;
}
