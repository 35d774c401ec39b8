use std::fmt::{self, Display};

use crate::KerbAuthError;

/// Kerberos identity `username@domain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    username: String,
    realm: String,
}

impl Principal {
    pub fn new(username: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            realm: realm.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.realm)
    }
}

/// Down-level logon name `DOMAIN\username` backed by an sspi username.
#[derive(Debug, Clone)]
pub struct ClientUserName {
    inner: sspi::Username,
}

impl ClientUserName {
    /// A down-level logon name, or a bare account name when `netbios_domain_name` is empty.
    pub fn new(
        account_name: &str,
        netbios_domain_name: Option<&str>,
    ) -> Result<Self, KerbAuthError> {
        let inner = match netbios_domain_name {
            Some(netbios_domain_name) if !netbios_domain_name.is_empty() => {
                sspi::Username::new_down_level_logon_name(account_name, netbios_domain_name)
                    .map_err(|_| {
                        KerbAuthError::UsernameError("failed to create down-level logon name")
                    })?
            }
            _ => sspi::Username::parse(account_name)
                .map_err(|_| KerbAuthError::UsernameError("failed to parse username"))?,
        };
        Ok(Self { inner })
    }

    /// Returns the account name
    pub fn account_name(&self) -> &str {
        self.inner.account_name()
    }

    /// May return an UPN suffix or NetBIOS domain name depending on the internal format
    pub fn domain_name(&self) -> Option<&str> {
        self.inner.domain_name()
    }
}

/// Credentials handed to the NTLM provider; the password stays inside sspi's secret wrapper.
#[derive(Debug, Clone)]
pub struct ClientAuthIdentity {
    inner: sspi::AuthIdentity,
}

impl ClientAuthIdentity {
    pub fn new(username: ClientUserName, password: String) -> Self {
        let inner = sspi::AuthIdentity {
            username: username.inner,
            password: password.into(),
        };
        Self { inner }
    }

    pub(crate) fn into_inner(self) -> sspi::AuthIdentity {
        self.inner
    }
}

/// `DOMAIN\username`, the identity string NTLM servers expect.
pub fn down_level_identity(domain: &str, username: &str) -> String {
    format!("{domain}\\{username}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_joins_user_and_realm() {
        let principal = Principal::new("alice", "EXAMPLE.COM");
        assert_eq!(principal.to_string(), "alice@EXAMPLE.COM");
        assert_eq!(principal.username(), "alice");
        assert_eq!(principal.realm(), "EXAMPLE.COM");
    }

    #[test]
    fn principal_does_not_validate_inputs() {
        assert_eq!(Principal::new("svc", "").to_string(), "svc@");
    }

    #[test]
    fn down_level_identity_uses_backslash() {
        assert_eq!(down_level_identity("CORP", "bob"), "CORP\\bob");
    }

    #[test]
    fn client_user_name_accepts_missing_domain() {
        let name = ClientUserName::new("bob", Some("")).expect("bare account name");
        assert_eq!(name.account_name(), "bob");

        let name = ClientUserName::new("bob", Some("CORP")).expect("down-level name");
        assert_eq!(name.account_name(), "bob");
        assert_eq!(name.domain_name(), Some("CORP"));
    }
}
