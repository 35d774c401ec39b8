use std::path::PathBuf;

use typed_builder::TypedBuilder;

use crate::ccache::CredentialCache;

/// Locations of the MIT/Heimdal Kerberos command line tools.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct KerberosTools {
    /// Resolved through `PATH` unless absolute.
    #[builder(default = PathBuf::from("kinit"), setter(into))]
    pub kinit: PathBuf,

    #[builder(default = PathBuf::from("klist"), setter(into))]
    pub klist: PathBuf,
}

impl Default for KerberosTools {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl KerberosTools {
    pub(crate) fn kinit_program(&self) -> String {
        self.kinit.to_string_lossy().into_owned()
    }

    pub(crate) fn klist_program(&self) -> String {
        self.klist.to_string_lossy().into_owned()
    }
}

/// How strictly the server's reply token is verified after a Kerberos handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutualAuthentication {
    /// Fail unless the server proves its identity.
    Required,
    /// Verify the server token when one is sent, accept its absence.
    #[default]
    Optional,
    /// Never request nor verify mutual authentication.
    Disabled,
}

impl MutualAuthentication {
    /// Whether the mutual flag is requested when the security context is created.
    pub fn requests_mutual(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    /// Keytab handling relies on `kinit -kt`, which Windows does not ship.
    pub fn supports_keytab(self) -> bool {
        matches!(self, Self::Posix)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Windows => "windows",
        }
    }
}

/// Settings shared by every strategy constructor.
#[derive(Debug, Clone, TypedBuilder)]
pub struct AuthSettings {
    #[builder(default)]
    pub tools: KerberosTools,

    #[builder(default)]
    pub mutual: MutualAuthentication,

    /// Cache used by the keytab strategy; `<cwd>/credentials_cache` when unset.
    #[builder(default, setter(strip_option))]
    pub ccache: Option<CredentialCache>,

    #[builder(default = Platform::current())]
    pub platform: Platform,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tools_resolve_through_path() {
        let tools = KerberosTools::default();
        assert_eq!(tools.kinit_program(), "kinit");
        assert_eq!(tools.klist_program(), "klist");
    }

    #[test]
    fn default_settings_follow_host_platform() {
        let settings = AuthSettings::default();
        assert_eq!(settings.platform, Platform::current());
        assert_eq!(settings.mutual, MutualAuthentication::Optional);
        assert!(settings.ccache.is_none());
    }

    #[test]
    fn only_posix_supports_keytabs() {
        assert!(Platform::Posix.supports_keytab());
        assert!(!Platform::Windows.supports_keytab());
    }
}
