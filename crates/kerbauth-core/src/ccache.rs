use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::KerbAuthError;

/// File name of the cache created next to the working directory by the keytab strategy.
pub const DEFAULT_CACHE_FILE: &str = "credentials_cache";

/// Environment variable the Kerberos libraries read the active cache from.
pub const KRB5CCNAME: &str = "KRB5CCNAME";

/// A file-backed Kerberos credential cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCache {
    path: PathBuf,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<cwd>/credentials_cache`
    pub fn in_current_dir() -> Result<Self, KerbAuthError> {
        let cwd = std::env::current_dir().map_err(KerbAuthError::CurrentDir)?;
        Ok(Self::new(cwd.join(DEFAULT_CACHE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value suitable for `KRB5CCNAME` and `kinit -c`.
    pub fn krb5ccname(&self) -> String {
        format!("FILE:{}", self.path.display())
    }
}

/// Points `KRB5CCNAME` at a cache for the guard's lifetime and restores the previous value on drop.
///
/// This mutates process-wide state: two guards alive on different threads race with each other.
#[cfg_attr(not(feature = "gssapi"), allow(dead_code))]
#[derive(Debug)]
pub(crate) struct ScopedCcache {
    previous: Option<Option<OsString>>,
}

#[cfg_attr(not(feature = "gssapi"), allow(dead_code))]
impl ScopedCcache {
    /// A `None` cache leaves the environment untouched.
    pub(crate) fn enter(cache: Option<&CredentialCache>) -> Self {
        let Some(cache) = cache else {
            return Self { previous: None };
        };

        let previous = std::env::var_os(KRB5CCNAME);
        debug!(ccache = %cache.krb5ccname(), "scoping KRB5CCNAME");
        // SAFETY: handlers run on the caller's thread; the environment is restored on drop.
        unsafe { std::env::set_var(KRB5CCNAME, cache.krb5ccname()) };

        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for ScopedCcache {
    fn drop(&mut self) {
        match self.previous.take() {
            None => {}
            // SAFETY: see `ScopedCcache::enter`.
            Some(Some(value)) => unsafe { std::env::set_var(KRB5CCNAME, value) },
            Some(None) => unsafe { std::env::remove_var(KRB5CCNAME) },
        }
    }
}
