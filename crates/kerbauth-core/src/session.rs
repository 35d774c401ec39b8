use url::Url;

use crate::KerbAuthError;

/// The HTTP session a handler is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    url: Url,
}

impl Session {
    pub fn new(url: &str) -> Result<Self, KerbAuthError> {
        let url = Url::parse(url)
            .map_err(|e| KerbAuthError::InvalidSession(format!("{url}: {e}").into()))?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, KerbAuthError> {
        if url.host_str().is_none_or(str::is_empty) {
            return Err(KerbAuthError::InvalidSession("url has no host".into()));
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Host-based service name `HTTP@<host>`, with `hostname_override` taking precedence.
    pub fn service_name(&self, hostname_override: Option<&str>) -> String {
        format!("HTTP@{}", hostname_override.unwrap_or_else(|| self.host()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_uses_url_host() {
        let session = Session::new("https://sts.example.com:8443/adfs/ls").expect("valid url");
        assert_eq!(session.host(), "sts.example.com");
        assert_eq!(session.service_name(None), "HTTP@sts.example.com");
    }

    #[test]
    fn hostname_override_wins() {
        let session = Session::new("http://10.0.0.5/").expect("valid url");
        assert_eq!(
            session.service_name(Some("sts.corp.local")),
            "HTTP@sts.corp.local"
        );
    }

    #[test]
    fn rejects_urls_without_host() {
        assert!(matches!(
            Session::new("not a url"),
            Err(KerbAuthError::InvalidSession(_))
        ));
        assert!(matches!(
            Session::new("file:///etc/krb5.conf"),
            Err(KerbAuthError::InvalidSession(_))
        ));
    }
}
