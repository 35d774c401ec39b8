use base64::Engine;

/// The parts of an HTTP response a handler needs to answer a challenge.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn new(status_code: u16, headers: Vec<(String, String)>) -> Self {
        Self {
            status_code,
            headers,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code == 401
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Whether any `WWW-Authenticate` header offers `scheme`, with or without a token.
    pub fn offers_scheme(&self, scheme: &str) -> bool {
        self.authenticate_values()
            .any(|value| split_scheme(value).0.eq_ignore_ascii_case(scheme))
    }

    /// Decoded token of the first `WWW-Authenticate: <scheme> <base64>` header.
    ///
    /// Header names and the scheme are matched case-insensitively; values that are not valid
    /// base64 are skipped.
    pub fn challenge_token(&self, scheme: &str) -> Option<Vec<u8>> {
        self.authenticate_values().find_map(|value| {
            let (name, rest) = split_scheme(value);
            if !name.eq_ignore_ascii_case(scheme) || rest.is_empty() {
                return None;
            }
            base64::engine::general_purpose::STANDARD.decode(rest).ok()
        })
    }

    fn authenticate_values(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case("www-authenticate"))
            .map(|(_, value)| value.as_str())
    }
}

fn split_scheme(value: &str) -> (&str, &str) {
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, rest)) => (scheme, rest.trim()),
        None => (value, ""),
    }
}

/// `Authorization` header value for a token, `None` when the token is empty.
pub fn authorization_header(scheme: &str, token: &[u8]) -> Option<String> {
    if token.is_empty() {
        None
    } else {
        Some(format!(
            "{scheme} {}",
            base64::engine::general_purpose::STANDARD.encode(token)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse::new(
            status,
            headers
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        )
    }

    #[test]
    fn challenge_token_is_case_insensitive() {
        let resp = response(401, &[("WWW-AUTHENTICATE", "negotiate AQID")]);
        assert_eq!(resp.challenge_token("Negotiate"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn challenge_token_picks_requested_scheme() {
        let resp = response(
            401,
            &[
                ("www-authenticate", "Basic realm=\"corp\""),
                ("www-authenticate", "NTLM TlRMTVNTUAAC"),
                ("www-authenticate", "Negotiate AQID"),
            ],
        );
        assert_eq!(resp.challenge_token("Negotiate"), Some(vec![1, 2, 3]));
        assert!(resp.challenge_token("NTLM").is_some());
    }

    #[test]
    fn bare_scheme_is_offered_without_token() {
        let resp = response(401, &[("WWW-Authenticate", "NTLM")]);
        assert!(resp.offers_scheme("ntlm"));
        assert_eq!(resp.challenge_token("NTLM"), None);
        assert!(!resp.offers_scheme("Negotiate"));
    }

    #[test]
    fn invalid_base64_is_ignored() {
        let resp = response(401, &[("WWW-Authenticate", "Negotiate !!!")]);
        assert_eq!(resp.challenge_token("Negotiate"), None);
    }

    #[test]
    fn authorization_header_encodes_token() {
        assert_eq!(
            authorization_header("Negotiate", &[1, 2, 3]).as_deref(),
            Some("Negotiate AQID")
        );
        assert_eq!(authorization_header("NTLM", &[]), None);
    }

    #[test]
    fn status_helpers() {
        assert!(response(401, &[]).is_unauthorized());
        assert!(response(204, &[]).is_success());
        assert!(!response(500, &[]).is_success());
    }
}
