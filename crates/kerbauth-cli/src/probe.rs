use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kerbauth_core::{AuthHandler, HttpResponse, KerbAuthError, Session};
use tracing::{debug, error, info, info_span, instrument, warn};

/// Upper bound on challenge/response rounds before giving up.
const MAX_ROUNDS: usize = 5;

pub struct UreqProbe {
    agent: ureq::Agent,
}

impl UreqProbe {
    pub fn new() -> anyhow::Result<Self> {
        let tls = native_tls::TlsConnector::new().context("failed to create TLS connector")?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(60))
            .tls_connector(Arc::new(tls))
            .build();
        Ok(Self { agent })
    }

    fn send(&self, url: &str, authorization: &str) -> anyhow::Result<HttpResponse> {
        let span = info_span!("http.request", url = %url);
        let _enter = span.enter();

        let request = self.agent.get(url).set("Authorization", authorization);

        // 401 is the expected answer while the handshake is in flight
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                debug!(status, "received status response");
                response
            }
            Err(e) => {
                error!(error = %e, "request failed");
                return Err(e.into());
            }
        };

        let headers: Vec<(String, String)> = response
            .headers_names()
            .iter()
            .filter_map(|name| {
                response
                    .header(name)
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect();

        info!(status_code = response.status(), "response received");
        Ok(HttpResponse::new(response.status(), headers))
    }

    /// Drives `handler` against `session` until the server stops challenging.
    ///
    /// Returns the status code of the final response.
    #[instrument(name = "probe", level = "info", skip_all, fields(url = %session.url(), scheme = handler.scheme()))]
    pub fn run(&self, session: &Session, mut handler: AuthHandler) -> anyhow::Result<u16> {
        let url = session.url().as_str();
        authenticate(&mut handler, |authorization| self.send(url, authorization))
    }
}

/// The part of a handler the challenge loop drives.
pub trait Handshake {
    fn scheme(&self) -> &'static str;

    fn step(&mut self, response: Option<&HttpResponse>) -> Result<Option<String>, KerbAuthError>;
}

impl Handshake for AuthHandler {
    fn scheme(&self) -> &'static str {
        Self::scheme(self)
    }

    fn step(&mut self, response: Option<&HttpResponse>) -> Result<Option<String>, KerbAuthError> {
        Self::step(self, response)
    }
}

/// Sends each header the handshake produces through `send` and answers the server's challenges.
pub fn authenticate<H, F>(handshake: &mut H, mut send: F) -> anyhow::Result<u16>
where
    H: Handshake,
    F: FnMut(&str) -> anyhow::Result<HttpResponse>,
{
    let mut challenge: Option<HttpResponse> = None;

    for round in 1..=MAX_ROUNDS {
        let Some(header) = handshake
            .step(challenge.as_ref())
            .context("failed to produce an authorization header")?
        else {
            anyhow::bail!("handler finished but the server is still challenging");
        };

        debug!(round, "sending authenticated request");
        let response = send(&header)?;

        if !response.is_unauthorized() {
            if !response.is_success() {
                warn!(
                    status = response.status_code,
                    "server stopped challenging without success"
                );
            }
            // lets the Kerberos handler check the server's mutual authentication token
            if handshake
                .step(Some(&response))
                .context("failed to verify the server response")?
                .is_some()
            {
                warn!("handler produced a token after the server accepted the request");
            }
            return Ok(response.status_code);
        }

        if !response.offers_scheme(handshake.scheme()) {
            anyhow::bail!(
                "server does not offer {} authentication (status {})",
                handshake.scheme(),
                response.status_code
            );
        }
        challenge = Some(response);
    }

    anyhow::bail!("authentication did not finish after {MAX_ROUNDS} rounds")
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use base64::Engine;
    use kerbauth_core::NtlmHandler;

    use super::*;

    fn reply(status: u16, authenticate: &[&str]) -> HttpResponse {
        HttpResponse::new(
            status,
            authenticate
                .iter()
                .map(|value| ("WWW-Authenticate".to_owned(), (*value).to_owned()))
                .collect(),
        )
    }

    /// Answers requests from a fixed script and records the `Authorization` values.
    struct ScriptedServer {
        replies: VecDeque<HttpResponse>,
        requests: Vec<String>,
    }

    impl ScriptedServer {
        fn new(replies: impl IntoIterator<Item = HttpResponse>) -> Self {
            Self {
                replies: replies.into_iter().collect(),
                requests: Vec::new(),
            }
        }

        fn send(&mut self, authorization: &str) -> anyhow::Result<HttpResponse> {
            self.requests.push(authorization.to_owned());
            self.replies.pop_front().context("server script exhausted")
        }
    }

    fn ntlm_handler() -> AuthHandler {
        let session = Session::new("https://sts.corp.local/adfs/ls/").expect("valid url");
        AuthHandler::Ntlm(NtlmHandler::new("CORP", "bob", "hunter2", &session).expect("handler"))
    }

    /// NTLM CHALLENGE message with `Domain`/`Server` names and a timestamp AV pair.
    fn ntlm_challenge_header() -> String {
        fn utf16(value: &str) -> Vec<u8> {
            value.encode_utf16().flat_map(u16::to_le_bytes).collect()
        }
        fn av_pair(id: u16, value: &[u8]) -> Vec<u8> {
            let len = u16::try_from(value.len()).expect("short AV value");
            [&id.to_le_bytes()[..], &len.to_le_bytes()[..], value].concat()
        }

        let target_info = [
            av_pair(2, &utf16("Domain")),
            av_pair(1, &utf16("Server")),
            av_pair(7, &0x01d9_0000_0000_0000_u64.to_le_bytes()),
            av_pair(0, &[]),
        ]
        .concat();
        let info_len = u16::try_from(target_info.len()).expect("short target info");

        let parts: [&[u8]; 14] = [
            b"NTLMSSP\0",
            &2_u32.to_le_bytes(),
            &12_u16.to_le_bytes(),
            &12_u16.to_le_bytes(),
            &56_u32.to_le_bytes(),
            &0xe28a_8233_u32.to_le_bytes(),
            &[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef],
            &[0; 8],
            &info_len.to_le_bytes(),
            &info_len.to_le_bytes(),
            &68_u32.to_le_bytes(),
            &[0x06, 0x00, 0x70, 0x17, 0x00, 0x00, 0x00, 0x0f],
            &utf16("Server"),
            &target_info,
        ];
        let message = parts.concat();

        format!(
            "NTLM {}",
            base64::engine::general_purpose::STANDARD.encode(message)
        )
    }

    #[test]
    fn ntlm_handshake_answers_the_challenge() {
        let mut server = ScriptedServer::new([
            reply(401, &[&ntlm_challenge_header()]),
            reply(200, &[]),
        ]);

        let status = authenticate(&mut ntlm_handler(), |auth| server.send(auth)).expect("handshake");

        assert_eq!(status, 200);
        assert_eq!(server.requests.len(), 2);
        // base64 of "NTLMSSP\0" followed by the message type
        assert!(server.requests[0].starts_with("NTLM TlRMTVNTUAAB"));
        assert!(server.requests[1].starts_with("NTLM TlRMTVNTUAAD"));
    }

    #[test]
    fn finished_handler_cannot_answer_another_challenge() {
        let mut server = ScriptedServer::new([
            reply(401, &[&ntlm_challenge_header()]),
            reply(401, &["NTLM"]),
        ]);

        let err = authenticate(&mut ntlm_handler(), |auth| server.send(auth))
            .expect_err("server keeps challenging");

        assert!(err.to_string().contains("still challenging"), "{err:#}");
        assert_eq!(server.requests.len(), 2);
    }

    #[test]
    fn bails_when_server_does_not_offer_the_scheme() {
        let mut server = ScriptedServer::new([reply(401, &["Negotiate", "Basic realm=\"corp\""])]);

        let err = authenticate(&mut ntlm_handler(), |auth| server.send(auth))
            .expect_err("NTLM is not offered");

        assert_eq!(
            err.to_string(),
            "server does not offer NTLM authentication (status 401)"
        );
        assert_eq!(server.requests.len(), 1);
    }

    /// Produces a header for every challenge and fails verification of accepted responses.
    struct ScriptedHandshake {
        steps: usize,
    }

    impl Handshake for ScriptedHandshake {
        fn scheme(&self) -> &'static str {
            "Negotiate"
        }

        fn step(&mut self, response: Option<&HttpResponse>) -> Result<Option<String>, KerbAuthError> {
            self.steps += 1;
            match response {
                Some(response) if !response.is_unauthorized() => Err(KerbAuthError::Auth(
                    "server did not return a mutual authentication token",
                )),
                _ => Ok(Some("Negotiate AQID".to_owned())),
            }
        }
    }

    #[test]
    fn gives_up_after_max_rounds() {
        let mut handshake = ScriptedHandshake { steps: 0 };
        let mut sent = 0;

        let err = authenticate(&mut handshake, |_| {
            sent += 1;
            Ok(reply(401, &["Negotiate AQID"]))
        })
        .expect_err("endless challenges");

        assert_eq!(err.to_string(), "authentication did not finish after 5 rounds");
        assert_eq!(sent, MAX_ROUNDS);
    }

    #[test]
    fn accepted_response_is_verified_by_the_handler() {
        let mut handshake = ScriptedHandshake { steps: 0 };
        let mut server = ScriptedServer::new([reply(200, &[])]);

        let err = authenticate(&mut handshake, |auth| server.send(auth))
            .expect_err("verification fails");

        let message = format!("{err:#}");
        assert!(message.contains("failed to verify the server response"), "{message}");
        assert!(message.contains("mutual authentication token"), "{message}");
        assert_eq!(handshake.steps, 2);
    }
}
