//! Per-session handlers that turn server challenges into `Authorization` header values.

use std::fmt::Debug;

use sspi::generator::GeneratorState;
use sspi::ntlm::NtlmConfig;
use sspi::{
    BufferType, ClientRequestFlags, CredentialUse, DataRepresentation, Ntlm, SecurityBuffer,
    SecurityStatus, Sspi, SspiImpl,
};
use tracing::{debug, instrument, warn};

use crate::KerbAuthError;
use crate::ccache::CredentialCache;
use crate::config::MutualAuthentication;
use crate::credentials::{ClientAuthIdentity, ClientUserName, down_level_identity};
use crate::http::{HttpResponse, authorization_header};
use crate::session::Session;

pub const NEGOTIATE_SCHEME: &str = "Negotiate";
pub const NTLM_SCHEME: &str = "NTLM";

/// A ready-to-use handler produced by an [`Authenticator`](crate::Authenticator).
///
/// The HTTP client calls [`AuthHandler::step`] with `None` before the first request (or with the
/// initial 401), then with every following response until it returns `Ok(None)`.
#[derive(Debug)]
pub enum AuthHandler {
    Kerberos(KerberosHandler),
    Ntlm(NtlmHandler),
}

impl AuthHandler {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Kerberos(_) => NEGOTIATE_SCHEME,
            Self::Ntlm(_) => NTLM_SCHEME,
        }
    }

    pub fn step(&mut self, response: Option<&HttpResponse>) -> Result<Option<String>, KerbAuthError> {
        match self {
            Self::Kerberos(handler) => handler.step(response),
            Self::Ntlm(handler) => handler.step(response),
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Self::Kerberos(handler) => handler.is_complete(),
            Self::Ntlm(handler) => handler.is_complete(),
        }
    }
}

/// Caller-owned sspi provider plus its outbound credential handle.
struct SspiContext<P: Sspi> {
    provider: P,
    // Box<T> keeps the handle at a stable address while a builder borrows it.
    cred: Box<P::CredentialsHandle>,
}

impl<P> SspiContext<P>
where
    P: Sspi + SspiImpl<AuthenticationData = sspi::AuthIdentity>,
{
    fn new_with_identity(mut provider: P, id: ClientAuthIdentity) -> Result<Self, KerbAuthError> {
        let id: sspi::AuthIdentity = id.into_inner();
        let acq = provider
            .acquire_credentials_handle()
            .with_credential_use(CredentialUse::Outbound)
            .with_auth_data(&id);
        let cred = acq.execute(&mut provider)?.credentials_handle;

        Ok(Self {
            provider,
            cred: Box::new(cred),
        })
    }

    /// One `InitializeSecurityContext` round. Returns the status and the produced token.
    fn initialize(
        &mut self,
        input: Option<Vec<u8>>,
    ) -> Result<(SecurityStatus, Vec<u8>), KerbAuthError> {
        let mut out = [SecurityBuffer::new(Vec::new(), BufferType::Token)];
        let mut inbuf = input.map(|token| [SecurityBuffer::new(token, BufferType::Token)]);

        let status = {
            let mut isc = self
                .provider
                .initialize_security_context()
                .with_credentials_handle(&mut *self.cred)
                .with_context_requirements(
                    ClientRequestFlags::CONFIDENTIALITY | ClientRequestFlags::ALLOCATE_MEMORY,
                )
                .with_target_data_representation(DataRepresentation::Native)
                .with_output(&mut out);

            if let Some(input_buffer) = inbuf.as_mut() {
                isc = isc.with_input(input_buffer);
            }

            let mut generator = self.provider.initialize_security_context_impl(&mut isc)?;
            match generator.start() {
                GeneratorState::Completed(result) => result?.status,
                // NTLM never talks to a KDC
                GeneratorState::Suspended(_) => {
                    return Err(KerbAuthError::Auth(
                        "security provider requested an unexpected network round-trip",
                    ));
                }
            }
        };

        let [produced] = out;
        Ok((status, produced.buffer))
    }
}

/// NTLM handler bound to a session, driven by sspi's NTLM provider.
pub struct NtlmHandler {
    identity: String,
    session: Session,
    context: SspiContext<Ntlm>,
    started: bool,
    complete: bool,
}

impl Debug for NtlmHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtlmHandler")
            .field("identity", &self.identity)
            .field("session", &self.session)
            .field("started", &self.started)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

impl NtlmHandler {
    pub fn new(
        domain: &str,
        username: &str,
        password: &str,
        session: &Session,
    ) -> Result<Self, KerbAuthError> {
        let user = ClientUserName::new(username, Some(domain))?;
        debug!(
            account = user.account_name(),
            domain = user.domain_name().unwrap_or_default(),
            "NTLM identity prepared"
        );
        let identity = ClientAuthIdentity::new(user, password.to_owned());

        let workstation = whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_owned());
        let context =
            SspiContext::new_with_identity(Ntlm::with_config(NtlmConfig::new(workstation)), identity)?;

        Ok(Self {
            identity: down_level_identity(domain, username),
            session: session.clone(),
            context,
            started: false,
            complete: false,
        })
    }

    /// `DOMAIN\username`
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// First call yields the NEGOTIATE message; the call carrying the server's CHALLENGE yields
    /// AUTHENTICATE. Later calls return `Ok(None)`.
    #[instrument(name = "ntlm.step", level = "debug", skip_all, fields(identity = %self.identity))]
    pub fn step(&mut self, response: Option<&HttpResponse>) -> Result<Option<String>, KerbAuthError> {
        if self.complete {
            return Ok(None);
        }

        let input = if self.started {
            let response =
                response.ok_or(KerbAuthError::Auth("NTLM handshake needs the server challenge"))?;
            if !response.is_unauthorized() {
                debug!(
                    status = response.status_code,
                    "server accepted the request without a challenge"
                );
                self.complete = true;
                return Ok(None);
            }
            let challenge = response
                .challenge_token(NTLM_SCHEME)
                .ok_or(KerbAuthError::Auth("no NTLM challenge in WWW-Authenticate"))?;
            Some(challenge)
        } else {
            None
        };

        let (status, token) = self.context.initialize(input)?;
        self.started = true;

        match status {
            SecurityStatus::ContinueNeeded => {
                debug!("sending NTLM negotiate message");
                authorization_header(NTLM_SCHEME, &token)
                    .map(Some)
                    .ok_or(KerbAuthError::Auth("SSPI ContinueNeeded but no token produced"))
            }
            SecurityStatus::Ok | SecurityStatus::CompleteNeeded => {
                debug!("sending NTLM authenticate message");
                self.complete = true;
                Ok(authorization_header(NTLM_SCHEME, &token))
            }
            _ => Err(KerbAuthError::Auth(
                "SSPI InitializeSecurityContext status needs to be handled",
            )),
        }
    }
}

/// SPNEGO handler relying on the ticket cache prepared by the authenticator.
pub struct KerberosHandler {
    service: String,
    mutual: MutualAuthentication,
    ccache: Option<CredentialCache>,
    complete: bool,
    #[cfg(feature = "gssapi")]
    context: Option<libgssapi::context::ClientCtx>,
}

impl Debug for KerberosHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KerberosHandler")
            .field("service", &self.service)
            .field("mutual", &self.mutual)
            .field("ccache", &self.ccache)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

impl KerberosHandler {
    pub fn new(
        session: &Session,
        hostname_override: Option<&str>,
        mutual: MutualAuthentication,
        ccache: Option<CredentialCache>,
    ) -> Self {
        Self {
            service: session.service_name(hostname_override),
            mutual,
            ccache,
            complete: false,
            #[cfg(feature = "gssapi")]
            context: None,
        }
    }

    /// Host-based service name, e.g. `HTTP@sts.example.com`.
    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn mutual(&self) -> MutualAuthentication {
        self.mutual
    }

    pub fn ccache(&self) -> Option<&CredentialCache> {
        self.ccache.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[cfg(not(feature = "gssapi"))]
    pub fn step(&mut self, _response: Option<&HttpResponse>) -> Result<Option<String>, KerbAuthError> {
        warn!(service = %self.service, "kerbauth-core was built without GSSAPI support");
        Err(KerbAuthError::GssapiUnavailable)
    }

    #[cfg(feature = "gssapi")]
    #[instrument(name = "kerberos.step", level = "debug", skip_all, fields(service = %self.service))]
    pub fn step(&mut self, response: Option<&HttpResponse>) -> Result<Option<String>, KerbAuthError> {
        use libgssapi::context::SecurityContext;

        if self.complete {
            if let Some(token) = response.and_then(|r| r.challenge_token(NEGOTIATE_SCHEME)) {
                warn!(token_len = token.len(), "ignoring Negotiate token after completion");
            }
            return Ok(None);
        }

        if self.context.is_none() {
            let (context, token) =
                gssapi::initialize(&self.service, self.mutual, self.ccache.as_ref())?;
            self.context = Some(context);
            debug!("sending initial SPNEGO token");
            return Ok(authorization_header(NEGOTIATE_SCHEME, &token));
        }

        let response =
            response.ok_or(KerbAuthError::Auth("Kerberos handshake needs the server response"))?;

        let server_token = match classify_reply(self.mutual, response)? {
            ServerReply::Token(token) => token,
            ServerReply::Accepted => {
                debug!("server accepted the token without mutual authentication");
                self.complete = true;
                return Ok(None);
            }
        };

        let context = self
            .context
            .as_mut()
            .ok_or(KerbAuthError::Auth("GSSAPI context missing"))?;
        match context
            .step(Some(server_token.as_slice()), None)
            .map_err(|e| KerbAuthError::Gssapi(format!("GSSAPI step failed: {e}")))?
        {
            Some(token) => Ok(authorization_header(NEGOTIATE_SCHEME, &token)),
            None => {
                if context.is_complete() {
                    debug!("mutual authentication verified");
                }
                self.complete = true;
                Ok(None)
            }
        }
    }
}

/// How a Kerberos handler reads a server response that follows its own token.
#[cfg_attr(not(feature = "gssapi"), allow(dead_code))]
#[derive(Debug, PartialEq, Eq)]
enum ServerReply {
    /// A Negotiate token to feed back into the security context.
    Token(Vec<u8>),
    /// The server accepted the request without sending a token.
    Accepted,
}

#[cfg_attr(not(feature = "gssapi"), allow(dead_code))]
fn classify_reply(
    mutual: MutualAuthentication,
    response: &HttpResponse,
) -> Result<ServerReply, KerbAuthError> {
    let token = response.challenge_token(NEGOTIATE_SCHEME);
    if response.is_unauthorized() {
        // a 401 may still carry the next leg of a multi-round exchange
        return token
            .map(ServerReply::Token)
            .ok_or(KerbAuthError::Auth("server rejected the Negotiate token"));
    }

    match (mutual, token) {
        (MutualAuthentication::Disabled, _) => Ok(ServerReply::Accepted),
        (_, Some(token)) => Ok(ServerReply::Token(token)),
        (MutualAuthentication::Required, None) => Err(KerbAuthError::Auth(
            "server did not return a mutual authentication token",
        )),
        (MutualAuthentication::Optional, None) => Ok(ServerReply::Accepted),
    }
}

#[cfg(feature = "gssapi")]
mod gssapi {
    use libgssapi::{
        context::{ClientCtx, CtxFlags},
        credential::{Cred, CredUsage},
        name::Name,
        oid::{GSS_MECH_KRB5, GSS_NT_HOSTBASED_SERVICE, Oid, OidSet},
    };

    use crate::KerbAuthError;
    use crate::ccache::{CredentialCache, ScopedCcache};
    use crate::config::MutualAuthentication;

    /// 1.3.6.1.5.5.2
    const GSS_MECH_SPNEGO: Oid = Oid::from_slice(&[0x2b, 0x06, 0x01, 0x05, 0x05, 0x02]);

    fn gss_err(what: &str) -> impl FnOnce(libgssapi::error::Error) -> KerbAuthError + '_ {
        move |e| KerbAuthError::Gssapi(format!("{what}: {e}"))
    }

    pub(super) fn initialize(
        service: &str,
        mutual: MutualAuthentication,
        ccache: Option<&CredentialCache>,
    ) -> Result<(ClientCtx, Vec<u8>), KerbAuthError> {
        let name = Name::new(service.as_bytes(), Some(&GSS_NT_HOSTBASED_SERVICE))
            .map_err(gss_err("failed to create service name"))?;

        let mut mechs = OidSet::new().map_err(gss_err("failed to create OID set"))?;
        mechs
            .add(&GSS_MECH_SPNEGO)
            .map_err(gss_err("failed to add SPNEGO mechanism"))?;
        mechs
            .add(&GSS_MECH_KRB5)
            .map_err(gss_err("failed to add Kerberos mechanism"))?;

        let cred = {
            let _ccache = ScopedCcache::enter(ccache);
            Cred::acquire(None, None, CredUsage::Initiate, Some(&mechs))
                .map_err(gss_err("failed to acquire credentials"))?
        };

        let mut flags = CtxFlags::GSS_C_REPLAY_FLAG | CtxFlags::GSS_C_SEQUENCE_FLAG;
        if mutual.requests_mutual() {
            flags |= CtxFlags::GSS_C_MUTUAL_FLAG;
        }

        let mut context = ClientCtx::new(Some(cred), name, flags, Some(&GSS_MECH_SPNEGO));
        let token = context
            .step(None, None)
            .map_err(gss_err("failed to initialize context"))?
            .ok_or(KerbAuthError::Auth("GSSAPI produced no initial token"))?;

        Ok((context, token.to_vec()))
    }
}
