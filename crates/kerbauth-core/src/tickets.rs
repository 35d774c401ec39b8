//! Ticket acquisition through the host's `kinit` and `klist`.

use std::fmt::{self, Display};
use std::path::Path;

use tracing::{debug, error, info, instrument};

use crate::KerbAuthError;
use crate::ccache::CredentialCache;
use crate::command::{CommandOutcome, CommandRunner, Invocation};
use crate::config::KerberosTools;
use crate::credentials::Principal;

/// Which acquisition path failed; drives the error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketOrigin {
    Password { principal: String },
    Ambient,
    Keytab { principal: String },
}

impl Display for TicketOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { principal } => {
                write!(f, "failed to generate a kerberos ticket for principal {principal}")
            }
            Self::Ambient => write!(f, "failed to generate a kerberos ticket"),
            Self::Keytab { .. } => write!(f, "could not generate a valid ticket for the given keytab"),
        }
    }
}

pub struct TicketAcquirer<'a> {
    runner: &'a dyn CommandRunner,
    tools: &'a KerberosTools,
}

impl<'a> TicketAcquirer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, tools: &'a KerberosTools) -> Self {
        Self { runner, tools }
    }

    /// `kinit <principal>` with the password typed at its terminal prompt.
    #[instrument(name = "tickets.password", level = "info", skip_all, fields(principal = %principal))]
    pub fn acquire_with_password(
        &self,
        principal: &Principal,
        password: &str,
    ) -> Result<(), KerbAuthError> {
        let command = Invocation::new(self.tools.kinit_program())
            .arg(principal.to_string())
            .stdin_secret(password);

        let outcome = self.run(&command)?;
        if outcome.success() {
            info!("kerberos ticket generated");
            return Ok(());
        }

        error!(%principal, exit = %outcome.exit, "failed to generate a kerberos ticket for principal");
        Err(failure(
            TicketOrigin::Password {
                principal: principal.to_string(),
            },
            &command,
            outcome,
        ))
    }

    /// `klist -s`, optionally against an explicit cache. A non-zero exit means no valid ticket.
    #[instrument(name = "tickets.check", level = "debug", skip_all, fields(ccache = ?cache.map(CredentialCache::krb5ccname)))]
    pub fn has_valid_ticket(&self, cache: Option<&CredentialCache>) -> Result<bool, KerbAuthError> {
        let mut command = Invocation::new(self.tools.klist_program()).arg("-s");
        if let Some(cache) = cache {
            command = command.arg("-c").arg(cache.path().to_string_lossy());
        }

        let outcome = self.run(&command)?;
        debug!(exit = %outcome.exit, "ticket check finished");
        Ok(outcome.success())
    }

    /// Reuses a valid ticket when there is one, otherwise runs a bare `kinit` for the logged-in
    /// identity.
    ///
    /// A failed check is expected and only triggers the fallback; a failed `kinit` is fatal.
    #[instrument(name = "tickets.ambient", level = "info", skip_all)]
    pub fn ensure_ambient_ticket(&self) -> Result<(), KerbAuthError> {
        if self.has_valid_ticket(None)? {
            debug!("existing kerberos ticket is valid");
            return Ok(());
        }

        info!("no kerberos ticket found. running kinit");
        let command = Invocation::new(self.tools.kinit_program());
        let outcome = self.run(&command)?;
        if outcome.success() {
            info!("kerberos ticket generated");
            return Ok(());
        }

        error!(exit = %outcome.exit, "failed to generate a kerberos ticket");
        Err(failure(TicketOrigin::Ambient, &command, outcome))
    }

    /// `kinit -c <cache> -kt <keytab> <principal>`
    #[instrument(
        name = "tickets.keytab",
        level = "info",
        skip_all,
        fields(principal = %principal, keytab = %keytab.display(), ccache = %cache.krb5ccname())
    )]
    pub fn acquire_with_keytab(
        &self,
        principal: &Principal,
        keytab: &Path,
        cache: &CredentialCache,
    ) -> Result<(), KerbAuthError> {
        let command = Invocation::new(self.tools.kinit_program())
            .arg("-c")
            .arg(cache.path().to_string_lossy())
            .arg("-kt")
            .arg(keytab.to_string_lossy())
            .arg(principal.to_string());

        let outcome = self.run(&command)?;
        if outcome.success() {
            info!("kerberos ticket generated from keytab");
            return Ok(());
        }

        error!(exit = %outcome.exit, "could not generate a valid ticket for the given keytab");
        Err(failure(
            TicketOrigin::Keytab {
                principal: principal.to_string(),
            },
            &command,
            outcome,
        ))
    }

    fn run(&self, command: &Invocation) -> Result<CommandOutcome, KerbAuthError> {
        debug!(command = %command.command_line(), "running kerberos tool");
        self.runner.run(command).map_err(|source| {
            error!(program = command.program(), %source, "failed to start kerberos tool");
            KerbAuthError::CommandSpawn {
                program: command.program().to_owned(),
                source,
            }
        })
    }
}

fn failure(origin: TicketOrigin, command: &Invocation, outcome: CommandOutcome) -> KerbAuthError {
    KerbAuthError::TicketAcquisitionFailed {
        origin,
        tool: command.program().to_owned(),
        exit: outcome.exit,
        stderr: outcome.stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ToolExit;

    #[test]
    fn keytab_failure_message() {
        let err = failure(
            TicketOrigin::Keytab {
                principal: "svc@EXAMPLE.COM".into(),
            },
            &Invocation::new("kinit"),
            CommandOutcome {
                exit: ToolExit(Some(1)),
                stderr: "Keytab contains no suitable keys".into(),
            },
        );

        assert_eq!(
            err.to_string(),
            "could not generate a valid ticket for the given keytab: `kinit` exited with status 1 \
             (Keytab contains no suitable keys)"
        );
    }

    #[test]
    fn password_failure_names_principal() {
        let err = failure(
            TicketOrigin::Password {
                principal: "alice@EXAMPLE.COM".into(),
            },
            &Invocation::new("/usr/bin/kinit"),
            CommandOutcome::from_code(1),
        );

        assert_eq!(
            err.to_string(),
            "failed to generate a kerberos ticket for principal alice@EXAMPLE.COM: \
             `/usr/bin/kinit` exited with status 1"
        );
    }
}
