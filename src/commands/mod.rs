//! One entry point per subcommand. Configuration problems come back as
//! [`Error`]; per-target failures are rendered and never fail the command.

pub mod auto;
pub mod brute;
pub mod enumerate;
pub mod roast;
pub mod tickets;

use crate::args::Command;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::kerberos::engine::{KdcEngine, KdcSession};
use crate::kerberos::{CredentialSpec, SecretKind};
use dialoguer::Password;

pub fn run(command: &Command, ctx: &RunContext) -> Result<()> {
    match command {
        Command::Ldap(args) => enumerate::run(args, ctx),
        Command::Brute(args) => brute::run(args, ctx),
        Command::Asreproast(args) => roast::asreproast(args, ctx),
        Command::Spnroast(args) => roast::spnroast(args, ctx),
        Command::SpnroastSspi(args) => roast::spnroast_sspi(args, ctx),
        Command::Tgt(args) => tickets::tgt(args, ctx),
        Command::Tgs(args) => tickets::tgs(args, ctx),
        Command::Auto(args) => auto::run(args, ctx),
    }
}

/// Parses a connection string, asking for the password when the `password`
/// kind comes with an empty secret.
pub fn load_credential(connection: &str) -> Result<CredentialSpec> {
    let credential: CredentialSpec = connection.parse()?;
    if credential.secret_kind != SecretKind::Password || !credential.secret.is_empty() {
        return Ok(credential);
    }

    let password = Password::new()
        .with_prompt(format!("Password for {}", credential.target()))
        .interact()
        .map_err(|e| Error::Credential(format!("cannot read password: {}", e)))?;

    Ok(credential.with_secret(password))
}

/// Gets the TGT every service ticket request of the run is made with.
pub fn login(kdc: &dyn KdcEngine, credential: &CredentialSpec) -> Result<KdcSession> {
    log::debug!(
        "Authenticating as {} with {}",
        credential.target(),
        credential.secret_kind
    );

    kdc.authenticate(credential)
        .map_err(|e| Error::Authentication {
            principal: credential.target().principal(),
            reason: e.to_string(),
        })
}
