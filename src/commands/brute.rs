use crate::args::BruteArgs;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::kerberos::engine::UserProbe;
use crate::kerberos::spec::EnumeratedUser;
use crate::kerberos::workers::run_chunked;
use crate::kerberos::{kdc, targets, KdcEngine};
use crate::output::{username_lines, OutputSink};

pub fn run(args: &BruteArgs, ctx: &RunContext) -> Result<()> {
    let usernames = targets::load_usernames(&args.targets_file)?;
    if usernames.is_empty() {
        return Err(Error::NoTargetsProvided);
    }

    let kdc = kdc::connect(&args.address, ctx)?;
    let found = enumerate_users(&kdc, &args.realm, &usernames, ctx);

    OutputSink::new(args.output.as_deref())
        .write_lines(Some("[+] Valid users"), username_lines(&found))?;
    Ok(())
}

/// Probes every username once. Errors other than an unknown principal are
/// logged and the name is left out.
pub fn enumerate_users(
    kdc: &dyn KdcEngine,
    realm: &str,
    usernames: &[String],
    ctx: &RunContext,
) -> Vec<EnumeratedUser> {
    log::info!("Probing {} username(s) in {}", usernames.len(), realm);

    let probes = run_chunked(usernames, ctx.threads, ctx.cancel_flag(), |_, username| {
        kdc.probe_username(realm, username)
    });

    let mut found = Vec::new();
    let mut not_tried = 0;
    for (username, probe) in usernames.iter().zip(probes) {
        match probe {
            Some(Ok(probe)) if probe.exists() => {
                if probe == UserProbe::ExistsWithoutPreauth {
                    log::info!("Valid user: {}/{} (no pre-authentication)", realm, username);
                } else {
                    log::info!("Valid user: {}/{}", realm, username);
                }
                found.push(EnumeratedUser::new(realm, username.as_str()));
            }
            Some(Ok(_)) => log::debug!("Unknown user: {}", username),
            Some(Err(e)) => log::warn!("{}/{}: {}", realm, username, e),
            None => not_tried += 1,
        }
    }

    if not_tried > 0 {
        log::warn!("Interrupted, {} username(s) not tried", not_tried);
    }
    log::info!("Enumerated {} users!", found.len());
    log::info!("Kerberos user enumeration complete");

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kerberos::engine::{IssuedTicket, KdcError, KdcSession};
    use crate::kerberos::hash::RoastTicket;
    use crate::kerberos::{CredentialSpec, EncryptionTypeSet, TargetDescriptor};

    struct ProbeOnly;

    impl KdcEngine for ProbeOnly {
        fn request_as_rep(
            &self,
            _target: &TargetDescriptor,
            _etypes: &EncryptionTypeSet,
        ) -> std::result::Result<RoastTicket, KdcError> {
            Err(KdcError::Transport("unused".into()))
        }

        fn authenticate(&self, _credential: &CredentialSpec) -> std::result::Result<KdcSession, KdcError> {
            Err(KdcError::Transport("unused".into()))
        }

        fn request_service_ticket(
            &self,
            _session: &KdcSession,
            _target: &TargetDescriptor,
            _etypes: &EncryptionTypeSet,
        ) -> std::result::Result<RoastTicket, KdcError> {
            Err(KdcError::Transport("unused".into()))
        }

        fn request_service_credential(
            &self,
            _session: &KdcSession,
            _service: &TargetDescriptor,
        ) -> std::result::Result<IssuedTicket, KdcError> {
            Err(KdcError::Transport("unused".into()))
        }

        fn probe_username(&self, _realm: &str, username: &str) -> std::result::Result<UserProbe, KdcError> {
            match username {
                "administrator" => Ok(UserProbe::Exists),
                "svc_backup" => Ok(UserProbe::ExistsWithoutPreauth),
                "locked" => Err(KdcError::krb(18)),
                _ => Ok(UserProbe::Unknown),
            }
        }
    }

    #[test]
    fn keeps_only_existing_users_in_order() {
        let names: Vec<String> = ["nobody", "svc_backup", "locked", "administrator"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let found = enumerate_users(&ProbeOnly, "CORP", &names, &RunContext::new(0, 5, 3));

        assert_eq!(
            found,
            vec![
                EnumeratedUser::new("CORP", "svc_backup"),
                EnumeratedUser::new("CORP", "administrator"),
            ]
        );
    }
}
