use super::{load_credential, login};
use crate::args::{TgsArgs, TgtArgs};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::kerberos::ccache::write_ccache_file;
use crate::kerberos::engine::IssuedTicket;
use crate::kerberos::kdc::{self, to_ccache};
use crate::kerberos::spec::split_target;
use crate::kerberos::{KdcEngine, TargetDescriptor};
use std::path::Path;

pub fn tgt(args: &TgtArgs, ctx: &RunContext) -> Result<()> {
    let credential = load_credential(&args.connection)?;
    let kdc = kdc::connect(&credential.endpoint, ctx)?;

    let session = login(&kdc, &credential)?;
    save(&session, &args.out_file)?;

    println!(
        "[+] Saved TGT for {} in {}",
        credential.target(),
        args.out_file.display()
    );
    Ok(())
}

pub fn tgs(args: &TgsArgs, ctx: &RunContext) -> Result<()> {
    let credential = load_credential(&args.connection)?;
    let service = service_target(&args.spn, &credential.realm)?;
    let kdc = kdc::connect(&credential.endpoint, ctx)?;

    let session = login(&kdc, &credential)?;
    let issued = kdc
        .request_service_credential(&session, &service)
        .map_err(|e| Error::Ticket(format!("{}: {}", service, e)))?;
    save(&issued, &args.out_file)?;

    println!(
        "[+] Saved TGS for {} in {}",
        service,
        args.out_file.display()
    );
    Ok(())
}

/// `<realm>/<name>`, or a bare name in the realm of the credential.
fn service_target(spn: &str, default_realm: &str) -> Result<TargetDescriptor> {
    let (realm, name) = split_target(spn)?;
    Ok(TargetDescriptor::new(realm.unwrap_or(default_realm), name))
}

fn save(issued: &IssuedTicket, path: &Path) -> Result<()> {
    write_ccache_file(&to_ccache(issued), path)
        .map_err(|e| Error::Ccache(format!("cannot write {}: {}", path.display(), e)))
}
