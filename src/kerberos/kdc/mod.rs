//! Network protocol engine: AS and TGS exchanges with a KDC over TCP.

mod channel;
mod forge;
mod network;

pub use channel::{KrbChannel, TcpChannel, KERBEROS_PORT};
pub use network::NetworkKdc;

use super::ccache::{unix_now, CcacheFile, Credential, Keyblock, Principal};
use super::engine::IssuedTicket;
use crate::context::RunContext;
use crate::error::{Error, Result};
use kerberos_constants::principal_names;

const TICKET_FLAG_FORWARDABLE: u32 = 0x4000_0000;
const TICKET_FLAG_RENEWABLE: u32 = 0x0080_0000;
const TICKET_FLAG_INITIAL: u32 = 0x0040_0000;
const TICKET_FLAG_PRE_AUTHENT: u32 = 0x0020_0000;

// Default AD policy: 10 hour tickets renewable for 7 days.
const TICKET_LIFETIME_SECS: u32 = 10 * 3600;
const RENEW_LIFETIME_SECS: u32 = 7 * 24 * 3600;

pub fn connect(host: &str, ctx: &RunContext) -> Result<NetworkKdc<TcpChannel>> {
    let channel = TcpChannel::new(host, ctx.timeout).map_err(|e| Error::Ticket(format!(
        "cannot reach KDC {}: {}",
        host, e
    )))?;
    log::debug!("Using KDC {}", channel.address());
    Ok(NetworkKdc::new(channel, ctx.trace_packets()))
}

/// Wraps an issued ticket in a single-entry v4 ccache. Lifetimes are the
/// domain defaults, not the ones granted by the KDC.
pub fn to_ccache(issued: &IssuedTicket) -> CcacheFile {
    let now = unix_now();
    let is_tgt = issued
        .service
        .first()
        .map_or(false, |s| s.eq_ignore_ascii_case("krbtgt"));

    let mut flags = TICKET_FLAG_FORWARDABLE | TICKET_FLAG_RENEWABLE | TICKET_FLAG_PRE_AUTHENT;
    if is_tgt {
        flags |= TICKET_FLAG_INITIAL;
    }

    CcacheFile::single(Credential {
        client: Principal::new(
            principal_names::NT_PRINCIPAL,
            issued.client.realm.to_uppercase(),
            vec![issued.client.username.clone()],
        ),
        server: Principal::new(
            principal_names::NT_SRV_INST,
            issued.service_realm.clone(),
            issued.service.clone(),
        ),
        key: Keyblock {
            keytype: issued.key.etype as u16,
            keyvalue: issued.key.value.clone(),
        },
        auth_time: now,
        start_time: now,
        end_time: now.saturating_add(TICKET_LIFETIME_SECS),
        renew_till: now.saturating_add(RENEW_LIFETIME_SECS),
        is_skey: 0,
        ticket_flags: flags,
        addresses: Vec::new(),
        authdata: Vec::new(),
        ticket: issued.ticket.clone(),
        second_ticket: Vec::new(),
    })
}
