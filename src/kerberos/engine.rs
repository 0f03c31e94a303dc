//! Boundaries to the collaborators that actually talk Kerberos: a KDC
//! reachable over the network and the OS ticket API of the logged-on user.

use super::etype::EncryptionTypeSet;
use super::hash::RoastTicket;
use super::spec::{CredentialSpec, TargetDescriptor};
use thiserror::Error;

/// Why a single exchange failed. The `Display` text ends up verbatim in the
/// failure diagnostics, so it is kept short.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KdcError {
    #[error("{0}")]
    Transport(String),

    #[error("{name} ({code})")]
    Krb { code: i32, name: &'static str },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("{0}")]
    Crypto(String),

    #[error("no ticket available: {0}")]
    NoTicket(String),

    #[error("ticket encrypted with etype {0}, which was not requested")]
    EtypeRejected(i32),

    #[error("{0}")]
    Os(String),
}

impl KdcError {
    pub fn krb(code: i32) -> Self {
        KdcError::Krb {
            code,
            name: error_code_name(code),
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            KdcError::Krb { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub fn error_code_name(code: i32) -> &'static str {
    match code {
        6 => "KDC_ERR_C_PRINCIPAL_UNKNOWN",
        7 => "KDC_ERR_S_PRINCIPAL_UNKNOWN",
        12 => "KDC_ERR_POLICY",
        14 => "KDC_ERR_ETYPE_NOSUPP",
        18 => "KDC_ERR_CLIENT_REVOKED",
        23 => "KDC_ERR_KEY_EXPIRED",
        24 => "KDC_ERR_PREAUTH_FAILED",
        25 => "KDC_ERR_PREAUTH_REQUIRED",
        31 => "KRB_AP_ERR_BAD_INTEGRITY",
        32 => "KRB_AP_ERR_TKT_EXPIRED",
        37 => "KRB_AP_ERR_SKEW",
        41 => "KRB_AP_ERR_MODIFIED",
        60 => "KRB_ERR_GENERIC",
        68 => "KDC_ERR_WRONG_REALM",
        _ => "KRB_ERROR",
    }
}

/// Session key of an issued ticket.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub etype: i32,
    pub value: Vec<u8>,
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("etype", &self.etype)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// A ticket together with what is needed to use it: the client it was
/// issued to, the service it is for and its session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTicket {
    pub client: TargetDescriptor,
    pub service_realm: String,
    pub service: Vec<String>,
    /// DER encoded `Ticket`.
    pub ticket: Vec<u8>,
    pub key: SessionKey,
}

/// Authenticated state used by service-ticket roasting. It is the TGT of
/// the credential given on the command line and is shared read-only by
/// every attempt of a batch.
pub type KdcSession = IssuedTicket;

/// Outcome of probing a username without pre-authentication data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserProbe {
    Exists,
    /// The KDC answered with an AS-REP straight away.
    ExistsWithoutPreauth,
    Unknown,
}

impl UserProbe {
    pub fn exists(self) -> bool {
        !matches!(self, UserProbe::Unknown)
    }
}

pub trait KdcEngine: Sync {
    /// AS-REQ with no pre-authentication, returning the roastable part of
    /// the AS-REP.
    fn request_as_rep(
        &self,
        target: &TargetDescriptor,
        etypes: &EncryptionTypeSet,
    ) -> Result<RoastTicket, KdcError>;

    /// Obtains a TGT for `credential`.
    fn authenticate(&self, credential: &CredentialSpec) -> Result<KdcSession, KdcError>;

    /// TGS-REQ for a user account, returning the roastable part of the
    /// service ticket.
    fn request_service_ticket(
        &self,
        session: &KdcSession,
        target: &TargetDescriptor,
        etypes: &EncryptionTypeSet,
    ) -> Result<RoastTicket, KdcError>;

    /// TGS-REQ for `service`, keeping the session key so the ticket can be
    /// stored in a cache.
    fn request_service_credential(
        &self,
        session: &KdcSession,
        service: &TargetDescriptor,
    ) -> Result<IssuedTicket, KdcError>;

    fn probe_username(&self, realm: &str, username: &str) -> Result<UserProbe, KdcError>;
}

/// Service tickets from the OS credential store of the current logon
/// session.
pub trait TicketHarvester: Sync {
    /// Returns the DER encoded ticket for the account.
    fn service_ticket(&self, target: &TargetDescriptor) -> Result<Vec<u8>, KdcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn krb_errors_are_named() {
        let err = KdcError::krb(25);
        assert_eq!(err.to_string(), "KDC_ERR_PREAUTH_REQUIRED (25)");
        assert_eq!(err.code(), Some(25));
        assert_eq!(KdcError::krb(99).to_string(), "KRB_ERROR (99)");
        assert_eq!(KdcError::Transport("timed out".into()).code(), None);
    }

    #[test]
    fn only_unknown_principals_do_not_exist() {
        assert!(UserProbe::Exists.exists());
        assert!(UserProbe::ExistsWithoutPreauth.exists());
        assert!(!UserProbe::Unknown.exists());
    }

    #[test]
    fn session_key_debug_hides_value() {
        let key = SessionKey {
            etype: 18,
            value: vec![0xAB; 32],
        };
        assert!(!format!("{key:?}").contains("171"));
    }
}
