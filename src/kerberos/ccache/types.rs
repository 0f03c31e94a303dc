use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CCACHE_V3: u16 = 0x0503;
pub const CCACHE_V4: u16 = 0x0504;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcacheFile {
    pub version: u16,
    pub default_principal: Principal,
    pub credentials: Vec<Credential>,
}

impl CcacheFile {
    pub fn single(credential: Credential) -> Self {
        Self {
            version: CCACHE_V4,
            default_principal: credential.client.clone(),
            credentials: vec![credential],
        }
    }

    /// First ticket-granting ticket that has not expired yet.
    pub fn find_tgt(&self) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|cred| cred.is_tgt() && !cred.is_expired())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name_type: u32,
    pub realm: String,
    pub components: Vec<String>,
}

impl Principal {
    pub fn new(name_type: i32, realm: impl Into<String>, components: Vec<String>) -> Self {
        Self {
            name_type: name_type as u32,
            realm: realm.into(),
            components,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.components.join("/"), self.realm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub addr_type: u16,
    pub addr_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    pub ad_type: u16,
    pub ad_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyblock {
    pub keytype: u16,
    pub keyvalue: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub client: Principal,
    pub server: Principal,
    pub key: Keyblock,
    pub auth_time: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub renew_till: u32,
    pub is_skey: u8,
    pub ticket_flags: u32,
    pub addresses: Vec<Address>,
    pub authdata: Vec<AuthData>,
    pub ticket: Vec<u8>,
    pub second_ticket: Vec<u8>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        self.end_time != 0 && self.end_time < unix_now()
    }

    pub fn is_tgt(&self) -> bool {
        self.server
            .components
            .first()
            .map_or(false, |s| s.eq_ignore_ascii_case("krbtgt"))
    }
}

pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default()
}
