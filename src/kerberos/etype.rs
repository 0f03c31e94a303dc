use kerberos_constants::etypes;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Etype {
    Rc4,
    Aes128,
    Aes256,
}

impl Etype {
    /// Order used when every algorithm is accepted.
    pub const CANONICAL: [Etype; 3] = [Etype::Rc4, Etype::Aes128, Etype::Aes256];

    pub fn id(self) -> i32 {
        match self {
            Etype::Rc4 => etypes::RC4_HMAC,
            Etype::Aes128 => etypes::AES128_CTS_HMAC_SHA1_96,
            Etype::Aes256 => etypes::AES256_CTS_HMAC_SHA1_96,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::CANONICAL.into_iter().find(|etype| etype.id() == id)
    }

    pub fn is_aes(self) -> bool {
        matches!(self, Etype::Aes128 | Etype::Aes256)
    }
}

impl fmt::Display for Etype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// What the user asked for on the command line: one algorithm, a comma
/// separated list of them, or all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EtypeChoice {
    All,
    Only(Etype),
    List(EncryptionTypeSet),
}

impl EtypeChoice {
    pub fn resolve(&self) -> EncryptionTypeSet {
        match self {
            EtypeChoice::All => EncryptionTypeSet::new(Etype::CANONICAL),
            EtypeChoice::Only(etype) => EncryptionTypeSet::new([*etype]),
            EtypeChoice::List(set) => set.clone(),
        }
    }
}

fn parse_etype(token: &str) -> Option<Etype> {
    match token.trim().to_ascii_lowercase().as_str() {
        "23" | "rc4" => Some(Etype::Rc4),
        "17" | "aes128" => Some(Etype::Aes128),
        "18" | "aes256" => Some(Etype::Aes256),
        _ => None,
    }
}

impl FromStr for EtypeChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            format!(
                "invalid encryption type '{}', expected 23, 17, 18, a comma separated list of them or all",
                s
            )
        };

        if matches!(s.trim().to_ascii_lowercase().as_str(), "all" | "-1") {
            return Ok(EtypeChoice::All);
        }
        if !s.contains(',') {
            return parse_etype(s).map(EtypeChoice::Only).ok_or_else(invalid);
        }

        let etypes = s
            .split(',')
            .map(parse_etype)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;
        Ok(EtypeChoice::List(EncryptionTypeSet::new(etypes)))
    }
}

/// Ordered, duplicate-free set of accepted ticket encryption types.
/// Resolved once per run and shared read-only by every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionTypeSet(Vec<Etype>);

impl EncryptionTypeSet {
    pub fn new(etypes: impl IntoIterator<Item = Etype>) -> Self {
        let mut set = Vec::new();
        for etype in etypes {
            if !set.contains(&etype) {
                set.push(etype);
            }
        }
        Self(set)
    }

    pub fn ids(&self) -> Vec<i32> {
        self.0.iter().map(|etype| etype.id()).collect()
    }

    pub fn contains_id(&self, id: i32) -> bool {
        self.0.iter().any(|etype| etype.id() == id)
    }
}

impl fmt::Display for EncryptionTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|etype| etype.to_string()).collect();
        f.write_str(&ids.join(","))
    }
}
