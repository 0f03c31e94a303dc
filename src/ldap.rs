//! Directory engine: account enumeration over LDAP.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::kerberos::spec::{CredentialSpec, EnumeratedUser, SecretKind};
use byteorder::{LittleEndian, ReadBytesExt};
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashMap;
use std::io::{Cursor, Read};

pub const PAGE_SIZE: i32 = 500;

pub const SPN_USERS_FILTER: &str = "(&(sAMAccountType=805306368)(servicePrincipalName=*))";
pub const ASREP_USERS_FILTER: &str =
    "(&(sAMAccountType=805306368)(userAccountControl:1.2.840.113556.1.4.803:=4194304))";
pub const ALL_USERS_FILTER: &str = "(sAMAccountType=805306368)";

/// Columns of the full user dump when no `-a` is given.
pub const DEFAULT_USER_ATTRS: &[&str] = &[
    "sAMAccountName",
    "userPrincipalName",
    "distinguishedName",
    "description",
    "memberOf",
    "servicePrincipalName",
    "userAccountControl",
    "pwdLastSet",
    "lastLogonTimestamp",
    "whenCreated",
    "objectSid",
];

const GUID_LENGTH: usize = 16;
const SID_AUTHORITY_BYTES: usize = 6;

/// A directory object with every value already turned into text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl Entity {
    /// Values of `name`, matched case-insensitively as LDAP does.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Text for a TSV cell; multi-valued attributes are joined with `;`.
    pub fn cell(&self, name: &str) -> Option<String> {
        if name.eq_ignore_ascii_case("distinguishedName") && self.values(name).is_none() {
            return Some(self.dn.clone());
        }
        self.values(name)
            .filter(|values| !values.is_empty())
            .map(|values| values.join(";"))
    }

    pub fn from_search_entry(entry: SearchEntry) -> Self {
        let mut attrs = entry.attrs;
        for (name, values) in entry.bin_attrs {
            let rendered = values
                .iter()
                .map(|value| render_binary(&name, value))
                .collect();
            attrs.insert(name, rendered);
        }
        Self {
            dn: entry.dn,
            attrs,
        }
    }
}

pub trait DirectoryEngine {
    /// DNS name of the domain, e.g. `corp.local`.
    fn domain_name(&self) -> &str;

    fn search(&mut self, filter: &str, attrs: &[&str]) -> Result<Vec<Entity>>;

    fn spn_users(&mut self) -> Result<Vec<EnumeratedUser>> {
        self.accounts(SPN_USERS_FILTER)
    }

    fn asrep_users(&mut self) -> Result<Vec<EnumeratedUser>> {
        self.accounts(ASREP_USERS_FILTER)
    }

    fn users(&mut self, attrs: &[&str]) -> Result<Vec<Entity>> {
        self.search(ALL_USERS_FILTER, attrs)
    }

    fn custom_search(&mut self, filter: &str, attrs: &[&str]) -> Result<Vec<Entity>> {
        log::debug!("Custom search {} for {}", filter, attrs.join(","));
        self.search(filter, attrs)
    }

    fn accounts(&mut self, filter: &str) -> Result<Vec<EnumeratedUser>> {
        let realm = self.domain_name().to_string();
        Ok(self
            .search(filter, &["sAMAccountName"])?
            .iter()
            .filter_map(|entity| entity.first("sAMAccountName"))
            .map(|name| EnumeratedUser::new(realm.clone(), name))
            .collect())
    }
}

pub struct LdapDirectory {
    conn: LdapConn,
    base_dn: String,
    domain: String,
}

impl LdapDirectory {
    pub fn connect(credential: &CredentialSpec, ctx: &RunContext) -> Result<Self> {
        let url = ldap_url(&credential.endpoint);
        let settings = LdapConnSettings::new()
            .set_conn_timeout(ctx.timeout)
            .set_no_tls_verify(true);

        log::info!("Connecting to {}", url);
        let mut conn = LdapConn::with_settings(settings, &url)?;
        conn.with_timeout(ctx.timeout);

        bind(&mut conn, credential)?;

        let base_dn = default_naming_context(&mut conn)?;
        let domain = dn_to_domain(&base_dn);
        log::debug!("Naming context {} ({})", base_dn, domain);

        Ok(Self {
            conn,
            base_dn,
            domain,
        })
    }
}

impl DirectoryEngine for LdapDirectory {
    fn domain_name(&self) -> &str {
        &self.domain
    }

    fn search(&mut self, filter: &str, attrs: &[&str]) -> Result<Vec<Entity>> {
        log::debug!("Executing LDAP search with filter: {}", filter);

        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(PAGE_SIZE)),
        ];

        let mut search = self.conn.streaming_search_with(
            adapters,
            &self.base_dn,
            Scope::Subtree,
            filter,
            attrs.to_vec(),
        )?;

        let mut entities = Vec::new();
        while let Some(entry) = search.next()? {
            entities.push(Entity::from_search_entry(SearchEntry::construct(entry)));
        }
        search.result().success()?;

        log::debug!("Retrieved {} entries", entities.len());
        Ok(entities)
    }
}

fn ldap_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ldap://{}", endpoint)
    }
}

fn host_of(endpoint: &str) -> &str {
    let host = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    host.split(['/', ':']).next().unwrap_or(host)
}

fn bind(conn: &mut LdapConn, credential: &CredentialSpec) -> Result<()> {
    match credential.secret_kind {
        SecretKind::Password => {
            let bind_dn = format!("{}@{}", credential.username, credential.realm);
            log::debug!("Simple bind as {}", bind_dn);
            conn.simple_bind(&bind_dn, &credential.secret)?.success()?;
            Ok(())
        }
        SecretKind::CcacheFile | SecretKind::None => kerberos_bind(conn, credential),
        SecretKind::NtlmHash | SecretKind::AesKey => Err(Error::Credential(format!(
            "LDAP bind does not accept a {} secret, use a password or a ticket cache",
            credential.secret_kind
        ))),
    }
}

#[cfg(feature = "gssapi")]
fn kerberos_bind(conn: &mut LdapConn, credential: &CredentialSpec) -> Result<()> {
    if credential.secret_kind == SecretKind::CcacheFile && !credential.secret.is_empty() {
        std::env::set_var("KRB5CCNAME", format!("FILE:{}", credential.secret));
    }
    let host = host_of(&credential.endpoint);
    log::debug!("GSSAPI bind to ldap/{}", host);
    conn.sasl_gssapi_bind(host)?.success()?;
    Ok(())
}

#[cfg(not(feature = "gssapi"))]
fn kerberos_bind(_conn: &mut LdapConn, credential: &CredentialSpec) -> Result<()> {
    log::debug!("No GSSAPI support to bind to {}", host_of(&credential.endpoint));
    Err(Error::UnsupportedPlatform(
        "Kerberos LDAP bind (rebuild with the gssapi feature)",
    ))
}

fn default_naming_context(conn: &mut LdapConn) -> Result<String> {
    let (results, _) = conn
        .search("", Scope::Base, "(objectClass=*)", vec!["defaultNamingContext"])?
        .success()?;

    results
        .into_iter()
        .map(SearchEntry::construct)
        .find_map(|entry| {
            entry
                .attrs
                .get("defaultNamingContext")
                .and_then(|values| values.first().cloned())
        })
        .ok_or_else(|| Error::Directory("rootDSE has no defaultNamingContext".into()))
}

/// `DC=corp,DC=local` to `corp.local`.
pub fn dn_to_domain(dn: &str) -> String {
    dn.split(',')
        .filter_map(|rdn| {
            let (key, value) = rdn.trim().split_once('=')?;
            key.eq_ignore_ascii_case("DC").then(|| value.to_string())
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn render_binary(name: &str, value: &[u8]) -> String {
    use base64::Engine;

    if name.eq_ignore_ascii_case("objectSid") {
        format_sid(value)
    } else if name.eq_ignore_ascii_case("objectGUID") {
        format_guid(value)
    } else {
        base64::engine::general_purpose::STANDARD.encode(value)
    }
}

pub fn format_guid(guid: &[u8]) -> String {
    if guid.len() != GUID_LENGTH {
        return "Invalid GUID".to_string();
    }

    let data1 = u32::from_le_bytes([guid[0], guid[1], guid[2], guid[3]]);
    let data2 = u16::from_le_bytes([guid[4], guid[5]]);
    let data3 = u16::from_le_bytes([guid[6], guid[7]]);

    format!(
        "{:08x}-{:04x}-{:04x}-{}-{}",
        data1,
        data2,
        data3,
        hex::encode(&guid[8..10]),
        hex::encode(&guid[10..16])
    )
}

pub fn format_sid(raw_sid: &[u8]) -> String {
    let mut cursor = Cursor::new(raw_sid);

    let revision = cursor.read_u8().unwrap_or(0);
    let sub_auth_count = cursor.read_u8().unwrap_or(0);

    let mut authority_bytes = [0u8; SID_AUTHORITY_BYTES];
    if cursor.read_exact(&mut authority_bytes).is_err() {
        return "Invalid SID".to_string();
    }
    let mut authority = [0u8; 8];
    authority[2..].copy_from_slice(&authority_bytes);

    let mut sid = format!("S-{}-{}", revision, u64::from_be_bytes(authority));
    for _ in 0..sub_auth_count {
        match cursor.read_u32::<LittleEndian>() {
            Ok(sub_auth) => sid.push_str(&format!("-{}", sub_auth)),
            Err(_) => break,
        }
    }

    sid
}
