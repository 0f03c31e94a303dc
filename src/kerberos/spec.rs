//! Grammar for target and credential specifications.
//!
//! Targets are written as `<realm>/<username>` or a bare `<username>`;
//! credentials as `<domain>/<username>/<secret_type>:<secret>@<host>`.
//! Parsing is pure: no file or network access happens here.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

pub const SEPARATOR: char = '/';

/// An account to attack. Both fields are non-empty and the username never
/// contains [`SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetDescriptor {
    pub realm: String,
    pub username: String,
}

/// An account discovered by enumeration. Same shape as a target, but it is
/// an output of the tool rather than an input.
pub type EnumeratedUser = TargetDescriptor;

impl TargetDescriptor {
    pub fn new(realm: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            username: username.into(),
        }
    }

    /// `username@realm`, the form the OS ticket API expects.
    pub fn principal(&self) -> String {
        format!("{}@{}", self.username, self.realm)
    }

    pub fn is_ticket_granting_account(&self) -> bool {
        self.username
            .get(..6)
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case("krbtgt"))
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.realm, SEPARATOR, self.username)
    }
}

/// Splits a target token into its optional realm and its username.
pub fn split_target(token: &str) -> Result<(Option<&str>, &str)> {
    let malformed = |reason| Error::MalformedSpec {
        spec: token.to_string(),
        reason,
    };

    let (realm, username) = match token.split_once(SEPARATOR) {
        Some((realm, username)) => {
            if realm.is_empty() {
                return Err(malformed("realm part is empty"));
            }
            (Some(realm), username)
        }
        None => (None, token),
    };

    if username.is_empty() {
        return Err(malformed("username is empty"));
    }
    if username.contains(SEPARATOR) {
        return Err(malformed("expected <realm>/<username>"));
    }

    Ok((realm, username))
}

/// Parses one target token. A realm override always wins over the realm
/// written in the token.
pub fn parse_target(token: &str, realm_override: Option<&str>) -> Result<TargetDescriptor> {
    let (parsed_realm, username) = split_target(token)?;

    let realm = match (realm_override, parsed_realm) {
        (Some(realm), _) if !realm.is_empty() => realm,
        (_, Some(realm)) => realm,
        _ => {
            return Err(Error::MissingRealm {
                spec: token.to_string(),
            })
        }
    };

    Ok(TargetDescriptor::new(realm, username))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Password,
    NtlmHash,
    AesKey,
    CcacheFile,
    None,
}

impl FromStr for SecretKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "password" | "pass" | "pw" => Ok(Self::Password),
            "nt" | "ntlm" | "rc4" | "ntlm-hash" => Ok(Self::NtlmHash),
            "aes" | "aes-key" => Ok(Self::AesKey),
            "ccache" | "ccache-file" => Ok(Self::CcacheFile),
            "none" | "sspi" => Ok(Self::None),
            _ => Err(Error::UnknownSecretKind(s.to_string())),
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Password => "password",
            Self::NtlmHash => "ntlm-hash",
            Self::AesKey => "aes-key",
            Self::CcacheFile => "ccache-file",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Credential parsed from a connection string. Immutable for the run.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSpec {
    pub realm: String,
    pub username: String,
    pub secret_kind: SecretKind,
    pub secret: String,
    pub endpoint: String,
}

impl CredentialSpec {
    pub fn target(&self) -> TargetDescriptor {
        TargetDescriptor::new(self.realm.clone(), self.username.clone())
    }

    /// Returns a copy holding `secret`, used once a prompted password is known.
    pub fn with_secret(&self, secret: String) -> Self {
        Self {
            secret,
            ..self.clone()
        }
    }
}

impl fmt::Debug for CredentialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSpec")
            .field("realm", &self.realm)
            .field("username", &self.username)
            .field("secret_kind", &self.secret_kind)
            .field("secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl FromStr for CredentialSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |reason| Error::MalformedSpec {
            spec: redact(s),
            reason,
        };

        let mut parts = s.splitn(3, SEPARATOR);
        let realm = parts.next().unwrap_or_default();
        let username = parts.next().ok_or_else(|| {
            malformed("expected <domain>/<username>/<secret_type>:<secret>@<host>")
        })?;
        let rest = parts
            .next()
            .ok_or_else(|| malformed("missing <secret_type>:<secret>@<host> part"))?;

        if realm.is_empty() {
            return Err(malformed("domain is empty"));
        }
        if username.is_empty() {
            return Err(malformed("username is empty"));
        }

        // The secret may itself contain '@' or ':', the host never does.
        let (secret_part, endpoint) = rest
            .rsplit_once('@')
            .ok_or_else(|| malformed("missing @<host>"))?;
        if endpoint.is_empty() {
            return Err(malformed("host is empty"));
        }

        let (kind, secret) = secret_part
            .split_once(':')
            .ok_or_else(|| malformed("missing ':' after the secret type"))?;

        Ok(Self {
            realm: realm.to_string(),
            username: username.to_string(),
            secret_kind: kind.parse()?,
            secret: secret.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

fn redact(connection_string: &str) -> String {
    match (connection_string.find(':'), connection_string.rfind('@')) {
        (Some(start), Some(end)) if start < end => format!(
            "{}:***{}",
            &connection_string[..start],
            &connection_string[end..]
        ),
        _ => connection_string.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_and_username() {
        let target = parse_target("CORP.LOCAL/svc_sql", None).unwrap();
        assert_eq!(target, TargetDescriptor::new("CORP.LOCAL", "svc_sql"));
        assert_eq!(target.to_string(), "CORP.LOCAL/svc_sql");
    }

    #[test]
    fn bare_username_takes_override() {
        let target = parse_target("bob", Some("CORP")).unwrap();
        assert_eq!(target, TargetDescriptor::new("CORP", "bob"));
    }

    #[test]
    fn override_beats_parsed_realm() {
        let target = parse_target("A/bob", Some("B")).unwrap();
        assert_eq!(target.realm, "B");
        assert_eq!(target.username, "bob");
    }

    #[test]
    fn bare_username_without_override_is_missing_realm() {
        let err = parse_target("bob", None).unwrap_err();
        assert!(matches!(err, Error::MissingRealm { ref spec } if spec == "bob"));
    }

    #[test]
    fn empty_parts_are_malformed() {
        for token in ["", "CORP/", "/bob"] {
            let err = parse_target(token, Some("CORP")).unwrap_err();
            assert!(
                matches!(err, Error::MalformedSpec { .. }),
                "{token:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn extra_separator_is_rejected() {
        let err = parse_target("CORP/ou/bob", None).unwrap_err();
        assert!(matches!(err, Error::MalformedSpec { ref spec, .. } if spec == "CORP/ou/bob"));
    }

    #[test]
    fn krbtgt_prefix_detection() {
        assert!(TargetDescriptor::new("CORP", "krbtgt").is_ticket_granting_account());
        assert!(TargetDescriptor::new("CORP", "KRBTGT_12345").is_ticket_granting_account());
        assert!(!TargetDescriptor::new("CORP", "krb").is_ticket_granting_account());
        assert!(!TargetDescriptor::new("CORP", "svc_krbtgt").is_ticket_granting_account());
    }

    #[test]
    fn connection_string_with_password() {
        let cred: CredentialSpec = "TEST/victim/pass:Summer2024!@10.10.10.2".parse().unwrap();
        assert_eq!(cred.realm, "TEST");
        assert_eq!(cred.username, "victim");
        assert_eq!(cred.secret_kind, SecretKind::Password);
        assert_eq!(cred.secret, "Summer2024!");
        assert_eq!(cred.endpoint, "10.10.10.2");
    }

    #[test]
    fn connection_string_secret_may_contain_delimiters() {
        let cred: CredentialSpec = "TEST/victim/pw:p@ss:w/rd@dc01.test.corp".parse().unwrap();
        assert_eq!(cred.secret, "p@ss:w/rd");
        assert_eq!(cred.endpoint, "dc01.test.corp");
    }

    #[test]
    fn connection_string_kinds() {
        let nt: CredentialSpec = "T/u/nt:31d6cfe0d16ae931b73c59d7e0c089c0@dc".parse().unwrap();
        assert_eq!(nt.secret_kind, SecretKind::NtlmHash);
        let cc: CredentialSpec = "T/u/ccache:/tmp/u.ccache@dc".parse().unwrap();
        assert_eq!(cc.secret_kind, SecretKind::CcacheFile);
        assert_eq!(cc.secret, "/tmp/u.ccache");
        let none: CredentialSpec = "T/u/none:@ldaps://dc".parse().unwrap();
        assert_eq!(none.secret_kind, SecretKind::None);
        assert_eq!(none.endpoint, "ldaps://dc");
    }

    #[test]
    fn connection_string_unknown_kind() {
        let err = "T/u/kerberos:x@dc".parse::<CredentialSpec>().unwrap_err();
        assert!(matches!(err, Error::UnknownSecretKind(ref k) if k == "kerberos"));
    }

    #[test]
    fn connection_string_errors_hide_the_secret() {
        let err = "T/u/pw:hunter2@".parse::<CredentialSpec>().unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains("hunter2"), "{msg}");

        let cred: CredentialSpec = "T/u/pw:hunter2@dc".parse().unwrap();
        assert!(!format!("{cred:?}").contains("hunter2"));
    }

    #[test]
    fn connection_string_missing_parts() {
        for s in ["TEST", "TEST/victim", "TEST/victim/pass", "TEST/victim/passonly@dc"] {
            assert!(
                matches!(s.parse::<CredentialSpec>(), Err(Error::MalformedSpec { .. })),
                "{s}"
            );
        }
    }
}
