use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and output errors. Any of these aborts the run.
///
/// Failures of a single target never show up here, they are carried by
/// [`crate::kerberos::roast::AttackResult::Failure`] instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot parse '{spec}': {reason}")]
    MalformedSpec { spec: String, reason: &'static str },

    #[error("realm is missing for '{spec}'. Either use the -r parameter or store the targets in <realm>/<username> format")]
    MissingRealm { spec: String },

    #[error("unknown secret type '{0}' (expected one of: password, nt, aes, ccache, none)")]
    UnknownSecretKind(String),

    #[error("no targets loaded! Either -u or -t MUST be specified")]
    NoTargetsProvided,

    #[error("failed to read targets file {}: {source}", path.display())]
    TargetFile { path: PathBuf, source: io::Error },

    #[error("failed to write results to {destination}: {source}")]
    IoWrite { destination: String, source: io::Error },

    #[error("{0} is not available on this platform")]
    UnsupportedPlatform(&'static str),

    #[error("credential cannot be used: {0}")]
    Credential(String),

    #[error("authentication as {principal} failed: {reason}")]
    Authentication { principal: String, reason: String },

    #[error("ticket request failed: {0}")]
    Ticket(String),

    #[error("directory error: {0}")]
    Directory(String),

    #[error("ticket cache error: {0}")]
    Ccache(String),

    #[error("{0}")]
    MissingArgument(&'static str),
}

impl Error {
    pub fn io_write(destination: impl Into<String>, source: io::Error) -> Self {
        Error::IoWrite {
            destination: destination.into(),
            source,
        }
    }
}

impl From<ldap3::LdapError> for Error {
    fn from(e: ldap3::LdapError) -> Self {
        Error::Directory(e.to_string())
    }
}
