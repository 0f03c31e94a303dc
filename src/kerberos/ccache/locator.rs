use std::path::{Path, PathBuf};

/// Turns a `KRB5CCNAME` value into a file path. Only `FILE:` caches (or
/// bare paths) can be read; `DIR:`, `KEYRING:` and `KCM:` give `None`.
pub fn parse_krb5ccname(value: &str) -> Option<PathBuf> {
    if let Some(path) = value.strip_prefix("FILE:") {
        return Some(PathBuf::from(path));
    }
    if ["DIR:", "KEYRING:", "KCM:", "API:", "MEMORY:"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
    {
        return None;
    }
    Some(PathBuf::from(value))
}

/// Picks the cache to load: an explicit path first, then `KRB5CCNAME`,
/// then `/tmp/krb5cc_<uid>`.
pub fn locate_ccache(explicit: &str) -> Option<PathBuf> {
    if !explicit.is_empty() {
        return Some(PathBuf::from(explicit));
    }

    if let Some(path) = std::env::var("KRB5CCNAME")
        .ok()
        .and_then(|value| parse_krb5ccname(&value))
    {
        if path.exists() {
            return Some(path);
        }
    }

    default_user_ccache().filter(|path| Path::new(path).exists())
}

#[cfg(unix)]
fn default_user_ccache() -> Option<PathBuf> {
    let uid = unsafe { libc::getuid() };
    Some(PathBuf::from(format!("/tmp/krb5cc_{}", uid)))
}

#[cfg(not(unix))]
fn default_user_ccache() -> Option<PathBuf> {
    None
}
