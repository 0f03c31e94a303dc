use super::spec::{parse_target, TargetDescriptor};
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Builds the ordered target list: file lines first, then inline tokens.
///
/// Every line of the file must parse; a bad line aborts with the offending
/// text in the error. Duplicates are kept.
pub fn resolve(
    list_file: Option<&Path>,
    inline: &[String],
    realm_override: Option<&str>,
) -> Result<Vec<TargetDescriptor>> {
    if list_file.is_none() && inline.is_empty() {
        return Err(Error::NoTargetsProvided);
    }

    let mut targets = Vec::new();

    if let Some(path) = list_file {
        let contents = fs::read_to_string(path).map_err(|source| Error::TargetFile {
            path: path.to_path_buf(),
            source,
        })?;
        targets.extend(parse_lines(&contents, realm_override)?);
        log::debug!("Loaded {} target(s) from {}", targets.len(), path.display());
    }

    for token in inline {
        targets.push(parse_target(token.trim(), realm_override)?);
    }

    if targets.is_empty() {
        return Err(Error::NoTargetsProvided);
    }

    Ok(targets)
}

const BOM: char = '\u{feff}';

/// Parses one target per line. A leading byte order mark is ignored.
pub fn parse_lines(contents: &str, realm_override: Option<&str>) -> Result<Vec<TargetDescriptor>> {
    contents
        .trim_start_matches(BOM)
        .lines()
        .map(|line| parse_target(line.trim(), realm_override))
        .collect()
}

/// Reads a plain username list, one name per line, for the `brute` command.
pub fn load_usernames(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path).map_err(|source| Error::TargetFile {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(contents
        .trim_start_matches(BOM)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
