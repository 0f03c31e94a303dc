use super::load_credential;
use crate::args::{LdapArgs, LdapQuery};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::ldap::{DirectoryEngine, LdapDirectory, DEFAULT_USER_ATTRS};
use crate::output::{
    username_lines, OutputSink, ASREP_USERS_SUFFIX, LDAP_CUSTOM_SUFFIX, LDAP_USERS_SUFFIX,
    SPN_USERS_SUFFIX,
};
use std::path::Path;

pub fn run(args: &LdapArgs, ctx: &RunContext) -> Result<()> {
    let attrs: Vec<&str> = args.attrs.iter().map(String::as_str).collect();
    let custom = match args.query {
        LdapQuery::Custom => Some(custom_query(args.filter.as_deref(), &attrs)?),
        _ => None,
    };

    let credential = load_credential(&args.connection)?;
    let mut directory = LdapDirectory::connect(&credential, ctx)?;
    log::info!("Bound to {}", directory.domain_name());

    match custom {
        Some((filter, attrs)) => {
            custom_search(&mut directory, filter, attrs, args.output.as_deref())
        }
        None => enumerate(&mut directory, args.query, &attrs, args.output.as_deref()),
    }
}

/// The custom query needs both a filter and the attributes to print.
fn custom_query<'a>(
    filter: Option<&'a str>,
    attrs: &'a [&'a str],
) -> Result<(&'a str, &'a [&'a str])> {
    match filter {
        Some(filter) if !filter.trim().is_empty() && !attrs.is_empty() => Ok((filter, attrs)),
        _ => Err(Error::MissingArgument(
            "the custom query needs a filter (-f) and at least one attribute (-a)",
        )),
    }
}

/// Runs the predefined queries selected by `query`, each written to its own
/// sink.
pub fn enumerate(
    directory: &mut dyn DirectoryEngine,
    query: LdapQuery,
    attrs: &[&str],
    output: Option<&Path>,
) -> Result<()> {
    if matches!(query, LdapQuery::Spn | LdapQuery::All) {
        let users = directory.spn_users()?;
        log::info!("Found {} SPN user(s)", users.len());
        OutputSink::suffixed(output, SPN_USERS_SUFFIX)
            .write_lines(Some("[+] SPN users"), username_lines(&users))?;
    }

    if matches!(query, LdapQuery::Asrep | LdapQuery::All) {
        let users = directory.asrep_users()?;
        log::info!("Found {} user(s) without pre-authentication", users.len());
        OutputSink::suffixed(output, ASREP_USERS_SUFFIX)
            .write_lines(Some("[+] ASREP users"), username_lines(&users))?;
    }

    if matches!(query, LdapQuery::Full | LdapQuery::All) {
        let attrs = if attrs.is_empty() {
            DEFAULT_USER_ATTRS
        } else {
            attrs
        };
        let users = directory.users(attrs)?;
        log::info!("Dumped {} user(s)", users.len());
        OutputSink::suffixed(output, LDAP_USERS_SUFFIX).write_tsv(Some("[+] Users"), attrs, &users)?;
    }

    Ok(())
}

pub fn custom_search(
    directory: &mut dyn DirectoryEngine,
    filter: &str,
    attrs: &[&str],
    output: Option<&Path>,
) -> Result<()> {
    let entities = directory.custom_search(filter, attrs)?;
    log::info!("Custom search returned {} entries", entities.len());
    OutputSink::suffixed(output, LDAP_CUSTOM_SUFFIX).write_tsv(
        Some("[+] Custom search"),
        attrs,
        &entities,
    )?;
    Ok(())
}
