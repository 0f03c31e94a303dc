use crate::context::{RunContext, DEFAULT_TIMEOUT_SECS};
use crate::kerberos::{CrackFormat, EtypeChoice};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ironroast", version, about = "Kerberos roasting and account enumeration")]
pub struct Cli {
    /// Increase message verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Network timeout in seconds
    #[arg(long, value_name = "secs", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout: u64,

    /// Parallel requests during batches
    #[arg(long, value_name = "n", default_value_t = 1, global = true)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn context(&self) -> RunContext {
        RunContext::new(self.verbose, self.timeout, self.threads)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enumerate accounts over LDAP
    Ldap(LdapArgs),
    /// Find valid usernames through the KDC
    Brute(BruteArgs),
    /// Roast accounts that do not require pre-authentication
    Asreproast(AsRepRoastArgs),
    /// Roast service accounts with a domain credential
    Spnroast(SpnRoastArgs),
    /// Roast service accounts with the tickets of the logged-on user
    SpnroastSspi(SspiRoastArgs),
    /// Request a TGT and save it to a ticket cache
    Tgt(TgtArgs),
    /// Request a service ticket and save it to a ticket cache
    Tgs(TgsArgs),
    /// LDAP enumeration, ASREPRoast and SSPI Kerberoast in one go
    Auto(AutoArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LdapQuery {
    /// Users with a servicePrincipalName
    Spn,
    /// Users that do not require pre-authentication
    Asrep,
    /// Every user, dumped as TSV
    Full,
    /// A custom filter, dumped as TSV
    Custom,
    /// spn, asrep and full
    All,
}

#[derive(Args, Debug)]
pub struct LdapArgs {
    #[arg(value_enum)]
    pub query: LdapQuery,

    /// <domain>/<username>/<secret_type>:<secret>@<dc_ip>
    pub connection: String,

    /// Base name of the output files, one per result set
    #[arg(short, long, value_name = "base")]
    pub output: Option<PathBuf>,

    /// LDAP filter for the custom query
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Attribute to fetch, repeatable
    #[arg(short = 'a', long = "attr", value_name = "attribute")]
    pub attrs: Vec<String>,
}

#[derive(Args, Debug)]
pub struct BruteArgs {
    pub realm: String,

    /// KDC address
    pub address: String,

    /// File with one username per line
    pub targets_file: PathBuf,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Where the batch targets come from.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// File with one <realm>/<username> per line
    #[arg(short = 't', long = "targets", value_name = "file")]
    pub targets_file: Option<PathBuf>,

    /// Target user, repeatable
    #[arg(short = 'u', long = "user", value_name = "user")]
    pub users: Vec<String>,

    /// Realm for every target, overriding the one in the file
    #[arg(short, long)]
    pub realm: Option<String>,
}

#[derive(Args, Debug)]
pub struct AsRepRoastArgs {
    /// KDC address
    pub address: String,

    #[command(flatten)]
    pub targets: TargetArgs,

    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Encryption type requested: 23, 17, 18, a comma separated list or all
    #[arg(short, long, default_value = "23")]
    pub etype: EtypeChoice,

    #[arg(long, value_enum, default_value_t = CrackFormat::Hashcat)]
    pub crack_format: CrackFormat,
}

#[derive(Args, Debug)]
pub struct SpnRoastArgs {
    /// <domain>/<username>/<secret_type>:<secret>@<dc_ip>
    pub connection: String,

    #[command(flatten)]
    pub targets: TargetArgs,

    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Encryption type requested: 23, 17, 18, a comma separated list or all
    #[arg(short, long, default_value = "all")]
    pub etype: EtypeChoice,

    #[arg(long, value_enum, default_value_t = CrackFormat::Hashcat)]
    pub crack_format: CrackFormat,
}

#[derive(Args, Debug)]
pub struct SspiRoastArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CrackFormat::Hashcat)]
    pub crack_format: CrackFormat,
}

#[derive(Args, Debug)]
pub struct TgtArgs {
    /// <domain>/<username>/<secret_type>:<secret>@<dc_ip>
    pub connection: String,

    /// Ticket cache to write
    pub out_file: PathBuf,
}

#[derive(Args, Debug)]
pub struct TgsArgs {
    /// <domain>/<username>/<secret_type>:<secret>@<dc_ip>
    pub connection: String,

    /// Service as <realm>/<name>, the realm defaults to the one of the credential
    pub spn: String,

    /// Ticket cache to write
    pub out_file: PathBuf,
}

#[derive(Args, Debug)]
pub struct AutoArgs {
    /// Domain controller address
    pub dc_ip: String,

    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CrackFormat::Hashcat)]
    pub crack_format: CrackFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kerberos::Etype;

    #[test]
    fn cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn etype_defaults() {
        let cli = Cli::parse_from(["ironroast", "asreproast", "10.0.0.1", "-u", "CORP/bob"]);
        match cli.command {
            Command::Asreproast(args) => {
                assert_eq!(args.etype, EtypeChoice::Only(Etype::Rc4));
                assert_eq!(args.targets.users, ["CORP/bob"]);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["ironroast", "spnroast", "CORP/alice/pw:x@dc", "-t", "t.txt"]);
        match cli.command {
            Command::Spnroast(args) => assert_eq!(args.etype, EtypeChoice::All),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn etype_accepts_a_comma_list() {
        let cli = Cli::parse_from(["ironroast", "spnroast", "CORP/alice/pw:x@dc", "-u", "svc", "-e", "17,18"]);
        match cli.command {
            Command::Spnroast(args) => assert_eq!(args.etype.resolve().ids(), vec![17, 18]),
            other => panic!("unexpected command {other:?}"),
        }

        let err = Cli::try_parse_from(["ironroast", "asreproast", "10.0.0.1", "-u", "bob", "-e", "23,99"])
            .unwrap_err();
        assert!(err.to_string().contains("23,99"));
    }

    #[test]
    fn global_flags_build_the_context() {
        let cli = Cli::parse_from(["ironroast", "-vv", "--threads", "4", "spnroast-sspi", "-u", "a"]);
        let ctx = cli.context();
        assert_eq!(ctx.verbosity, 2);
        assert_eq!(ctx.threads, 4);
        assert!(matches!(cli.command, Command::SpnroastSspi(_)));
    }
}
