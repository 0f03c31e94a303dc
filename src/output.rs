//! Result rendering: hash lines, username lists and TSV dumps, written to a
//! file or streamed to stdout.

use crate::error::{Error, Result};
use crate::kerberos::roast::Batch;
use crate::kerberos::spec::{EnumeratedUser, TargetDescriptor};
use crate::ldap::Entity;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MISSING_VALUE: &str = "N/A";

pub const SPN_USERS_SUFFIX: &str = "_spn_users.txt";
pub const ASREP_USERS_SUFFIX: &str = "_asrep_users.txt";
pub const LDAP_USERS_SUFFIX: &str = "_ldap_users.tsv";
pub const LDAP_CUSTOM_SUFFIX: &str = "_ldap_custom.tsv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    Stdout,
    File(PathBuf),
}

impl OutputSink {
    pub fn new(path: Option<&Path>) -> Self {
        match path {
            Some(path) => OutputSink::File(path.to_path_buf()),
            None => OutputSink::Stdout,
        }
    }

    /// One file per result set: `<base><suffix>` next to `base`, or stdout
    /// when no base was given.
    pub fn suffixed(base: Option<&Path>, suffix: &str) -> Self {
        match base {
            Some(base) => {
                let file_name = base
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                OutputSink::File(base.with_file_name(format!("{}{}", file_name, suffix)))
            }
            None => OutputSink::Stdout,
        }
    }

    pub fn is_stdout(&self) -> bool {
        matches!(self, OutputSink::Stdout)
    }

    fn line_ending(&self) -> &'static str {
        match self {
            OutputSink::Stdout => "\n",
            OutputSink::File(_) => "\r\n",
        }
    }

    fn describe(&self) -> String {
        match self {
            OutputSink::Stdout => "stdout".to_string(),
            OutputSink::File(path) => path.display().to_string(),
        }
    }

    fn open(&self) -> Result<Box<dyn Write>> {
        match self {
            OutputSink::Stdout => Ok(Box::new(io::stdout().lock())),
            OutputSink::File(path) => {
                let file = File::create(path).map_err(|e| Error::io_write(self.describe(), e))?;
                Ok(Box::new(BufWriter::new(file)))
            }
        }
    }

    /// Writes `lines`, preceded by `banner` when going to stdout.
    pub fn write_lines<I, S>(&self, banner: Option<&str>, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = self.open()?;
        let banner = banner.filter(|_| self.is_stdout());
        let count = write_lines_to(&mut out, banner, lines, self.line_ending())
            .map_err(|e| Error::io_write(self.describe(), e))?;

        if let OutputSink::File(path) = self {
            log::info!("Wrote {} line(s) to {}", count, path.display());
        }
        Ok(count)
    }

    /// Header row of attribute names, then one row per entity.
    pub fn write_tsv(&self, banner: Option<&str>, attrs: &[&str], entities: &[Entity]) -> Result<usize> {
        let mut out = self.open()?;
        if let Some(banner) = banner.filter(|_| self.is_stdout()) {
            writeln!(out, "{}", banner).map_err(|e| Error::io_write(self.describe(), e))?;
        }

        let terminator = match self {
            OutputSink::Stdout => csv::Terminator::Any(b'\n'),
            OutputSink::File(_) => csv::Terminator::CRLF,
        };
        write_tsv_to(out, attrs, entities, terminator)
            .map_err(|e| Error::io_write(self.describe(), io::Error::new(io::ErrorKind::Other, e)))?;

        Ok(entities.len())
    }
}

fn write_lines_to<W, I, S>(out: &mut W, banner: Option<&str>, lines: I, eol: &str) -> io::Result<usize>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if let Some(banner) = banner {
        write!(out, "{}{}", banner, eol)?;
    }
    let mut count = 0;
    for line in lines {
        write!(out, "{}{}", line.as_ref(), eol)?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

fn write_tsv_to<W: Write>(
    out: W,
    attrs: &[&str],
    entities: &[Entity],
    terminator: csv::Terminator,
) -> std::result::Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(terminator)
        .from_writer(out);

    writer.write_record(attrs)?;
    for entity in entities {
        let row: Vec<String> = attrs
            .iter()
            .map(|attr| entity.cell(attr).unwrap_or_else(|| MISSING_VALUE.to_string()))
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn username_lines(users: &[EnumeratedUser]) -> impl Iterator<Item = String> + '_ {
    users.iter().map(|user| user.to_string())
}

pub fn failure_line(target: &TargetDescriptor, reason: &str) -> String {
    format!("[!] {} → {}", target, reason)
}

/// Hash lines go to `sink`; failures and the summary go to stderr after
/// them.
pub fn render_batch(batch: &Batch, sink: &OutputSink) -> Result<()> {
    render_batches(std::slice::from_ref(batch), sink)
}

/// Same as [`render_batch`] with the hashes of every batch in one sink.
pub fn render_batches(batches: &[Batch], sink: &OutputSink) -> Result<()> {
    let hashes = sink.write_lines(None, batches.iter().flat_map(|batch| batch.successes()))?;

    let mut stderr = io::stderr().lock();
    for batch in batches {
        report_failures(batch, &mut stderr).map_err(|e| Error::io_write("stderr", e))?;
    }

    eprintln!("[+] {} hash(es)", hashes);
    Ok(())
}

pub fn report_failures<W: Write>(batch: &Batch, out: &mut W) -> io::Result<()> {
    let mut failures = 0;
    for (target, reason) in batch.failures() {
        writeln!(out, "{}", failure_line(target, reason))?;
        failures += 1;
    }
    if failures > 0 {
        writeln!(out, "[!] {} failure(s)", failures)?;
    }
    if !batch.abandoned.is_empty() {
        writeln!(out, "[!] {} target(s) not tried", batch.abandoned.len())?;
    }
    Ok(())
}
