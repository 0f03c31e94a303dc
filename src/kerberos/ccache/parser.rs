use super::types::*;
use byteorder::{BigEndian, ReadBytesExt};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("unsupported version: 0x{0:04x}")]
    UnsupportedVersion(u16),
}

pub fn parse_ccache_file(path: &Path) -> Result<CcacheFile, ParseError> {
    let buffer = fs::read(path)?;
    parse_ccache_bytes(&buffer)
}

pub fn parse_ccache_bytes(data: &[u8]) -> Result<CcacheFile, ParseError> {
    let mut cursor = Cursor::new(data);

    let version = cursor.read_u16::<BigEndian>()?;
    match version {
        CCACHE_V4 => {
            let tag_len = cursor.read_u16::<BigEndian>()?;
            let mut tags = vec![0u8; tag_len as usize];
            cursor.read_exact(&mut tags)?;
        }
        CCACHE_V3 => {}
        _ => return Err(ParseError::UnsupportedVersion(version)),
    }

    let default_principal = parse_principal(&mut cursor)?;

    let mut credentials = Vec::new();
    while cursor.position() < data.len() as u64 {
        match parse_credential(&mut cursor) {
            Ok(cred) => credentials.push(cred),
            Err(ParseError::Io(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }

    Ok(CcacheFile {
        version,
        default_principal,
        credentials,
    })
}

fn parse_principal(cursor: &mut Cursor<&[u8]>) -> Result<Principal, ParseError> {
    let name_type = cursor.read_u32::<BigEndian>()?;
    let num_components = cursor.read_u32::<BigEndian>()?;

    let realm = parse_counted_string(cursor)?;

    let mut components = Vec::new();
    for _ in 0..num_components {
        components.push(parse_counted_string(cursor)?);
    }

    Ok(Principal {
        name_type,
        realm,
        components,
    })
}

fn parse_credential(cursor: &mut Cursor<&[u8]>) -> Result<Credential, ParseError> {
    let client = parse_principal(cursor)?;
    let server = parse_principal(cursor)?;

    let keytype = cursor.read_u16::<BigEndian>()?;
    let keyvalue = parse_counted_data(cursor)?;

    let auth_time = cursor.read_u32::<BigEndian>()?;
    let start_time = cursor.read_u32::<BigEndian>()?;
    let end_time = cursor.read_u32::<BigEndian>()?;
    let renew_till = cursor.read_u32::<BigEndian>()?;

    let is_skey = cursor.read_u8()?;
    let ticket_flags = cursor.read_u32::<BigEndian>()?;

    let num_addrs = cursor.read_u32::<BigEndian>()?;
    let mut addresses = Vec::new();
    for _ in 0..num_addrs {
        let addr_type = cursor.read_u16::<BigEndian>()?;
        let addr_data = parse_counted_data(cursor)?;
        addresses.push(Address {
            addr_type,
            addr_data,
        });
    }

    let num_authdata = cursor.read_u32::<BigEndian>()?;
    let mut authdata = Vec::new();
    for _ in 0..num_authdata {
        let ad_type = cursor.read_u16::<BigEndian>()?;
        let ad_data = parse_counted_data(cursor)?;
        authdata.push(AuthData { ad_type, ad_data });
    }

    let ticket = parse_counted_data(cursor)?;
    let second_ticket = parse_counted_data(cursor)?;

    Ok(Credential {
        client,
        server,
        key: Keyblock { keytype, keyvalue },
        auth_time,
        start_time,
        end_time,
        renew_till,
        is_skey,
        ticket_flags,
        addresses,
        authdata,
        ticket,
        second_ticket,
    })
}

fn parse_counted_string(cursor: &mut Cursor<&[u8]>) -> Result<String, ParseError> {
    let data = parse_counted_data(cursor)?;
    String::from_utf8(data).map_err(|e| ParseError::InvalidFormat(format!("invalid UTF-8: {}", e)))
}

fn parse_counted_data(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>, ParseError> {
    let len = cursor.read_u32::<BigEndian>()? as u64;
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    if len > remaining {
        return Err(ParseError::Io(io::ErrorKind::UnexpectedEof.into()));
    }
    let mut data = vec![0u8; len as usize];
    cursor.read_exact(&mut data)?;
    Ok(data)
}
