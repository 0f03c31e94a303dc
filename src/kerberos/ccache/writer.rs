use super::types::*;
use byteorder::{BigEndian, WriteBytesExt};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub fn write_ccache_file(ccache: &CcacheFile, path: &Path) -> io::Result<()> {
    fs::write(path, write_ccache_bytes(ccache)?)
}

/// Serializes as version 4 with an empty header, whatever version was read.
pub fn write_ccache_bytes(ccache: &CcacheFile) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();

    buf.write_u16::<BigEndian>(CCACHE_V4)?;
    buf.write_u16::<BigEndian>(0)?;

    write_principal(&mut buf, &ccache.default_principal)?;
    for cred in &ccache.credentials {
        write_credential(&mut buf, cred)?;
    }

    Ok(buf)
}

fn write_principal(buf: &mut Vec<u8>, principal: &Principal) -> io::Result<()> {
    buf.write_u32::<BigEndian>(principal.name_type)?;
    buf.write_u32::<BigEndian>(principal.components.len() as u32)?;

    write_counted_data(buf, principal.realm.as_bytes())?;
    for component in &principal.components {
        write_counted_data(buf, component.as_bytes())?;
    }

    Ok(())
}

fn write_credential(buf: &mut Vec<u8>, cred: &Credential) -> io::Result<()> {
    write_principal(buf, &cred.client)?;
    write_principal(buf, &cred.server)?;

    buf.write_u16::<BigEndian>(cred.key.keytype)?;
    write_counted_data(buf, &cred.key.keyvalue)?;

    buf.write_u32::<BigEndian>(cred.auth_time)?;
    buf.write_u32::<BigEndian>(cred.start_time)?;
    buf.write_u32::<BigEndian>(cred.end_time)?;
    buf.write_u32::<BigEndian>(cred.renew_till)?;

    buf.write_u8(cred.is_skey)?;
    buf.write_u32::<BigEndian>(cred.ticket_flags)?;

    buf.write_u32::<BigEndian>(cred.addresses.len() as u32)?;
    for addr in &cred.addresses {
        buf.write_u16::<BigEndian>(addr.addr_type)?;
        write_counted_data(buf, &addr.addr_data)?;
    }

    buf.write_u32::<BigEndian>(cred.authdata.len() as u32)?;
    for ad in &cred.authdata {
        buf.write_u16::<BigEndian>(ad.ad_type)?;
        write_counted_data(buf, &ad.ad_data)?;
    }

    write_counted_data(buf, &cred.ticket)?;
    write_counted_data(buf, &cred.second_ticket)?;

    Ok(())
}

fn write_counted_data(buf: &mut Vec<u8>, data: &[u8]) -> io::Result<()> {
    buf.write_u32::<BigEndian>(data.len() as u32)?;
    buf.write_all(data)
}
