use super::channel::KrbChannel;
use super::forge::{
    encrypted_timestamp, service_principal, tgs_authentication, user_principal, KdcReqBuilder,
    KEY_USAGE_AS_REP_ENC_PART, KEY_USAGE_TGS_REP_ENC_PART,
};
use crate::kerberos::ccache::{self, parse_ccache_file};
use crate::kerberos::engine::{
    IssuedTicket, KdcEngine, KdcError, KdcSession, SessionKey, UserProbe,
};
use crate::kerberos::etype::{EncryptionTypeSet, Etype};
use crate::kerberos::hash::RoastTicket;
use crate::kerberos::spec::{CredentialSpec, SecretKind, TargetDescriptor};
use kerberos_asn1::{
    AsRep, Asn1Object, EncAsRepPart, EncTgsRepPart, KrbError, PrincipalName, TgsRep, Ticket,
};
use kerberos_constants::{error_codes, etypes, kdc_options};
use kerberos_crypto::new_kerberos_cipher;

/// Long-term key candidate for pre-authentication.
#[derive(Clone)]
struct UserKey {
    etype: i32,
    value: Vec<u8>,
}

/// Protocol engine talking to a KDC through a [`KrbChannel`].
pub struct NetworkKdc<C: KrbChannel> {
    channel: C,
    trace_packets: bool,
}

impl<C: KrbChannel> NetworkKdc<C> {
    pub fn new(channel: C, trace_packets: bool) -> Self {
        Self {
            channel,
            trace_packets,
        }
    }

    fn exchange(&self, label: &str, request: &[u8]) -> Result<Vec<u8>, KdcError> {
        if self.trace_packets {
            log::debug!("{} -> {}: {}", label, self.channel.address(), hex::encode(request));
        }
        let response = self
            .channel
            .send_recv(request)
            .map_err(|e| KdcError::Transport(format!("{}: {}", self.channel.address(), e)))?;
        if self.trace_packets {
            log::debug!("{} <- {}: {}", label, self.channel.address(), hex::encode(&response));
        }
        Ok(response)
    }

    fn send_as_req(&self, builder: KdcReqBuilder) -> Result<AsRep, KdcError> {
        let raw = self.exchange("AS-REQ", &builder.build_as_req().build())?;
        if let Ok((_, as_rep)) = AsRep::parse(&raw) {
            return Ok(as_rep);
        }
        Err(krb_error_or_garbage(&raw))
    }

    fn send_tgs_req(&self, builder: KdcReqBuilder) -> Result<TgsRep, KdcError> {
        let raw = self.exchange("TGS-REQ", &builder.build_tgs_req().build())?;
        if let Ok((_, tgs_rep)) = TgsRep::parse(&raw) {
            return Ok(tgs_rep);
        }
        Err(krb_error_or_garbage(&raw))
    }

    fn tgs_builder(
        &self,
        session: &KdcSession,
        realm: &str,
        sname: PrincipalName,
        etypes: Vec<i32>,
    ) -> Result<KdcReqBuilder, KdcError> {
        let tgt = parse_ticket(&session.ticket)?;
        let padata = tgs_authentication(
            &session.client.realm,
            &session.client.username,
            tgt,
            &session.key,
        )?;

        Ok(KdcReqBuilder::new(realm)
            .kdc_options(kdc_options::FORWARDABLE | kdc_options::RENEWABLE | kdc_options::CANONICALIZE)
            .sname(sname)
            .etypes(etypes)
            .push_padata(padata)
            .clear_rtime())
    }

    fn login_with_keys(
        &self,
        credential: &CredentialSpec,
        keys: Vec<UserKey>,
    ) -> Result<KdcSession, KdcError> {
        let mut last_error = KdcError::Crypto("no usable key".into());

        for key in keys {
            log::debug!(
                "Pre-authenticating {} with etype {}",
                credential.target().principal(),
                key.etype
            );
            let builder = KdcReqBuilder::new(&credential.realm)
                .username(&credential.username)
                .etypes(vec![key.etype])
                .push_padata(encrypted_timestamp(key.etype, &key.value)?)
                .request_pac();

            match self.send_as_req(builder) {
                Ok(as_rep) => return session_from_as_rep(credential, &as_rep, &key),
                Err(e) if e.code() == Some(error_codes::KDC_ERR_ETYPE_NOSUPP) => {
                    log::info!("KDC refused etype {}, trying the next key", key.etype);
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }
}

impl<C: KrbChannel> KdcEngine for NetworkKdc<C> {
    fn request_as_rep(
        &self,
        target: &TargetDescriptor,
        etypes: &EncryptionTypeSet,
    ) -> Result<RoastTicket, KdcError> {
        let builder = KdcReqBuilder::new(&target.realm)
            .username(&target.username)
            .etypes(etypes.ids())
            .request_pac();

        let as_rep = self.send_as_req(builder)?;
        RoastTicket::from_as_rep(&target.username, &as_rep)
    }

    fn authenticate(&self, credential: &CredentialSpec) -> Result<KdcSession, KdcError> {
        match credential.secret_kind {
            SecretKind::CcacheFile | SecretKind::None => session_from_ccache(credential),
            SecretKind::Password | SecretKind::NtlmHash | SecretKind::AesKey => {
                let keys = user_keys(credential)?;
                self.login_with_keys(credential, keys)
            }
        }
    }

    fn request_service_ticket(
        &self,
        session: &KdcSession,
        target: &TargetDescriptor,
        etypes: &EncryptionTypeSet,
    ) -> Result<RoastTicket, KdcError> {
        let builder = self.tgs_builder(
            session,
            &target.realm,
            user_principal(&target.username),
            etypes.ids(),
        )?;

        let tgs_rep = self.send_tgs_req(builder)?;
        RoastTicket::from_ticket(target, &tgs_rep.ticket)
    }

    fn request_service_credential(
        &self,
        session: &KdcSession,
        service: &TargetDescriptor,
    ) -> Result<IssuedTicket, KdcError> {
        let sname = service_principal(&service.username);
        let components = sname.name_string.clone();
        let etypes = Etype::CANONICAL.iter().rev().map(|e| e.id()).collect();
        let builder = self.tgs_builder(session, &service.realm, sname, etypes)?;

        let tgs_rep = self.send_tgs_req(builder)?;
        let key = decrypt_session_key(
            &session.key.value,
            tgs_rep.enc_part.etype,
            KEY_USAGE_TGS_REP_ENC_PART,
            &tgs_rep.enc_part.cipher,
            session.key.etype,
        )?;

        Ok(IssuedTicket {
            client: session.client.clone(),
            service_realm: tgs_rep.ticket.realm.clone(),
            service: components,
            ticket: tgs_rep.ticket.build(),
            key,
        })
    }

    fn probe_username(&self, realm: &str, username: &str) -> Result<UserProbe, KdcError> {
        let builder = KdcReqBuilder::new(realm)
            .username(username)
            .etypes(Etype::CANONICAL.iter().map(|e| e.id()).collect());

        match self.send_as_req(builder) {
            Ok(_) => Ok(UserProbe::ExistsWithoutPreauth),
            Err(e) => match e.code() {
                Some(error_codes::KDC_ERR_PREAUTH_REQUIRED) => Ok(UserProbe::Exists),
                Some(error_codes::KDC_ERR_C_PRINCIPAL_UNKNOWN) => Ok(UserProbe::Unknown),
                _ => Err(e),
            },
        }
    }
}

fn krb_error_or_garbage(raw: &[u8]) -> KdcError {
    match KrbError::parse(raw) {
        Ok((_, krb_error)) => KdcError::krb(krb_error.error_code),
        Err(e) => KdcError::Decode(format!("{:?}", e)),
    }
}

fn parse_ticket(raw: &[u8]) -> Result<Ticket, KdcError> {
    Ticket::parse(raw)
        .map(|(_, ticket)| ticket)
        .map_err(|e| KdcError::Decode(format!("ticket: {:?}", e)))
}

/// Derives the keys to try, strongest first.
fn user_keys(credential: &CredentialSpec) -> Result<Vec<UserKey>, KdcError> {
    let secret = credential.secret.trim();
    match credential.secret_kind {
        SecretKind::Password => {
            let mut keys = Vec::new();
            for etype in [etypes::AES256_CTS_HMAC_SHA1_96, etypes::RC4_HMAC] {
                let cipher =
                    new_kerberos_cipher(etype).map_err(|e| KdcError::Crypto(format!("{:?}", e)))?;
                let salt =
                    cipher.generate_salt(&credential.realm.to_uppercase(), &credential.username);
                keys.push(UserKey {
                    etype,
                    value: cipher.generate_key_from_string(&credential.secret, &salt),
                });
            }
            Ok(keys)
        }
        SecretKind::NtlmHash => {
            // LM:NT pairs are accepted, the NT half is the RC4 key.
            let nt = secret.rsplit(':').next().unwrap_or(secret);
            Ok(vec![UserKey {
                etype: etypes::RC4_HMAC,
                value: decode_key(nt, &[16])?,
            }])
        }
        SecretKind::AesKey => {
            let value = decode_key(secret, &[16, 32])?;
            let etype = if value.len() == 32 {
                etypes::AES256_CTS_HMAC_SHA1_96
            } else {
                etypes::AES128_CTS_HMAC_SHA1_96
            };
            Ok(vec![UserKey { etype, value }])
        }
        SecretKind::CcacheFile | SecretKind::None => Ok(Vec::new()),
    }
}

fn decode_key(hex_key: &str, lengths: &[usize]) -> Result<Vec<u8>, KdcError> {
    let value = hex::decode(hex_key).map_err(|e| KdcError::Crypto(format!("invalid key: {}", e)))?;
    if !lengths.contains(&value.len()) {
        return Err(KdcError::Crypto(format!(
            "invalid key length {} bytes",
            value.len()
        )));
    }
    Ok(value)
}

fn session_from_as_rep(
    credential: &CredentialSpec,
    as_rep: &AsRep,
    key: &UserKey,
) -> Result<KdcSession, KdcError> {
    let session_key = decrypt_session_key(
        &key.value,
        as_rep.enc_part.etype,
        KEY_USAGE_AS_REP_ENC_PART,
        &as_rep.enc_part.cipher,
        key.etype,
    )?;

    Ok(IssuedTicket {
        client: TargetDescriptor::new(as_rep.crealm.clone(), credential.username.clone()),
        service_realm: as_rep.ticket.realm.clone(),
        service: vec!["krbtgt".into(), as_rep.ticket.realm.clone()],
        ticket: as_rep.ticket.build(),
        key: session_key,
    })
}

fn decrypt_session_key(
    key: &[u8],
    etype: i32,
    usage: i32,
    cipher_text: &[u8],
    key_etype: i32,
) -> Result<SessionKey, KdcError> {
    if etype != key_etype {
        return Err(KdcError::Crypto(format!(
            "reply encrypted with etype {} but the key is etype {}",
            etype, key_etype
        )));
    }
    let cipher = new_kerberos_cipher(etype).map_err(|e| KdcError::Crypto(format!("{:?}", e)))?;
    let plain = cipher
        .decrypt(key, usage, cipher_text)
        .map_err(|e| KdcError::Crypto(format!("unable to decrypt reply: {:?}", e)))?;

    // Some KDCs answer AS-REQs with an EncTgsRepPart and vice versa.
    if let Ok((_, part)) = EncAsRepPart::parse(&plain) {
        return Ok(SessionKey {
            etype: part.key.keytype,
            value: part.key.keyvalue,
        });
    }
    if let Ok((_, part)) = EncTgsRepPart::parse(&plain) {
        return Ok(SessionKey {
            etype: part.key.keytype,
            value: part.key.keyvalue,
        });
    }
    Err(KdcError::Decode("encrypted reply part".into()))
}

fn session_from_ccache(credential: &CredentialSpec) -> Result<KdcSession, KdcError> {
    let path = ccache::locate_ccache(&credential.secret)
        .ok_or_else(|| KdcError::NoTicket("no ticket cache found (set KRB5CCNAME)".into()))?;
    let cache = parse_ccache_file(&path)
        .map_err(|e| KdcError::Decode(format!("{}: {}", path.display(), e)))?;
    let tgt = cache.find_tgt().ok_or_else(|| {
        KdcError::NoTicket(format!("no valid TGT in {}", path.display()))
    })?;

    log::info!("Using TGT of {} from {}", tgt.client, path.display());

    let username = tgt
        .client
        .components
        .first()
        .cloned()
        .unwrap_or_else(|| credential.username.clone());

    Ok(IssuedTicket {
        client: TargetDescriptor::new(tgt.client.realm.clone(), username),
        service_realm: tgt.server.realm.clone(),
        service: tgt.server.components.clone(),
        ticket: tgt.ticket.clone(),
        key: SessionKey {
            etype: i32::from(tgt.key.keytype),
            value: tgt.key.keyvalue.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kerberos::hash::CrackFormat;
    use kerberos_asn1::{ApReq, EncryptedData, EncryptionKey, TgsReq};
    use std::io;
    use std::net::SocketAddr;
    use std::sync::Mutex;

    struct CannedChannel {
        replies: Mutex<Vec<io::Result<Vec<u8>>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl CannedChannel {
        fn new(replies: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl KrbChannel for CannedChannel {
        fn send_recv(&self, raw: &[u8]) -> io::Result<Vec<u8>> {
            self.sent.lock().unwrap().push(raw.to_vec());
            self.replies.lock().unwrap().remove(0)
        }

        fn address(&self) -> SocketAddr {
            "127.0.0.1:88".parse().unwrap()
        }
    }

    fn krb_error(code: i32) -> Vec<u8> {
        let mut err = KrbError::default();
        err.error_code = code;
        err.realm = "CORP.LOCAL".into();
        err.build()
    }

    fn cred(kind: &str, secret: &str) -> CredentialSpec {
        format!("CORP.LOCAL/alice/{}:{}@127.0.0.1", kind, secret)
            .parse()
            .unwrap()
    }

    const NT_KEY: &str = "31d6cfe0d16ae931b73c59d7e0c089c0";

    fn ticket(sname: &[&str], etype: i32, cipher_len: usize) -> Ticket {
        let mut ticket = Ticket::default();
        ticket.realm = "CORP.LOCAL".into();
        ticket.sname = PrincipalName {
            name_type: 2,
            name_string: sname.iter().map(|s| s.to_string()).collect(),
        };
        ticket.enc_part = EncryptedData::new(etype, None, (0..cipher_len as u8).collect());
        ticket
    }

    fn tgt_session() -> KdcSession {
        IssuedTicket {
            client: TargetDescriptor::new("CORP.LOCAL", "alice"),
            service_realm: "CORP.LOCAL".into(),
            service: vec!["krbtgt".into(), "CORP.LOCAL".into()],
            ticket: ticket(&["krbtgt", "CORP.LOCAL"], etypes::AES256_CTS_HMAC_SHA1_96, 64).build(),
            key: SessionKey {
                etype: etypes::RC4_HMAC,
                value: vec![0x5A; 16],
            },
        }
    }

    fn tgs_rep_for(username: &str) -> Vec<u8> {
        let mut tgs_rep = TgsRep::default();
        tgs_rep.crealm = "CORP.LOCAL".into();
        tgs_rep.cname = user_principal("alice");
        tgs_rep.ticket = ticket(&[username], etypes::RC4_HMAC, 40);
        tgs_rep.enc_part = EncryptedData::new(etypes::RC4_HMAC, None, vec![0x33; 48]);
        tgs_rep.build()
    }

    #[test]
    fn username_lookup_maps_error_codes() {
        let kdc = NetworkKdc::new(
            CannedChannel::new(vec![
                Ok(krb_error(error_codes::KDC_ERR_PREAUTH_REQUIRED)),
                Ok(krb_error(error_codes::KDC_ERR_C_PRINCIPAL_UNKNOWN)),
                Ok(krb_error(18)),
            ]),
            false,
        );

        assert_eq!(kdc.probe_username("CORP.LOCAL", "alice").unwrap(), UserProbe::Exists);
        assert_eq!(kdc.probe_username("CORP.LOCAL", "ghost").unwrap(), UserProbe::Unknown);
        let err = kdc.probe_username("CORP.LOCAL", "disabled").unwrap_err();
        assert_eq!(err.to_string(), "KDC_ERR_CLIENT_REVOKED (18)");
    }

    #[test]
    fn asrep_roast_reports_preauth_required() {
        let kdc = NetworkKdc::new(
            CannedChannel::new(vec![Ok(krb_error(error_codes::KDC_ERR_PREAUTH_REQUIRED))]),
            false,
        );
        let target = TargetDescriptor::new("CORP.LOCAL", "alice");
        let err = kdc
            .request_as_rep(&target, &EncryptionTypeSet::new([Etype::Rc4]))
            .unwrap_err();
        assert_eq!(err.to_string(), "KDC_ERR_PREAUTH_REQUIRED (25)");
    }

    #[test]
    fn transport_errors_name_the_kdc() {
        let kdc = NetworkKdc::new(
            CannedChannel::new(vec![Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))]),
            false,
        );
        let target = TargetDescriptor::new("CORP.LOCAL", "alice");
        let err = kdc
            .request_as_rep(&target, &EncryptionTypeSet::new([Etype::Rc4]))
            .unwrap_err();
        assert!(matches!(err, KdcError::Transport(ref m) if m.contains("127.0.0.1:88")));
    }

    #[test]
    fn garbage_reply_is_a_decode_error() {
        let kdc = NetworkKdc::new(CannedChannel::new(vec![Ok(vec![0x01, 0x02])]), false);
        let err = kdc.probe_username("CORP.LOCAL", "alice").unwrap_err();
        assert!(matches!(err, KdcError::Decode(_)));
    }

    #[test]
    fn password_falls_back_to_rc4_when_aes_is_refused() {
        let channel = CannedChannel::new(vec![
            Ok(krb_error(error_codes::KDC_ERR_ETYPE_NOSUPP)),
            Ok(krb_error(error_codes::KDC_ERR_PREAUTH_FAILED)),
        ]);
        let kdc = NetworkKdc::new(channel, false);

        let err = kdc.authenticate(&cred("pw", "Summer2024!")).unwrap_err();
        assert_eq!(err.code(), Some(error_codes::KDC_ERR_PREAUTH_FAILED));
        assert_eq!(kdc.channel.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn key_material_is_validated() {
        let nt = user_keys(&cred("nt", "aad3b435b51404eeaad3b435b51404ee:31d6cfe0d16ae931b73c59d7e0c089c0"))
            .unwrap();
        assert_eq!(nt[0].etype, etypes::RC4_HMAC);
        assert_eq!(nt[0].value.len(), 16);

        let aes = user_keys(&cred("aes", &"ab".repeat(16))).unwrap();
        assert_eq!(aes[0].etype, etypes::AES128_CTS_HMAC_SHA1_96);

        assert!(matches!(user_keys(&cred("nt", "abcd")), Err(KdcError::Crypto(_))));
        assert!(matches!(user_keys(&cred("aes", "zz")), Err(KdcError::Crypto(_))));
    }

    #[test]
    fn kerberoast_renders_the_service_ticket() {
        let kdc = NetworkKdc::new(CannedChannel::new(vec![Ok(tgs_rep_for("svc_sql"))]), false);
        let target = TargetDescriptor::new("CORP.LOCAL", "svc_sql");

        let roast = kdc
            .request_service_ticket(&tgt_session(), &target, &EncryptionTypeSet::new([Etype::Rc4]))
            .unwrap();

        assert_eq!(
            roast.to_crack_string(CrackFormat::Hashcat),
            format!(
                "$krb5tgs$23$*svc_sql$CORP.LOCAL$svc_sql@CORP.LOCAL*${}${}",
                hex::encode((0..16u8).collect::<Vec<_>>()),
                hex::encode((16..40u8).collect::<Vec<_>>())
            )
        );
    }

    #[test]
    fn tgs_req_presents_the_session_ticket() {
        let kdc = NetworkKdc::new(CannedChannel::new(vec![Ok(tgs_rep_for("svc_sql"))]), false);
        let session = tgt_session();
        let target = TargetDescriptor::new("CORP.LOCAL", "svc_sql");

        kdc.request_service_ticket(&session, &target, &EncryptionTypeSet::new(Etype::CANONICAL))
            .unwrap();

        let sent = kdc.channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (_, tgs_req) = TgsReq::parse(&sent[0]).unwrap();
        assert_eq!(tgs_req.req_body.sname, Some(user_principal("svc_sql")));
        assert_eq!(tgs_req.req_body.etypes, vec![23, 17, 18]);

        let padata = tgs_req.padata.unwrap_or_default();
        let pa_tgs_req = padata.iter().find(|pa| pa.padata_type == 1).unwrap();
        let (_, ap_req) = ApReq::parse(&pa_tgs_req.padata_value).unwrap();
        assert_eq!(ap_req.ticket, parse_ticket(&session.ticket).unwrap());
        assert_eq!(ap_req.authenticator.etype, etypes::RC4_HMAC);
    }

    #[test]
    fn as_rep_yields_the_session_key() {
        let nt = hex::decode(NT_KEY).unwrap();
        let mut part = EncAsRepPart::default();
        part.key = EncryptionKey::new(etypes::RC4_HMAC, vec![0x42; 16]);
        part.srealm = "CORP.LOCAL".into();
        let cipher = new_kerberos_cipher(etypes::RC4_HMAC)
            .unwrap()
            .encrypt(&nt, KEY_USAGE_AS_REP_ENC_PART, &part.build());

        let mut as_rep = AsRep::default();
        as_rep.crealm = "CORP.LOCAL".into();
        as_rep.cname = user_principal("alice");
        as_rep.ticket = ticket(&["krbtgt", "CORP.LOCAL"], etypes::AES256_CTS_HMAC_SHA1_96, 64);
        as_rep.enc_part = EncryptedData::new(etypes::RC4_HMAC, None, cipher);

        let kdc = NetworkKdc::new(CannedChannel::new(vec![Ok(as_rep.build())]), false);
        let session = kdc.authenticate(&cred("nt", NT_KEY)).unwrap();

        assert_eq!(session.client, TargetDescriptor::new("CORP.LOCAL", "alice"));
        assert_eq!(session.service, vec!["krbtgt", "CORP.LOCAL"]);
        assert_eq!(session.ticket, as_rep.ticket.build());
        assert_eq!(session.key.etype, etypes::RC4_HMAC);
        assert_eq!(session.key.value, vec![0x42; 16]);
    }

    #[test]
    fn as_rep_with_the_wrong_key_is_a_crypto_error() {
        let mut as_rep = AsRep::default();
        as_rep.crealm = "CORP.LOCAL".into();
        as_rep.ticket = ticket(&["krbtgt", "CORP.LOCAL"], etypes::AES256_CTS_HMAC_SHA1_96, 64);
        as_rep.enc_part = EncryptedData::new(etypes::RC4_HMAC, None, vec![0x01; 64]);

        let kdc = NetworkKdc::new(CannedChannel::new(vec![Ok(as_rep.build())]), false);
        let err = kdc.authenticate(&cred("nt", NT_KEY)).unwrap_err();
        assert!(matches!(err, KdcError::Crypto(_)));
    }

    #[test]
    fn missing_ccache_is_reported() {
        let kdc = NetworkKdc::new(CannedChannel::new(vec![]), false);
        let err = kdc
            .authenticate(&cred("ccache", "/nonexistent/alice.ccache"))
            .unwrap_err();
        assert!(matches!(err, KdcError::Decode(ref m) if m.contains("alice.ccache")));
    }
}
