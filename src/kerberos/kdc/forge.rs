use super::super::engine::{KdcError, SessionKey};
use chrono::{DateTime, NaiveDate, Utc};
use kerberos_asn1::{
    ApReq, AsReq, Asn1Object, Authenticator, EncryptedData, KdcReq, KerbPaPacRequest,
    KerberosTime, PaData, PaEncTsEnc, PrincipalName, TgsReq, Ticket,
};
use kerberos_constants::{kdc_options, pa_data_types, principal_names};
use kerberos_crypto::new_kerberos_cipher;
use rand::Rng;

pub const PA_TGS_REQ: i32 = 1;
pub const PA_ENC_TIMESTAMP: i32 = 2;

pub const KEY_USAGE_AS_REQ_TIMESTAMP: i32 = 1;
pub const KEY_USAGE_AS_REP_ENC_PART: i32 = 3;
pub const KEY_USAGE_TGS_REQ_AUTHENTICATOR: i32 = 7;
pub const KEY_USAGE_TGS_REP_ENC_PART: i32 = 8;

pub struct KdcReqBuilder {
    realm: String,
    sname: PrincipalName,
    etypes: Vec<i32>,
    kdc_options: u32,
    cname: Option<PrincipalName>,
    padatas: Vec<PaData>,
    nonce: u32,
    till: KerberosTime,
    rtime: Option<KerberosTime>,
}

impl KdcReqBuilder {
    /// Starts a request for the `krbtgt` service of `realm`.
    pub fn new(realm: &str) -> Self {
        let realm = realm.to_uppercase();
        Self {
            sname: PrincipalName {
                name_type: principal_names::NT_SRV_INST,
                name_string: vec!["krbtgt".into(), realm.clone()],
            },
            realm,
            etypes: Vec::new(),
            kdc_options: kdc_options::FORWARDABLE
                | kdc_options::RENEWABLE
                | kdc_options::CANONICALIZE
                | kdc_options::RENEWABLE_OK,
            cname: None,
            padatas: Vec::new(),
            nonce: rand::thread_rng().gen(),
            till: windows_expiration_time().into(),
            rtime: Some(windows_expiration_time().into()),
        }
    }

    pub fn kdc_options(mut self, kdc_options: u32) -> Self {
        self.kdc_options = kdc_options;
        self
    }

    pub fn etypes(mut self, etypes: Vec<i32>) -> Self {
        self.etypes = etypes;
        self
    }

    pub fn username(mut self, username: &str) -> Self {
        self.cname = Some(PrincipalName {
            name_type: principal_names::NT_PRINCIPAL,
            name_string: vec![username.to_string()],
        });
        self
    }

    pub fn sname(mut self, sname: PrincipalName) -> Self {
        self.sname = sname;
        self
    }

    pub fn push_padata(mut self, padata: PaData) -> Self {
        self.padatas.push(padata);
        self
    }

    pub fn request_pac(self) -> Self {
        self.push_padata(PaData::new(
            pa_data_types::PA_PAC_REQUEST,
            KerbPaPacRequest::new(true).build(),
        ))
    }

    pub fn clear_rtime(mut self) -> Self {
        self.rtime = None;
        self
    }

    pub fn build(self) -> KdcReq {
        let mut req = KdcReq::default();

        req.req_body.kdc_options = self.kdc_options.into();
        req.req_body.cname = self.cname;
        req.req_body.realm = self.realm;
        req.req_body.sname = Some(self.sname);
        req.req_body.till = self.till;
        req.req_body.rtime = self.rtime;
        req.req_body.nonce = self.nonce;
        req.req_body.etypes = self.etypes;

        if !self.padatas.is_empty() {
            req.padata = Some(self.padatas);
        }

        req
    }

    pub fn build_as_req(self) -> AsReq {
        self.build().into()
    }

    pub fn build_tgs_req(self) -> TgsReq {
        self.build().into()
    }
}

/// User principal of a plain account, as used to roast accounts that own
/// an SPN without knowing the SPN itself.
pub fn user_principal(username: &str) -> PrincipalName {
    PrincipalName {
        name_type: principal_names::NT_PRINCIPAL,
        name_string: vec![username.to_string()],
    }
}

/// `service/host[/...]` as an NT-SRV-INST principal.
pub fn service_principal(spn: &str) -> PrincipalName {
    PrincipalName {
        name_type: principal_names::NT_SRV_INST,
        name_string: spn.split('/').map(String::from).collect(),
    }
}

/// PA-ENC-TIMESTAMP proving knowledge of `key`.
pub fn encrypted_timestamp(etype: i32, key: &[u8]) -> Result<PaData, KdcError> {
    let cipher = new_kerberos_cipher(etype).map_err(|e| KdcError::Crypto(format!("{:?}", e)))?;
    let timestamp = PaEncTsEnc::from(Utc::now());
    let encrypted = cipher.encrypt(key, KEY_USAGE_AS_REQ_TIMESTAMP, &timestamp.build());

    Ok(PaData::new(
        PA_ENC_TIMESTAMP,
        EncryptedData::new(etype, None, encrypted).build(),
    ))
}

/// PA-TGS-REQ wrapping an AP-REQ built from the TGT and its session key.
pub fn tgs_authentication(
    realm: &str,
    username: &str,
    tgt: Ticket,
    key: &SessionKey,
) -> Result<PaData, KdcError> {
    let cipher =
        new_kerberos_cipher(key.etype).map_err(|e| KdcError::Crypto(format!("{:?}", e)))?;

    let mut authenticator = Authenticator::default();
    authenticator.crealm = realm.to_uppercase();
    authenticator.cname = user_principal(username);
    authenticator.ctime = Utc::now().into();

    let encrypted = cipher.encrypt(
        &key.value,
        KEY_USAGE_TGS_REQ_AUTHENTICATOR,
        &authenticator.build(),
    );
    let mut ap_req = ApReq::default();
    ap_req.ticket = tgt;
    ap_req.authenticator = EncryptedData::new(key.etype, None, encrypted);

    Ok(PaData::new(PA_TGS_REQ, ap_req.build()))
}

fn windows_expiration_time() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2037, 9, 13)
        .and_then(|date| date.and_hms_opt(2, 48, 5))
        .map(|time| time.and_utc())
        .unwrap_or_else(Utc::now)
}
