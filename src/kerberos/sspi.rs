//! Service tickets for the logged-on user, requested through the LSA
//! Kerberos package. Only available on Windows.

use super::engine::{KdcError, TicketHarvester};
use super::spec::TargetDescriptor;
use crate::error::{Error, Result};

/// Asks the local LSA for a service ticket per target, in the logon session
/// of the current user.
pub struct LsaHarvester {
    _private: (),
}

impl LsaHarvester {
    pub fn new() -> Result<Self> {
        if cfg!(windows) {
            Ok(Self { _private: () })
        } else {
            Err(Error::UnsupportedPlatform("SSPI ticket harvesting"))
        }
    }
}

impl TicketHarvester for LsaHarvester {
    fn service_ticket(&self, target: &TargetDescriptor) -> std::result::Result<Vec<u8>, KdcError> {
        let principal = target.principal();
        log::debug!("Requesting {} from LSA", principal);

        #[cfg(windows)]
        {
            lsa::retrieve_encoded_ticket(&principal).map_err(|e| KdcError::Os(e.to_string()))
        }
        #[cfg(not(windows))]
        {
            Err(KdcError::Os(format!(
                "cannot request {}: no LSA on this platform",
                principal
            )))
        }
    }
}

#[cfg(windows)]
mod lsa {
    use core::ffi::c_void;
    use std::alloc::{alloc, dealloc, Layout};
    use std::fmt;
    use std::ptr::copy_nonoverlapping;
    use windows::core::{PSTR, PWSTR};
    use windows::Win32::Foundation::{HANDLE, LUID, NTSTATUS};
    use windows::Win32::Security::Authentication::Identity::{
        LsaCallAuthenticationPackage, LsaConnectUntrusted, LsaDeregisterLogonProcess,
        LsaFreeReturnBuffer, LsaLookupAuthenticationPackage, LsaNtStatusToWinError,
        KERB_CRYPTO_KEY_TYPE, KERB_PROTOCOL_MESSAGE_TYPE, KERB_RETRIEVE_TKT_REQUEST,
        KERB_RETRIEVE_TKT_RESPONSE, LSA_STRING, LSA_UNICODE_STRING,
    };
    use windows::Win32::Security::Credentials::SecHandle;

    const LSA_KERBEROS_NAME_A: &str = "Kerberos";
    const KERB_RETRIEVE_ENCODED_TICKET_MESSAGE: i32 = 8;
    const KERB_ETYPE_DEFAULT: i32 = 0;

    #[derive(Debug)]
    pub struct WinApiError {
        pub error: u32,
        pub source: &'static str,
    }

    impl fmt::Display for WinApiError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(
                f,
                "Windows error in {} : {} (0x{:x})",
                self.source, self.error, self.error
            )
        }
    }

    fn check(status: NTSTATUS, source: &'static str) -> Result<(), WinApiError> {
        if status.0 != 0 {
            let error = unsafe { LsaNtStatusToWinError(status) };
            return Err(WinApiError { error, source });
        }
        Ok(())
    }

    /// Untrusted LSA connection, deregistered on drop.
    struct LsaConnection(HANDLE);

    impl LsaConnection {
        fn open() -> Result<Self, WinApiError> {
            let mut handle = HANDLE(std::ptr::null_mut());
            let status = unsafe { LsaConnectUntrusted(&mut handle) };
            check(status, "LsaConnectUntrusted")?;
            Ok(Self(handle))
        }

        fn kerberos_package(&self) -> Result<u32, WinApiError> {
            let mut name = LSA_KERBEROS_NAME_A.to_string().into_bytes();
            let package_name = LSA_STRING {
                Length: name.len() as u16,
                MaximumLength: name.len() as u16,
                Buffer: PSTR(name.as_mut_ptr()),
            };

            let mut package = 0;
            let status =
                unsafe { LsaLookupAuthenticationPackage(self.0, &package_name, &mut package) };
            check(status, "LsaLookupAuthenticationPackage")?;
            Ok(package)
        }
    }

    impl Drop for LsaConnection {
        fn drop(&mut self) {
            unsafe {
                let _ = LsaDeregisterLogonProcess(self.0);
            }
        }
    }

    /// KERB_RETRIEVE_ENCODED_TICKET_MESSAGE for the current logon session.
    /// Without cache-only options the LSA asks the KDC when the ticket is
    /// not cached yet.
    pub fn retrieve_encoded_ticket(target_name: &str) -> Result<Vec<u8>, WinApiError> {
        let connection = LsaConnection::open()?;
        let package = connection.kerberos_package()?;

        let mut wide_name: Vec<u16> = target_name.encode_utf16().collect();
        wide_name.push(0);
        let name_size = (wide_name.len() * 2) as u16;
        let request_size = std::mem::size_of::<KERB_RETRIEVE_TKT_REQUEST>() + name_size as usize;

        let mut response_ptr: *mut KERB_RETRIEVE_TKT_RESPONSE = std::ptr::null_mut();
        let mut response_size = 0;
        let mut protocol_status = 0;

        unsafe {
            let layout = Layout::from_size_align_unchecked(
                request_size,
                std::mem::align_of::<KERB_RETRIEVE_TKT_REQUEST>(),
            );
            let request_ptr = alloc(layout);
            let name_ptr = (request_ptr as usize
                + std::mem::size_of::<KERB_RETRIEVE_TKT_REQUEST>())
                as *mut u16;
            copy_nonoverlapping(wide_name.as_ptr(), name_ptr, wide_name.len());

            let request = KERB_RETRIEVE_TKT_REQUEST {
                MessageType: KERB_PROTOCOL_MESSAGE_TYPE(KERB_RETRIEVE_ENCODED_TICKET_MESSAGE),
                LogonId: LUID::default(),
                TargetName: LSA_UNICODE_STRING {
                    Length: name_size - 2,
                    MaximumLength: name_size,
                    Buffer: PWSTR(name_ptr),
                },
                TicketFlags: 0,
                CacheOptions: 0,
                EncryptionType: KERB_CRYPTO_KEY_TYPE(KERB_ETYPE_DEFAULT),
                CredentialsHandle: SecHandle::default(),
            };
            copy_nonoverlapping(
                &request as *const KERB_RETRIEVE_TKT_REQUEST as *const u8,
                request_ptr,
                std::mem::size_of::<KERB_RETRIEVE_TKT_REQUEST>(),
            );

            let status = LsaCallAuthenticationPackage(
                connection.0,
                package,
                request_ptr as *const c_void,
                request_size as u32,
                Some(&mut response_ptr as *mut _ as *mut *mut c_void),
                Some(&mut response_size),
                Some(&mut protocol_status),
            );
            dealloc(request_ptr, layout);

            check(status, "LsaCallAuthenticationPackage")?;
            check(NTSTATUS(protocol_status), "KERB_RETRIEVE_TKT_REQUEST")?;

            let response = *response_ptr;
            let ticket = std::slice::from_raw_parts(
                response.Ticket.EncodedTicket,
                response.Ticket.EncodedTicketSize as usize,
            )
            .to_vec();

            let _ = LsaFreeReturnBuffer(response_ptr as *const c_void);
            Ok(ticket)
        }
    }
}
