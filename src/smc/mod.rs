//! # SMC channel
//!
//! Typed request/response access to the Apple System Management Controller.
//!
//! An [`Smc`] value represents one open connection to the `AppleSMC` user
//! client. It is created by [`Smc::open`], borrowed by the read and write
//! operations, and closed either explicitly with [`Smc::close`] or when it is
//! dropped. Callers are expected to open a channel for one batch of
//! operations and let it go straight after; nothing in this crate keeps a
//! connection alive across poll intervals.
//!
//! Every transaction goes through [`Smc::call_driver`], which keeps the two
//! levels of status apart: the IOKit return code of the call itself, and the
//! SMC result byte inside the response record.
//!
//! ```no_run
//! use darwin_bclm::smc::{DataType, Smc, SmcKey};
//!
//! fn main() -> darwin_bclm::Result<()> {
//!     let mut smc = Smc::open()?;
//!     let bytes = smc.read_key(SmcKey::from_static("CHTE"), DataType::UINT32)?;
//!     println!("charging {}", if bytes[0] != 0 { "disabled" } else { "enabled" });
//!     smc.close();
//!     Ok(())
//! }
//! ```

pub mod key;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(test)]
mod tests;

use std::fmt::Debug;

use tracing::{debug, trace, warn};

pub use crate::utils::bindings::{SMCParamStruct, SmcBytes, SMC_BYTES_LEN};
pub use key::{DataType, FourCharCode, SmcKey};

use crate::error::{Error, Result};
use crate::utils::bindings::{
    IO_RETURN_NOT_PRIVILEGED, IO_RETURN_SUCCESS, SMC_CMD_READ_BYTES, SMC_CMD_READ_KEYINFO, SMC_CMD_WRITE_BYTES,
    SMC_RESULT_KEY_NOT_FOUND, SMC_RESULT_SUCCESS,
};
pub use crate::utils::bindings::KERNEL_INDEX_SMC;

/// Command carried in the request record's `data8` field
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadKey = SMC_CMD_READ_BYTES,
    WriteKey = SMC_CMD_WRITE_BYTES,
    GetKeyInfo = SMC_CMD_READ_KEYINFO,
}

impl Command {
    /// Request record for `key` with this command filled in
    pub fn request(self, key: SmcKey) -> SMCParamStruct {
        SMCParamStruct { key: key.code(), data8: self as u8, ..Default::default() }
    }
}

/// Low-level struct-method call into the SMC driver
///
/// Implementations return the raw IOKit return code. They never interpret
/// the SMC result byte; that is [`Smc::call_driver`]'s job.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Debug + Send {
    fn call_struct_method(&mut self, method: u32, input: &SMCParamStruct, output: &mut SMCParamStruct) -> i32;

    /// Release the underlying connection, reporting whether that succeeded
    fn close(&mut self) -> bool;
}

/// Source of fresh SMC connections
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Debug + Send + Sync {
    fn connect(&self) -> Result<Smc>;
}

/// Connects to the real `AppleSMC` service
#[derive(Debug, Default, Clone, Copy)]
pub struct IOKitConnector;

impl Connector for IOKitConnector {
    fn connect(&self) -> Result<Smc> {
        Smc::open()
    }
}

/// An open connection to the SMC
#[derive(Debug)]
pub struct Smc {
    transport: Box<dyn Transport>,
    closed: bool,
}

impl Smc {
    /// Open a connection to the `AppleSMC` service
    ///
    /// Fails with [`Error::DriverNotFound`] when the service does not exist
    /// and [`Error::FailedToOpen`] when it cannot be opened. Missing
    /// privileges only show up once a transaction is issued.
    pub fn open() -> Result<Self> {
        let transport = iokit::IOKitTransport::open()?;
        Ok(Self::with_transport(Box::new(transport)))
    }

    /// Wrap an already-open transport
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self { transport, closed: false }
    }

    /// Close the connection. Best-effort: failures are reported, never raised.
    pub fn close(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if self.closed {
            return true;
        }
        self.closed = true;
        self.transport.close()
    }

    /// Issue one transaction through [`KERNEL_INDEX_SMC`]
    pub fn call(&mut self, input: &SMCParamStruct) -> Result<SMCParamStruct> {
        self.call_driver(input, KERNEL_INDEX_SMC)
    }

    /// Issue one transaction through IOKit method `method` and map both
    /// status levels onto [`Error`]
    pub fn call_driver(&mut self, input: &SMCParamStruct, method: u32) -> Result<SMCParamStruct> {
        let mut output = SMCParamStruct::default();
        let io_return = self.transport.call_struct_method(method, input, &mut output);

        trace!(
            key = %SmcKey::from_code(input.key),
            command = input.data8,
            io_return,
            smc_result = output.result,
            "SMC call"
        );

        match io_return {
            IO_RETURN_SUCCESS => match output.result {
                SMC_RESULT_SUCCESS => Ok(output),
                SMC_RESULT_KEY_NOT_FOUND => Err(Error::key_not_found(SmcKey::from_code(input.key).to_string())),
                smc_result => Err(Error::Unknown { io_return, smc_result }),
            },
            IO_RETURN_NOT_PRIVILEGED => Err(Error::NotPrivileged),
            _ => Err(Error::Unknown { io_return, smc_result: output.result }),
        }
    }

    /// Ask the controller for the type and size of a key
    pub fn key_info(&mut self, key: SmcKey) -> Result<DataType> {
        let output = self.call(&Command::GetKeyInfo.request(key))?;

        Ok(DataType::new(FourCharCode::from_code(output.key_info.data_type), output.key_info.data_size))
    }

    /// Read the raw payload of a key
    ///
    /// Only the first `data_type.size` bytes are meaningful.
    pub fn read_key(&mut self, key: SmcKey, data_type: DataType) -> Result<SmcBytes> {
        let mut input = Command::ReadKey.request(key);
        input.key_info.data_size = data_type.size;

        let output = self.call(&input)?;
        debug!(key = %key, value = ?&output.bytes[..payload_len(data_type)], "Read SMC key");
        Ok(output.bytes)
    }

    /// Write a payload to a key
    pub fn write_key(&mut self, key: SmcKey, data_type: DataType, payload: &SmcBytes) -> Result<()> {
        let mut input = SMCParamStruct { bytes: *payload, ..Command::WriteKey.request(key) };
        input.key_info.data_size = data_type.size;

        self.call(&input)?;
        debug!(key = %key, value = ?&payload[..payload_len(data_type)], "Wrote SMC key");
        Ok(())
    }
}

impl Drop for Smc {
    fn drop(&mut self) {
        if !self.release() {
            warn!("Failed to close SMC connection");
        }
    }
}

fn payload_len(data_type: DataType) -> usize {
    (data_type.size as usize).min(SMC_BYTES_LEN)
}

#[cfg(target_os = "macos")]
mod iokit {
    use std::mem::size_of;
    use std::os::raw::c_void;

    use tracing::debug;

    use super::Transport;
    use crate::error::{Error, Result};
    use crate::utils::bindings::{
        mach_task_self_, IOConnectCallStructMethod, IOObjectRelease, IOServiceClose, IOServiceGetMatchingService,
        IOServiceMatching, IOServiceOpen, SMCParamStruct, IO_MAIN_PORT_DEFAULT, IO_RETURN_SUCCESS,
        SMC_PARAM_STRUCT_SIZE, SMC_SERVICE_NAME,
    };

    #[derive(Debug)]
    pub(super) struct IOKitTransport {
        connection: u32,
    }

    impl IOKitTransport {
        pub(super) fn open() -> Result<Self> {
            let service = unsafe {
                // IOServiceGetMatchingService consumes the matching dictionary
                let matching = IOServiceMatching(SMC_SERVICE_NAME.as_ptr());
                if matching.is_null() {
                    return Err(Error::DriverNotFound);
                }
                IOServiceGetMatchingService(IO_MAIN_PORT_DEFAULT, matching)
            };
            if service == 0 {
                return Err(Error::DriverNotFound);
            }
            let service = scopeguard::guard(service, |service| unsafe {
                IOObjectRelease(service);
            });

            let mut connection = 0u32;
            let code = unsafe { IOServiceOpen(*service, mach_task_self_, 0, &mut connection) };
            if code != IO_RETURN_SUCCESS {
                return Err(Error::FailedToOpen { code });
            }

            debug!(connection, "Opened AppleSMC connection");
            Ok(Self { connection })
        }
    }

    impl Transport for IOKitTransport {
        fn call_struct_method(&mut self, method: u32, input: &SMCParamStruct, output: &mut SMCParamStruct) -> i32 {
            let mut output_size = size_of::<SMCParamStruct>();
            let code = unsafe {
                IOConnectCallStructMethod(
                    self.connection,
                    method,
                    input as *const SMCParamStruct as *const c_void,
                    size_of::<SMCParamStruct>(),
                    output as *mut SMCParamStruct as *mut c_void,
                    &mut output_size,
                )
            };
            if output_size != SMC_PARAM_STRUCT_SIZE {
                debug!(output_size, "AppleSMC returned a short record");
            }
            code
        }

        fn close(&mut self) -> bool {
            let code = unsafe { IOServiceClose(self.connection) };
            debug!(connection = self.connection, code, "Closed AppleSMC connection");
            code == IO_RETURN_SUCCESS
        }
    }
}

#[cfg(not(target_os = "macos"))]
mod iokit {
    use super::{SMCParamStruct, Transport};
    use crate::error::{Error, Result};

    /// Stand-in used on hosts without IOKit; it can never be opened
    #[derive(Debug)]
    pub(super) enum IOKitTransport {}

    impl IOKitTransport {
        pub(super) fn open() -> Result<Self> {
            Err(Error::DriverNotFound)
        }
    }

    impl Transport for IOKitTransport {
        fn call_struct_method(&mut self, _method: u32, _input: &SMCParamStruct, _output: &mut SMCParamStruct) -> i32 {
            match *self {}
        }

        fn close(&mut self) -> bool {
            match *self {}
        }
    }
}
