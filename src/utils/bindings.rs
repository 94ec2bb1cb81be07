//! FFI bindings to IOKit and the AppleSMC user client.
//!
//! The SMC is driven through `IOConnectCallStructMethod` with a single
//! fixed-size record used for both request and response. The driver rejects
//! any call whose record is not exactly 80 bytes, so the layout below is
//! checked at compile time.

use std::ffi::CStr;
#[cfg(target_os = "macos")]
use std::os::raw::{c_char, c_void};

//------------------------------------------------------------------------------
// IOKit constants
//------------------------------------------------------------------------------

/// IOKit method index of the SMC user client (`kSMCHandleYPCEvent`)
pub const KERNEL_INDEX_SMC: u32 = 2;

// Commands carried in `SMCParamStruct::data8`
pub const SMC_CMD_READ_BYTES: u8 = 5;
pub const SMC_CMD_WRITE_BYTES: u8 = 6;
pub const SMC_CMD_READ_KEYINFO: u8 = 9;

// Device-level result codes carried in `SMCParamStruct::result`
pub const SMC_RESULT_SUCCESS: u8 = 0;
pub const SMC_RESULT_ERROR: u8 = 1;
pub const SMC_RESULT_KEY_NOT_FOUND: u8 = 132;

// Transport-level IOKit return codes
pub const IO_RETURN_SUCCESS: i32 = 0;
pub const IO_RETURN_NOT_PRIVILEGED: i32 = 0xE000_02C1_u32 as i32;
pub const IO_RETURN_BAD_ARGUMENT: i32 = 0xE000_02C2_u32 as i32;

/// `kIOMainPortDefault` (formerly `kIOMasterPortDefault`)
pub const IO_MAIN_PORT_DEFAULT: u32 = 0;

/// Name of the IOService that exposes the SMC user client
pub const SMC_SERVICE_NAME: &CStr = c"AppleSMC";

//------------------------------------------------------------------------------
// SMC data structures
//------------------------------------------------------------------------------

pub const SMC_PARAM_STRUCT_SIZE: usize = 80;
pub const SMC_BYTES_LEN: usize = 32;

/// Payload area of an SMC transaction
pub type SmcBytes = [u8; SMC_BYTES_LEN];

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SMCVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub reserved: u8,
    pub release: u16,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SMCPLimitData {
    pub version: u16,
    pub length: u16,
    pub cpu_plimit: u32,
    pub gpu_plimit: u32,
    pub mem_plimit: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SMCKeyInfoData {
    pub data_size: u32,
    pub data_type: u32,
    pub data_attributes: u8,
}

/// Request/response record shared with AppleSMC.kext
///
/// Padding is left to the C ABI: the key-info block rounds up to 12 bytes and
/// one byte sits between `data8` and `data32`.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SMCParamStruct {
    pub key: u32,
    pub vers: SMCVersion,
    pub p_limit_data: SMCPLimitData,
    pub key_info: SMCKeyInfoData,
    pub result: u8,
    pub status: u8,
    pub data8: u8,
    pub data32: u32,
    pub bytes: SmcBytes,
}

const _: () = assert!(std::mem::size_of::<SMCParamStruct>() == SMC_PARAM_STRUCT_SIZE);

//------------------------------------------------------------------------------
// External C functions (IOKit, Mach)
//------------------------------------------------------------------------------

#[cfg(target_os = "macos")]
#[allow(non_upper_case_globals, non_snake_case)]
extern "C" {
    pub static mach_task_self_: u32;

    pub fn IOServiceMatching(name: *const c_char) -> *mut c_void;
    pub fn IOServiceGetMatchingService(main_port: u32, matching: *mut c_void) -> u32;
    pub fn IOServiceOpen(service: u32, owning_task: u32, type_: u32, connect: *mut u32) -> i32;
    pub fn IOServiceClose(connect: u32) -> i32;
    pub fn IOObjectRelease(object: u32) -> i32;
    pub fn IOConnectCallStructMethod(
        connection: u32,
        selector: u32,
        input: *const c_void,
        input_cnt: usize,
        output: *mut c_void,
        output_cnt: *mut usize,
    ) -> i32;
}
