//! Four-character codes and SMC data type descriptors.
//!
//! SMC registers and their value types are both named by four ASCII
//! characters packed big-endian into a `u32`, so `"CHTE"` becomes
//! `0x43485445`.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// A four-character code packed big-endian into a `u32`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCharCode(u32);

/// Identifier of one SMC register
pub type SmcKey = FourCharCode;

impl FourCharCode {
    /// Build a code from a literal, checked at compile time when used in a const
    ///
    /// # Panics
    ///
    /// Panics if `code` is not exactly four bytes long.
    pub const fn from_static(code: &'static str) -> Self {
        let bytes = code.as_bytes();
        assert!(bytes.len() == 4, "four-character codes must be exactly 4 bytes");
        Self(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Wrap a raw code, e.g. one reported back by the driver
    pub const fn from_code(code: u32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl FromStr for FourCharCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err(Error::invalid_key(format!("'{}' must be exactly 4 characters", s)));
        }
        if !bytes.iter().all(u8::is_ascii) {
            return Err(Error::invalid_key(format!("'{}' must be ASCII", s)));
        }
        Ok(Self::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for FourCharCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCharCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCharCode(\"{}\" = {:#010x})", self, self.0)
    }
}

impl Serialize for FourCharCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Value type of an SMC key, used to size transaction payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataType {
    /// Type tag such as `ui32`
    pub tag: FourCharCode,
    /// Payload size in bytes
    pub size: u32,
}

impl DataType {
    pub const FLAG: DataType = DataType { tag: FourCharCode::from_static("flag"), size: 1 };
    pub const UINT8: DataType = DataType { tag: FourCharCode::from_static("ui8 "), size: 1 };
    pub const UINT32: DataType = DataType { tag: FourCharCode::from_static("ui32"), size: 4 };

    pub const fn new(tag: FourCharCode, size: u32) -> Self {
        Self { tag, size }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.tag, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_key_codes() {
        assert_eq!(SmcKey::from_static("CHTE").code(), 0x4348_5445);
        assert_eq!(SmcKey::from_static("CH0B").code(), 0x4348_3042);
        assert_eq!(SmcKey::from_static("#KEY").to_bytes(), *b"#KEY");
    }

    #[test]
    fn test_encode_decode_identity() {
        for raw in ["CHTE", "CH0B", "CH0C", "TC0P", "ui8 ", "#@!?", "abcd", "    "] {
            let key: SmcKey = raw.parse().unwrap();
            assert_eq!(key.to_string(), raw);
            assert_eq!(SmcKey::from_code(key.code()).to_string(), raw);
        }
    }

    #[test]
    fn test_from_str_rejects_bad_lengths() {
        for raw in ["", "ABC", "ABCDE"] {
            let err = raw.parse::<SmcKey>().unwrap_err();
            assert!(err.to_string().contains("must be exactly 4 characters"), "{}", err);
        }
    }

    #[test]
    fn test_from_str_rejects_non_ascii() {
        // "é" is two bytes, so this is four bytes but not ASCII
        let err = "ab\u{e9}".parse::<SmcKey>().unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_data_type_descriptors() {
        assert_eq!(DataType::FLAG.size, 1);
        assert_eq!(DataType::UINT8.size, 1);
        assert_eq!(DataType::UINT32.size, 4);
        assert_eq!(DataType::UINT8.tag.to_string(), "ui8 ");
        assert_eq!(DataType::UINT32.to_string(), "ui32 (4 bytes)");
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&DataType::UINT32).unwrap();
        assert_eq!(json, r#"{"tag":"ui32","size":4}"#);
    }
}
