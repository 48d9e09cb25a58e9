//! Bitcode container
//!
//! Each compiled unit ships its body as an opaque blob: a four byte magic,
//! the IR version the producer targeted, then the serialized module. Only
//! the loader ever decodes a blob, and only once per module.
//!
//! ```text
//! +------+-------------+-------------+-----------------+
//! | NVCB | major (u16) | minor (u16) | module payload  |
//! +------+-------------+-------------+-----------------+
//! ```

use crate::ir::Module;
use log::trace;
use std::fmt;
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"NVCB";

const HEADER_LEN: usize = 8;

/// IR version recorded in a bitcode header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrVersion {
    pub major: u16,
    pub minor: u16,
}

impl IrVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for IrVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Version written by `encode_module`
pub const CURRENT_IR_VERSION: IrVersion = IrVersion::new(2, 0);

/// Oldest IR version the downstream optimizer accepts (CUDA 11.2)
pub const MIN_IR_VERSION: IrVersion = IrVersion::new(1, 6);

#[derive(Error, Debug)]
pub enum BitcodeError {
    #[error("not a bitcode blob (bad magic)")]
    BadMagic,

    #[error("truncated bitcode header ({len} bytes)")]
    Truncated { len: usize },

    #[error("IR version {found} is older than the minimum supported {}", MIN_IR_VERSION)]
    UnsupportedVersion { found: IrVersion },

    #[error("malformed module payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub fn encode_module(module: &Module) -> Result<Vec<u8>, BitcodeError> {
    encode_module_with_version(module, CURRENT_IR_VERSION)
}

pub fn encode_module_with_version(module: &Module, version: IrVersion) -> Result<Vec<u8>, BitcodeError> {
    let payload = serde_json::to_vec(module)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&version.major.to_le_bytes());
    bytes.extend_from_slice(&version.minor.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Read the header without touching the payload
pub fn peek_version(bytes: &[u8]) -> Result<IrVersion, BitcodeError> {
    if bytes.len() < HEADER_LEN {
        if !bytes.is_empty() && !MAGIC.starts_with(&bytes[..bytes.len().min(MAGIC.len())]) {
            return Err(BitcodeError::BadMagic);
        }
        return Err(BitcodeError::Truncated { len: bytes.len() });
    }
    if &bytes[..4] != MAGIC {
        return Err(BitcodeError::BadMagic);
    }
    let major = u16::from_le_bytes([bytes[4], bytes[5]]);
    let minor = u16::from_le_bytes([bytes[6], bytes[7]]);
    Ok(IrVersion::new(major, minor))
}

pub fn decode_module(bytes: &[u8]) -> Result<Module, BitcodeError> {
    let version = peek_version(bytes)?;
    if version < MIN_IR_VERSION {
        return Err(BitcodeError::UnsupportedVersion { found: version });
    }
    let module: Module = serde_json::from_slice(&bytes[HEADER_LEN..])?;
    trace!("decoded module '{}' (IR {version}, {} bytes)", module.name, bytes.len());
    Ok(module)
}
