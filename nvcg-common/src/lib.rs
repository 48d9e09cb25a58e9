//! NVVM Codegen - Common Types and Utilities
//! 
//! This crate contains the types shared by every stage of the link core:
//! address-space tags, symbol kinds and visibility, dense ids, the session
//! error type and the diagnostic reporter.

pub mod error;
pub mod types;
pub mod source_loc;

pub use error::{CodegenError, Diagnostic, ErrorReporter, Severity};
pub use types::*;
pub use source_loc::{SourceLocation, SourceSpan};
