//! Address spaces
//!
//! `model` is the runtime picture of the segmented generic window; `verifier`
//! checks and lowers the address space operations of function bodies.

mod model;
mod verifier;

pub use model::{ConversionError, GenericPtr, Segment, SegmentMap, SpecificPtr};
pub use verifier::{AddressSpaceVerifier, SpaceLookup, VerifiedFunction};
