//! Generic record kind
//!
//! Arbitrary JSON entities with no kind-specific normalization, living in
//! the "records" namespace.

use super::RecordKind;

pub struct GenericKind;

impl RecordKind for GenericKind {
    const DATABASE: &'static str = "records";
}

pub type GenericRecord = super::Record<GenericKind>;
