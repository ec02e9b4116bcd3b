//! # Result Normalizer Module
//!
//! Maps the raw field values returned by the extraction service onto the
//! stable outward contract: each of the four fields is either a trimmed
//! non-empty string or the canonical absent marker. Pure functions only,
//! no I/O.

use serde::{Serialize, Serializer};

use crate::extraction::RawFields;

/// Placeholder strings the extraction service uses for "no data".
///
/// Thai entries match exactly; ASCII entries match case-insensitively.
pub const NOT_FOUND_SENTINELS: &[&str] = &[
    "ไม่พบ",
    "ไม่พบข้อมูล",
    "ไม่มี",
    "ไม่มีข้อมูล",
    "ไม่ระบุ",
    "ไม่ทราบ",
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not found",
    "-",
    "--",
];

/// A normalized field value: a non-empty string or the absent marker.
///
/// `Absent` serializes as JSON `null`, keeping it distinct from an empty
/// string in the outward contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Present(String),
    Absent,
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Present(value) => Some(value),
            FieldValue::Absent => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FieldValue::Present(value) => serializer.serialize_str(value),
            FieldValue::Absent => serializer.serialize_none(),
        }
    }
}

/// The four canonical parcel fields after normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFields {
    pub recipient_name: FieldValue,
    pub room_number: FieldValue,
    pub shipping_company: FieldValue,
    pub tracking_number: FieldValue,
}

impl ExtractedFields {
    pub fn all_absent(&self) -> bool {
        self.recipient_name.is_absent()
            && self.room_number.is_absent()
            && self.shipping_company.is_absent()
            && self.tracking_number.is_absent()
    }
}

/// Normalize raw extraction output into the canonical field set.
///
/// Idempotent: feeding the output back through produces the same values.
pub fn normalize(raw: RawFields) -> ExtractedFields {
    ExtractedFields {
        recipient_name: normalize_field(raw.recipient_name.as_deref()),
        room_number: normalize_field(raw.room_number.as_deref()),
        shipping_company: normalize_field(raw.shipping_company.as_deref()),
        tracking_number: normalize_field(raw.tracking_number.as_deref()),
    }
}

/// Normalize one raw value: missing, empty-after-trim, and sentinel values
/// become `Absent`; anything else passes through trimmed.
pub fn normalize_field(value: Option<&str>) -> FieldValue {
    let Some(value) = value else {
        return FieldValue::Absent;
    };
    let trimmed = value.trim();
    if trimmed.is_empty() || is_not_found_sentinel(trimmed) {
        return FieldValue::Absent;
    }
    FieldValue::Present(trimmed.to_string())
}

fn is_not_found_sentinel(value: &str) -> bool {
    NOT_FOUND_SENTINELS
        .iter()
        .any(|sentinel| value.eq_ignore_ascii_case(sentinel))
}
