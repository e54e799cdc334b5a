//! Label keys and the typed descriptor they encode.
//!
//! Every key the splitter writes and the combiner reads is defined here.

use std::collections::BTreeMap;

use crate::{Fingerprint, ObjectKey, StoredObject};

pub const ID_LABEL: &str = "megaconfigmap.io/id";
pub const ORDER_LABEL: &str = "megaconfigmap.io/order";
pub const FILE_NAME_LABEL: &str = "megaconfigmap.io/filename";
pub const MASTER_LABEL: &str = "megaconfigmap.io/master";
pub const MASTER_MARKER: &str = "true";

/// Binary data key holding a partial's chunk.
pub const PARTIAL_ITEM_KEY: &str = "partial-item";

pub const MAX_LABEL_VALUE_LEN: usize = 63;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("{label} is not found in {object}")]
    MissingLabel { object: ObjectKey, label: &'static str },

    #[error("{label} of {object} has unexpected value {value:?}")]
    InvalidLabel {
        object: ObjectKey,
        label: &'static str,
        value: String,
    },

    #[error("megaconfigmap.io/order of {object} is not a chunk index: {value:?}")]
    InvalidOrder { object: ObjectKey, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Partial { order: usize },
}

/// Split metadata carried by an object's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub fingerprint: Fingerprint,
    pub file_name: String,
    pub role: Role,
}

impl Descriptor {
    pub fn master(fingerprint: Fingerprint, file_name: &str) -> Self {
        Self {
            fingerprint,
            file_name: file_name.to_string(),
            role: Role::Master,
        }
    }

    pub fn partial(fingerprint: Fingerprint, file_name: &str, order: usize) -> Self {
        Self {
            fingerprint,
            file_name: file_name.to_string(),
            role: Role::Partial { order },
        }
    }

    pub fn order(&self) -> Option<usize> {
        match self.role {
            Role::Master => None,
            Role::Partial { order } => Some(order),
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == Role::Master
    }

    pub fn to_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([
            (ID_LABEL.to_string(), self.fingerprint.to_string()),
            (FILE_NAME_LABEL.to_string(), self.file_name.clone()),
        ]);
        match self.role {
            Role::Master => {
                labels.insert(MASTER_LABEL.to_string(), MASTER_MARKER.to_string());
            }
            Role::Partial { order } => {
                labels.insert(ORDER_LABEL.to_string(), order.to_string());
            }
        }
        labels
    }

    pub fn from_object(object: &StoredObject) -> Result<Self, DescriptorError> {
        Self::from_labels(object.key(), object.labels())
    }

    pub fn from_labels(
        object: ObjectKey,
        labels: &BTreeMap<String, String>,
    ) -> Result<Self, DescriptorError> {
        let fingerprint = labels
            .get(ID_LABEL)
            .ok_or_else(|| DescriptorError::MissingLabel {
                object: object.clone(),
                label: ID_LABEL,
            })?;
        let file_name = labels
            .get(FILE_NAME_LABEL)
            .ok_or_else(|| DescriptorError::MissingLabel {
                object: object.clone(),
                label: FILE_NAME_LABEL,
            })?;

        let role = match labels.get(MASTER_LABEL) {
            Some(marker) if marker == MASTER_MARKER => Role::Master,
            Some(marker) => {
                return Err(DescriptorError::InvalidLabel {
                    object,
                    label: MASTER_LABEL,
                    value: marker.clone(),
                })
            }
            None => {
                let value = labels
                    .get(ORDER_LABEL)
                    .ok_or_else(|| DescriptorError::MissingLabel {
                        object: object.clone(),
                        label: ORDER_LABEL,
                    })?;
                Role::Partial {
                    order: parse_order(&object, value)?,
                }
            }
        };

        Ok(Self {
            fingerprint: Fingerprint::new(fingerprint.clone()),
            file_name: file_name.clone(),
            role,
        })
    }
}

// Only plain decimal digits; `usize::from_str` would also take a leading '+'.
fn parse_order(object: &ObjectKey, value: &str) -> Result<usize, DescriptorError> {
    let invalid = || DescriptorError::InvalidOrder {
        object: object.clone(),
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

/// Checks a label value against the control plane's rules: at most 63
/// characters, alphanumeric at both ends, `-`, `_` or `.` allowed inside.
pub fn is_valid_label_value(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    if value.len() > MAX_LABEL_VALUE_LEN {
        return false;
    }
    let bytes = value.as_bytes();
    let alnum = |b: &u8| b.is_ascii_alphanumeric();
    alnum(&bytes[0])
        && alnum(&bytes[bytes.len() - 1])
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ObjectKey {
        ObjectKey::new("default", "my-conf-0")
    }

    #[test]
    fn test_master_labels() {
        let descriptor = Descriptor::master("abc".into(), "data.bin");
        let labels = descriptor.to_labels();
        assert_eq!(labels.get(ID_LABEL).unwrap(), "abc");
        assert_eq!(labels.get(FILE_NAME_LABEL).unwrap(), "data.bin");
        assert_eq!(labels.get(MASTER_LABEL).unwrap(), "true");
        assert!(!labels.contains_key(ORDER_LABEL));

        let decoded = Descriptor::from_labels(key(), &labels).unwrap();
        assert!(decoded.is_master());
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_partial_labels() {
        let descriptor = Descriptor::partial("abc".into(), "data.bin", 12);
        let labels = descriptor.to_labels();
        assert_eq!(labels.get(ORDER_LABEL).unwrap(), "12");
        assert!(!labels.contains_key(MASTER_LABEL));

        let decoded = Descriptor::from_labels(key(), &labels).unwrap();
        assert_eq!(decoded.order(), Some(12));
    }

    #[test]
    fn test_missing_labels() {
        let mut labels = Descriptor::partial("abc".into(), "data.bin", 0).to_labels();
        labels.remove(ORDER_LABEL);
        let err = Descriptor::from_labels(key(), &labels).unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::MissingLabel {
                label: ORDER_LABEL,
                ..
            }
        ));
        assert!(err.to_string().contains("default/my-conf-0"));

        let mut labels = Descriptor::master("abc".into(), "data.bin").to_labels();
        labels.remove(ID_LABEL);
        assert!(matches!(
            Descriptor::from_labels(key(), &labels),
            Err(DescriptorError::MissingLabel { label: ID_LABEL, .. })
        ));

        let mut labels = Descriptor::master("abc".into(), "data.bin").to_labels();
        labels.remove(FILE_NAME_LABEL);
        assert!(matches!(
            Descriptor::from_labels(key(), &labels),
            Err(DescriptorError::MissingLabel {
                label: FILE_NAME_LABEL,
                ..
            })
        ));
    }

    #[test]
    fn test_non_numeric_order_is_rejected() {
        for value in ["two", "", "-1", "+1", "1.0", " 1", "99999999999999999999999"] {
            let mut labels = Descriptor::partial("abc".into(), "data.bin", 0).to_labels();
            labels.insert(ORDER_LABEL.to_string(), value.to_string());
            assert!(
                matches!(
                    Descriptor::from_labels(key(), &labels),
                    Err(DescriptorError::InvalidOrder { .. })
                ),
                "order {value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unexpected_master_marker() {
        let mut labels = Descriptor::master("abc".into(), "data.bin").to_labels();
        labels.insert(MASTER_LABEL.to_string(), "yes".to_string());
        assert!(matches!(
            Descriptor::from_labels(key(), &labels),
            Err(DescriptorError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn test_label_values() {
        assert!(is_valid_label_value(""));
        assert!(is_valid_label_value("data.dummy"));
        assert!(is_valid_label_value("a-b_c.d"));
        assert!(is_valid_label_value(&"f".repeat(56)));
        assert!(!is_valid_label_value(&"f".repeat(64)));
        assert!(!is_valid_label_value(".hidden"));
        assert!(!is_valid_label_value("trailing-"));
        assert!(!is_valid_label_value("with space"));
        assert!(!is_valid_label_value("dir/file"));
    }
}
