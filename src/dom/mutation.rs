//! Mutation records delivered to adapters in batches

use super::document::ElementId;

/// A single change to the document.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRecord {
    /// Children of `target` were added and/or removed (text included)
    ChildList {
        target: ElementId,
        added: Vec<ElementId>,
        removed: Vec<ElementId>,
    },
    /// An attribute of `target` was set or removed
    Attributes {
        target: ElementId,
        name: String,
        old_value: Option<String>,
    },
    /// The externally supplied property bag of `target` was replaced
    Properties { target: ElementId },
}

impl MutationRecord {
    /// The element the change was recorded against.
    pub fn target(&self) -> ElementId {
        match self {
            Self::ChildList { target, .. }
            | Self::Attributes { target, .. }
            | Self::Properties { target } => *target,
        }
    }
}

/// An ordered batch of records, processed to completion as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    pub records: Vec<MutationRecord>,
}

impl MutationBatch {
    pub fn new(records: Vec<MutationRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutationRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_target_is_reported_for_every_variant() {
        let id = ElementId::from_raw(7);
        let records = vec![
            MutationRecord::ChildList {
                target: id,
                added: vec![],
                removed: vec![],
            },
            MutationRecord::Attributes {
                target: id,
                name: "class".to_string(),
                old_value: None,
            },
            MutationRecord::Properties { target: id },
        ];
        assert!(records.iter().all(|r| r.target() == id));
    }
}
