//! Per-object class labels produced by a classifier.

use std::collections::BTreeMap;

/// Label used for objects a classifier declined to place in any bin.
pub const UNASSIGNED: i32 = -99;

/// Class ids for one chunk, in input row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassAssignment {
    pub class_id: Vec<i32>,
}

impl ClassAssignment {
    pub fn new(class_id: Vec<i32>) -> Self {
        Self { class_id }
    }

    pub fn len(&self) -> usize {
        self.class_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_id.is_empty()
    }

    /// Number of objects per class id.
    pub fn counts(&self) -> BTreeMap<i32, usize> {
        let mut counts = BTreeMap::new();
        for &id in &self.class_id {
            *counts.entry(id).or_insert(0) += 1;
        }
        counts
    }
}

impl From<Vec<i32>> for ClassAssignment {
    fn from(class_id: Vec<i32>) -> Self {
        Self::new(class_id)
    }
}
