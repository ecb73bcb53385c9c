//! Cross-product expansion of value axes into concrete elements.

use crate::core::workflow::error::WorkflowError;
use indexmap::IndexMap;
use tracing::debug;

/// Nesting order used for inputs that carry no explicit nesting order.
pub const UNNESTED: f64 = -1.0;

/// Value-index assignment of one element: path -> index into that path's values.
pub type ElementIndices = IndexMap<String, usize>;

/// One value axis: how many values `path` offers and where it nests.
#[derive(Debug, Clone, PartialEq)]
pub struct Multiplicity {
    pub path: String,
    pub multiplicity: usize,
    pub nesting_order: f64,
}

impl Multiplicity {
    pub fn new(path: impl Into<String>, multiplicity: usize, nesting_order: f64) -> Self {
        Multiplicity {
            path: path.into(),
            multiplicity,
            nesting_order,
        }
    }
}

/// Expand `multiplicities` into one index assignment per element.
///
/// Axes sharing a nesting order advance together and must agree on their
/// multiplicity. The lowest nesting order varies fastest. Single-valued axes
/// never expand; every element takes index 0 for them.
pub fn resolve(multiplicities: &[Multiplicity]) -> Result<Vec<ElementIndices>, WorkflowError> {
    let mut seed = ElementIndices::new();
    let mut axes: Vec<&Multiplicity> = Vec::new();
    for entry in multiplicities {
        if entry.multiplicity == 1 {
            seed.insert(entry.path.clone(), 0);
        } else {
            axes.push(entry);
        }
    }
    axes.sort_by(|a, b| a.nesting_order.total_cmp(&b.nesting_order));

    let mut elements = vec![seed];
    for group in axes.chunk_by(|a, b| a.nesting_order == b.nesting_order) {
        let multiplicity = group[0].multiplicity;
        if group.iter().any(|entry| entry.multiplicity != multiplicity) {
            return Err(WorkflowError::InconsistentNesting {
                nesting_order: group[0].nesting_order,
                paths: group.iter().map(|entry| entry.path.clone()).collect(),
                multiplicities: group.iter().map(|entry| entry.multiplicity).collect(),
            });
        }
        let mut expanded = Vec::with_capacity(elements.len() * multiplicity);
        for value_index in 0..multiplicity {
            for element in &elements {
                let mut element = element.clone();
                for entry in group {
                    element.insert(entry.path.clone(), value_index);
                }
                expanded.push(element);
            }
        }
        elements = expanded;
    }

    debug!(
        axes = multiplicities.len(),
        elements = elements.len(),
        "resolved element value indices"
    );
    Ok(elements)
}
