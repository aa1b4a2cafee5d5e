//! Take dependency graph checks.

use lumiere_core::{Take, TakeId};
use lumiere_error::{ValidationError, ValidationErrorKind};
use std::collections::{HashMap, HashSet};

fn invalid(message: String) -> ValidationError {
    ValidationError::new(ValidationErrorKind::InvalidTakeGraph(message))
}

/// Split a batch into independent chains.
///
/// Takes are ordered by index. Each chain starts at a take without a
/// dependency and follows dependents in order. Every take lands in exactly
/// one chain.
///
/// # Errors
///
/// Rejects duplicate ids or indices, dependencies on takes that are not
/// earlier in the batch, and takes with more than one dependent.
pub fn split_chains(mut takes: Vec<Take>) -> Result<Vec<Vec<Take>>, ValidationError> {
    takes.sort_by_key(|take| *take.index());

    let mut seen_ids = HashSet::new();
    let mut seen_indices = HashSet::new();
    let mut dependent_of: HashMap<TakeId, TakeId> = HashMap::new();

    for take in &takes {
        if !seen_indices.insert(*take.index()) {
            return Err(invalid(format!("duplicate take index {}", take.index())));
        }
        if let Some(predecessor) = take.depends_on() {
            if !seen_ids.contains(predecessor) {
                return Err(invalid(format!(
                    "take {} depends on {} which is not an earlier take",
                    take.index(),
                    predecessor
                )));
            }
            if dependent_of.insert(*predecessor, *take.id()).is_some() {
                return Err(invalid(format!(
                    "take {} has more than one dependent",
                    predecessor
                )));
            }
        }
        if !seen_ids.insert(*take.id()) {
            return Err(invalid(format!("duplicate take id {}", take.id())));
        }
    }

    let mut by_id: HashMap<TakeId, Take> =
        takes.iter().map(|take| (*take.id(), take.clone())).collect();
    let mut chains = Vec::new();
    for root in takes.iter().filter(|take| take.depends_on().is_none()) {
        let mut chain = Vec::new();
        let mut cursor = Some(*root.id());
        while let Some(id) = cursor {
            if let Some(take) = by_id.remove(&id) {
                chain.push(take);
            }
            cursor = dependent_of.get(&id).copied();
        }
        chains.push(chain);
    }
    Ok(chains)
}

/// Ids of takes that another take depends on.
pub fn with_dependents(chains: &[Vec<Take>]) -> HashSet<TakeId> {
    chains
        .iter()
        .flatten()
        .filter_map(|take| *take.depends_on())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumiere_core::DurationRange;

    fn take(index: usize) -> Take {
        Take::new(index, format!("take {}", index), DurationRange::new(1.0, 5.0))
    }

    #[test]
    fn test_independent_takes_are_separate_chains() {
        let chains = split_chains(vec![take(0), take(1), take(2)]).expect("Valid graph");
        assert_eq!(chains.len(), 3);
        assert!(chains.iter().all(|chain| chain.len() == 1));
    }

    #[test]
    fn test_linear_chain() {
        let a = take(0);
        let b = take(1).with_dependency(*a.id());
        let c = take(2).with_dependency(*b.id());
        let chains = split_chains(vec![c, a, b]).expect("Valid graph");
        assert_eq!(chains.len(), 1);
        let indices: Vec<usize> = chains[0].iter().map(|t| *t.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(with_dependents(&chains).len(), 2);
    }

    #[test]
    fn test_forward_dependency_rejected() {
        let b = take(1);
        let a = take(0).with_dependency(*b.id());
        assert!(split_chains(vec![a, b]).is_err());
    }

    #[test]
    fn test_branching_rejected() {
        let a = take(0);
        let b = take(1).with_dependency(*a.id());
        let c = take(2).with_dependency(*a.id());
        let err = split_chains(vec![a, b, c]).unwrap_err();
        assert!(err.to_string().contains("more than one dependent"));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        assert!(split_chains(vec![take(0), take(0)]).is_err());
    }
}
