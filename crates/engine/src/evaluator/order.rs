//! Dependency ordering of chained conditions within one AND/OR block.
//!
//! Entry B depends on entry A iff `B.from == A.as`. Evaluation must follow
//! dependency order regardless of declaration order; mutually independent
//! entries keep their declaration order so results are deterministic.

use std::collections::HashMap;

use crate::schema::Condition;

/// Structural chain errors within one condition block.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OrderError {
    #[error("duplicate chain name '{0}' in condition block")]
    DuplicateAs(String),

    #[error("chain reference '{0}' has no matching 'as' in its block")]
    UnknownRef(String),

    #[error("chain cycle between conditions: {0}")]
    Cycle(String),
}

/// Compute the evaluation order of a block's children as indices.
///
/// Stable: among entries not ordered by a chain edge, declaration order is
/// preserved.
pub(crate) fn dependency_order(children: &[Condition]) -> Result<Vec<usize>, OrderError> {
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (idx, child) in children.iter().enumerate() {
        if let Some(name) = child.as_name.as_deref().filter(|n| !n.is_empty()) {
            if by_name.insert(name, idx).is_some() {
                return Err(OrderError::DuplicateAs(name.to_string()));
            }
        }
    }

    // Each entry consumes at most one chain name.
    let mut depends_on: Vec<Option<usize>> = Vec::with_capacity(children.len());
    for child in children {
        match child.from.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => match by_name.get(name) {
                Some(&producer) => depends_on.push(Some(producer)),
                None => return Err(OrderError::UnknownRef(name.to_string())),
            },
            None => depends_on.push(None),
        }
    }

    let mut order = Vec::with_capacity(children.len());
    let mut emitted = vec![false; children.len()];
    while order.len() < children.len() {
        // Lowest-index ready entry first: stable among independents.
        let next = (0..children.len()).find(|&i| {
            !emitted[i] && depends_on[i].map(|dep| emitted[dep]).unwrap_or(true)
        });
        match next {
            Some(i) => {
                emitted[i] = true;
                order.push(i);
            }
            None => {
                let stuck: Vec<String> = (0..children.len())
                    .filter(|&i| !emitted[i])
                    .map(|i| {
                        children[i]
                            .as_name
                            .clone()
                            .unwrap_or_else(|| format!("#{i}"))
                    })
                    .collect();
                return Err(OrderError::Cycle(stuck.join(", ")));
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ConditionKind, ProviderCondition};

    fn entry(as_name: Option<&str>, from: Option<&str>) -> Condition {
        Condition {
            kind: ConditionKind::Provider(ProviderCondition {
                provider: "builtin".to_string(),
                capability: "file".to_string(),
                payload: serde_yaml::Value::Null,
            }),
            as_name: as_name.map(str::to_string),
            from: from.map(str::to_string),
            not: false,
            ignorable: false,
        }
    }

    #[test]
    fn independent_entries_keep_declaration_order() {
        let children = vec![entry(None, None), entry(None, None), entry(None, None)];
        assert_eq!(dependency_order(&children).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn consumer_declared_first_runs_after_producer() {
        let children = vec![entry(None, Some("x")), entry(Some("x"), None)];
        assert_eq!(dependency_order(&children).unwrap(), vec![1, 0]);
    }

    #[test]
    fn producer_declared_first_is_unchanged() {
        let children = vec![entry(Some("x"), None), entry(None, Some("x"))];
        assert_eq!(dependency_order(&children).unwrap(), vec![0, 1]);
    }

    #[test]
    fn chain_of_three_out_of_order() {
        // c <- b <- a, declared c, a, b.
        let children = vec![
            entry(None, Some("b")),
            entry(Some("a"), None),
            entry(Some("b"), Some("a")),
        ];
        assert_eq!(dependency_order(&children).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn duplicate_as_rejected() {
        let children = vec![entry(Some("x"), None), entry(Some("x"), None)];
        assert_eq!(
            dependency_order(&children).unwrap_err(),
            OrderError::DuplicateAs("x".to_string())
        );
    }

    #[test]
    fn unknown_from_rejected() {
        let children = vec![entry(None, Some("ghost"))];
        assert_eq!(
            dependency_order(&children).unwrap_err(),
            OrderError::UnknownRef("ghost".to_string())
        );
    }

    #[test]
    fn cycle_rejected() {
        let children = vec![entry(Some("a"), Some("b")), entry(Some("b"), Some("a"))];
        assert!(matches!(
            dependency_order(&children).unwrap_err(),
            OrderError::Cycle(_)
        ));
    }
}
