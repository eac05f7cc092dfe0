//! Token Iteration Generator
//!
//! Expands a map of token → candidate values into a bounded, ordered sequence
//! of concrete token assignments. Ordering is deterministic: token sets and
//! iterations are [`IndexMap`]s, so insertion order is enumeration order.

use indexmap::IndexMap;
use tracing::warn;

use crate::protocol::Strategy;

/// Token name → ordered candidate values. Insertion order is significant.
pub type TokenSet = IndexMap<String, Vec<String>>;

/// One concrete assignment of values to tokens.
pub type Iteration = IndexMap<String, String>;

/// Generate the iteration sequence for a run.
///
/// An empty token set yields a single empty iteration. Generation halts the
/// instant the running count reaches `max_iterations`, returning a truncated
/// result; the truncation itself is logged as a saturation warning, not an
/// error.
pub fn generate(tokens: &TokenSet, max_iterations: usize, strategy: Strategy) -> Vec<Iteration> {
    match strategy {
        Strategy::AllCombinations => generate_all_combinations(tokens, max_iterations),
        Strategy::OneByOne => generate_one_by_one(tokens, max_iterations),
    }
}

fn generate_all_combinations(tokens: &TokenSet, max_iterations: usize) -> Vec<Iteration> {
    if tokens.is_empty() {
        return vec![Iteration::new()];
    }
    let mut iterations = vec![Iteration::new()];
    for (name, values) in tokens {
        let mut expanded: Vec<Iteration> = Vec::new();
        for existing in &iterations {
            for value in values {
                let mut combination = existing.clone();
                combination.insert(name.clone(), value.clone());
                expanded.push(combination);
                if expanded.len() >= max_iterations {
                    warn!(
                        max_iterations,
                        "maximum number of iterations reached, halting combination generation"
                    );
                    return expanded;
                }
            }
        }
        iterations = expanded;
    }
    iterations
}

fn generate_one_by_one(tokens: &TokenSet, max_iterations: usize) -> Vec<Iteration> {
    if tokens.is_empty() {
        return vec![Iteration::new()];
    }
    let mut defaults = Iteration::new();
    for (name, values) in tokens {
        let default = values.first().cloned().unwrap_or_default();
        defaults.insert(name.clone(), default);
    }
    let mut iterations = vec![defaults.clone()];
    for (name, values) in tokens {
        let default = &defaults[name];
        for value in values {
            if value == default {
                continue;
            }
            if iterations.len() >= max_iterations {
                warn!(
                    max_iterations,
                    "maximum number of iterations reached via ONE_BY_ONE"
                );
                return iterations;
            }
            let mut combination = defaults.clone();
            combination.insert(name.clone(), value.clone());
            iterations.push(combination);
        }
    }
    iterations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Strategy;
    use proptest::prelude::*;

    fn token_set(entries: &[(&str, &[&str])]) -> TokenSet {
        entries
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_tokens_yield_single_empty_iteration() {
        let result = generate(&TokenSet::new(), 100, Strategy::AllCombinations);
        assert_eq!(result.len(), 1);
        assert!(result[0].is_empty());

        let result = generate(&TokenSet::new(), 100, Strategy::OneByOne);
        assert_eq!(result.len(), 1);
        assert!(result[0].is_empty());
    }

    #[test]
    fn test_all_combinations_cross_product() {
        let tokens = token_set(&[("a", &["1", "2"]), ("b", &["x", "y", "z"])]);
        let result = generate(&tokens, 100, Strategy::AllCombinations);
        assert_eq!(result.len(), 6);
        // Token order outer, value order inner.
        assert_eq!(result[0]["a"], "1");
        assert_eq!(result[0]["b"], "x");
        assert_eq!(result[5]["a"], "2");
        assert_eq!(result[5]["b"], "z");
    }

    #[test]
    fn test_all_combinations_truncates_at_cap() {
        let tokens = token_set(&[("a", &["1", "2", "3"]), ("b", &["x", "y", "z"])]);
        let result = generate(&tokens, 4, Strategy::AllCombinations);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_one_by_one_defaults_first() {
        let tokens = token_set(&[("a", &["1", "2"]), ("b", &["x", "y", "z"])]);
        let result = generate(&tokens, 100, Strategy::OneByOne);
        // 1 + (2-1) + (3-1) = 4
        assert_eq!(result.len(), 4);
        assert_eq!(result[0]["a"], "1");
        assert_eq!(result[0]["b"], "x");
        // Varying a, b held at default.
        assert_eq!(result[1]["a"], "2");
        assert_eq!(result[1]["b"], "x");
        // Varying b, a held at default.
        assert_eq!(result[2]["a"], "1");
        assert_eq!(result[2]["b"], "y");
        assert_eq!(result[3]["b"], "z");
    }

    #[test]
    fn test_one_by_one_empty_value_list_defaults_to_empty_string() {
        let tokens = token_set(&[("a", &[]), ("b", &["x", "y"])]);
        let result = generate(&tokens, 100, Strategy::OneByOne);
        assert_eq!(result[0]["a"], "");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_one_by_one_skips_values_equal_to_default() {
        let tokens = token_set(&[("a", &["1", "1", "2"])]);
        let result = generate(&tokens, 100, Strategy::OneByOne);
        // Duplicate of the default is not re-emitted.
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_one_by_one_truncates_at_cap() {
        let tokens = token_set(&[("a", &["1", "2", "3", "4", "5"])]);
        let result = generate(&tokens, 3, Strategy::OneByOne);
        assert_eq!(result.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_all_combinations_count_law(
            cardinalities in prop::collection::vec(1usize..4, 1..4),
            cap in 1usize..200,
        ) {
            let tokens: TokenSet = cardinalities
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let values: Vec<String> = (0..*c).map(|v| format!("v{v}")).collect();
                    (format!("t{i}"), values)
                })
                .collect();
            let product: usize = cardinalities.iter().product();
            let result = generate(&tokens, cap, Strategy::AllCombinations);
            prop_assert_eq!(result.len(), product.min(cap));
        }

        #[test]
        fn prop_one_by_one_count_law(
            cardinalities in prop::collection::vec(1usize..5, 1..4),
        ) {
            let tokens: TokenSet = cardinalities
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let values: Vec<String> = (0..*c).map(|v| format!("v{v}")).collect();
                    (format!("t{i}"), values)
                })
                .collect();
            let expected: usize = 1 + cardinalities.iter().map(|c| c - 1).sum::<usize>();
            let result = generate(&tokens, 10_000, Strategy::OneByOne);
            prop_assert_eq!(result.len(), expected);
        }
    }
}
