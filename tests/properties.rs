//! Property-based tests for the tokenizer and the filter catalogue.

use std::collections::HashSet;

use proptest::prelude::*;
use sanipro::{
    Delimiter, Filter, ReorderMethod, Reorderer, SetOperation, SortFilter, Token, TokenFormatter,
    Tokenizer, UniqueFilter,
};

/// Tag names without any character that is special to the A1111 syntax.
fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z]", "[a-z][a-z0-9 _]{0,8}[a-z0-9]"]
}

/// Weights with at most two decimals; hundredths keep the textual form exact.
fn weight_strategy() -> impl Strategy<Value = f64> {
    (-300i32..300).prop_map(|hundredths| f64::from(hundredths) / 100.0)
}

fn token_strategy() -> impl Strategy<Value = Token> {
    (name_strategy(), weight_strategy()).prop_map(|(name, weight)| Token::new(name, weight))
}

fn prompt_strategy() -> impl Strategy<Value = Vec<Token>> {
    prop::collection::vec(token_strategy(), 0..12)
}

/// Tokens drawn from a small vocabulary so duplicates are common.
fn repetitive_prompt_strategy() -> impl Strategy<Value = Vec<Token>> {
    prop::collection::vec(
        (prop::sample::select(vec!["cat", "dog", "hat", "bow"]), weight_strategy())
            .prop_map(|(name, weight)| Token::new(name, weight)),
        0..16,
    )
}

fn keyed(tokens: &[Token]) -> Vec<(String, u64)> {
    let mut keys: Vec<_> = tokens
        .iter()
        .map(|token| (token.name().to_owned(), token.weight().to_bits()))
        .collect();
    keys.sort();
    keys
}

proptest! {
    #[test]
    fn simple_prompts_round_trip(tokens in prop::collection::vec(token_strategy(), 1..10)) {
        let text = TokenFormatter::A1111.join(&tokens, ", ");
        let tokenizer = Tokenizer::a1111(&Delimiter::default()).unwrap();
        let parsed = tokenizer.tokenize(&text).unwrap();
        prop_assert_eq!(TokenFormatter::A1111.join(&parsed, ", "), text);
    }

    #[test]
    fn round_up_is_idempotent(
        weights in prop::collection::vec(-10.0f64..10.0, 0..12),
        digits in 0u32..6,
    ) {
        let tokens: Vec<Token> = weights.into_iter().map(|w| Token::new("t", w)).collect();
        let filter = Filter::round_up(digits).unwrap();
        let once = filter.execute(tokens);
        let twice = filter.execute(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn sort_is_stable_on_sorted_input(
        tokens in repetitive_prompt_strategy(),
        reverse in any::<bool>(),
    ) {
        let filter = Filter::Sort(SortFilter { reverse });
        let sorted = filter.execute(tokens);
        prop_assert_eq!(filter.execute(sorted.clone()), sorted);
    }

    #[test]
    fn unique_keeps_one_token_per_name(
        tokens in repetitive_prompt_strategy(),
        reverse in any::<bool>(),
    ) {
        let distinct: HashSet<&str> = tokens.iter().map(Token::name).collect();
        let expected = distinct.len();
        let unique = Filter::Unique(UniqueFilter { reverse }).execute(tokens.clone());
        prop_assert!(unique.len() <= tokens.len());
        prop_assert_eq!(unique.len(), expected);
    }

    #[test]
    fn union_is_symmetric(a in repetitive_prompt_strategy(), b in repetitive_prompt_strategy()) {
        let ab: HashSet<Token> = SetOperation::Union.apply(&a, &b).into_iter().collect();
        let ba: HashSet<Token> = SetOperation::Union.apply(&b, &a).into_iter().collect();
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn reversed_difference_swaps_operands(
        a in repetitive_prompt_strategy(),
        b in repetitive_prompt_strategy(),
    ) {
        let reversed = SetOperation::Difference { reverse: true }.apply(&a, &b);
        let swapped = SetOperation::Difference { reverse: false }.apply(&b, &a);
        prop_assert_eq!(reversed, swapped);
    }

    #[test]
    fn spanning_tree_reorderers_preserve_tokens(tokens in prompt_strategy()) {
        for method in [ReorderMethod::Kruskal, ReorderMethod::Prim] {
            let reordered = Reorderer::with_default_strategy(method).find_optimal_order(&tokens);
            prop_assert_eq!(keyed(&reordered), keyed(&tokens));
        }
    }
}
