// tests/property/address_test.rs

//! Property-based tests for program-derived addresses

use marketsync::Context;
use marketsync::core::addresses::{
    Address, perp_market_account, spot_market_account, user_account,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_distinct_indices_give_distinct_addresses(a in any::<u16>(), b in any::<u16>()) {
        prop_assume!(a != b);
        for context in [Context::MainNet, Context::DevNet] {
            prop_assert_ne!(perp_market_account(context, a), perp_market_account(context, b));
            prop_assert_ne!(spot_market_account(context, a), spot_market_account(context, b));
        }
    }

    #[test]
    fn test_perp_and_spot_never_collide(index in any::<u16>()) {
        prop_assert_ne!(
            perp_market_account(Context::MainNet, index),
            spot_market_account(Context::MainNet, index)
        );
    }

    #[test]
    fn test_user_accounts_are_stable(bytes in any::<[u8; 32]>(), sub_account in any::<u16>()) {
        let authority = Address::new(bytes);
        let first = user_account(Context::MainNet, &authority, sub_account);
        prop_assert_eq!(first, user_account(Context::MainNet, &authority, sub_account));
        prop_assert_eq!(first.to_string().parse::<Address>().unwrap(), first);
    }
}
