//! Unit conversion and price derivation tests
//!
//! Covers the packaging multipliers, base quantity conversion, display
//! quantities and per-tier price derivation.

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    base_to_display, base_units_per_unit, compute_base_quantity, derive_unit_prices,
    PackagingConfig, UnitError, UnitType,
};
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// One carton of 10 packs x 2 blisters x 10 tablets is 200 tablets
    #[test]
    fn test_carton_and_blister_conversion() {
        let config = PackagingConfig::new(10, 2, 10);

        assert_eq!(compute_base_quantity(UnitType::Carton, 1, &config), Ok(200));
        assert_eq!(compute_base_quantity(UnitType::Blister, 3, &config), Ok(30));
        assert_eq!(compute_base_quantity(UnitType::Tablet, 7, &config), Ok(7));
    }

    #[test]
    fn test_unit_strings_fall_back_to_caller_default() {
        assert_eq!(UnitType::parse_or(Some("strip"), UnitType::Pack), UnitType::Pack);
        assert_eq!(UnitType::parse_or(None, UnitType::Carton), UnitType::Carton);
        assert_eq!(UnitType::parse_or(Some(" TABLET "), UnitType::Pack), UnitType::Tablet);
    }

    #[test]
    fn test_display_quantity_is_in_packs() {
        let config = PackagingConfig::new(10, 2, 10);

        assert_eq!(base_to_display(30, &config), dec("1.5"));
        assert_eq!(base_to_display(200, &config), dec("10"));
        assert_eq!(base_to_display(0, &config), Decimal::ZERO);
    }

    #[test]
    fn test_prices_from_pack_price() {
        let config = PackagingConfig::new(10, 2, 10);
        let prices = derive_unit_prices(dec("40"), UnitType::Pack, &config).unwrap();

        assert_eq!(prices.wholesale_price, dec("400"));
        assert_eq!(prices.retail_price, dec("40"));
        assert_eq!(prices.blister_price, dec("20"));
        assert_eq!(prices.tablet_price, dec("2"));
    }

    #[test]
    fn test_zero_factor_is_rejected_for_pricing() {
        let config = PackagingConfig::new(10, 0, 10);

        assert_eq!(
            derive_unit_prices(dec("100"), UnitType::Carton, &config),
            Err(UnitError::ZeroPackagingFactor {
                field: "blisters_per_pack"
            })
        );
    }

    #[test]
    fn test_zero_factor_counts_as_one_for_conversion() {
        let config = PackagingConfig::new(0, 2, 0);

        assert_eq!(base_units_per_unit(UnitType::Carton, &config), 2);
        assert_eq!(base_units_per_unit(UnitType::Blister, &config), 1);
    }

    #[test]
    fn test_conversion_overflow_is_an_error() {
        let config = PackagingConfig::new(10, 2, 10);

        assert!(matches!(
            compute_base_quantity(UnitType::Carton, i64::MAX, &config),
            Err(UnitError::Overflow { .. })
        ));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn factor_strategy() -> impl Strategy<Value = i64> {
        1i64..=50
    }

    fn packaging_strategy() -> impl Strategy<Value = PackagingConfig> {
        (factor_strategy(), factor_strategy(), factor_strategy())
            .prop_map(|(p, b, t)| PackagingConfig::new(p, b, t))
    }

    fn unit_strategy() -> impl Strategy<Value = UnitType> {
        prop_oneof![
            Just(UnitType::Carton),
            Just(UnitType::Pack),
            Just(UnitType::Blister),
            Just(UnitType::Tablet),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Each tier is the next smaller tier times its packaging factor
        #[test]
        fn prop_tiers_chain_by_factor(config in packaging_strategy()) {
            let carton = base_units_per_unit(UnitType::Carton, &config);
            let pack = base_units_per_unit(UnitType::Pack, &config);
            let blister = base_units_per_unit(UnitType::Blister, &config);
            let tablet = base_units_per_unit(UnitType::Tablet, &config);

            prop_assert_eq!(tablet, 1);
            prop_assert_eq!(blister, config.tablets_per_blister * tablet);
            prop_assert_eq!(pack, config.blisters_per_pack * blister);
            prop_assert_eq!(carton, config.packs_per_carton * pack);
        }

        /// Conversion is additive in the entered quantity
        #[test]
        fn prop_conversion_is_linear(
            config in packaging_strategy(),
            unit in unit_strategy(),
            a in 0i64..1000,
            b in 0i64..1000
        ) {
            let whole = compute_base_quantity(unit, a + b, &config).unwrap();
            let parts = compute_base_quantity(unit, a, &config).unwrap()
                + compute_base_quantity(unit, b, &config).unwrap();
            prop_assert_eq!(whole, parts);
        }

        /// Non-positive factors convert exactly like a factor of 1
        #[test]
        fn prop_non_positive_factors_act_as_one(
            bad in -5i64..=0,
            config in packaging_strategy(),
            unit in unit_strategy()
        ) {
            let broken = PackagingConfig::new(bad, config.blisters_per_pack, config.tablets_per_blister);
            let fixed = PackagingConfig::new(1, config.blisters_per_pack, config.tablets_per_blister);
            prop_assert_eq!(
                base_units_per_unit(unit, &broken),
                base_units_per_unit(unit, &fixed)
            );
        }

        /// Retail price times packs per carton gives back the carton price,
        /// within four-decimal rounding
        #[test]
        fn prop_retail_price_scales_to_carton(
            config in packaging_strategy(),
            cents in 1i64..=10_000_000
        ) {
            let price = Decimal::new(cents, 2);
            let prices = derive_unit_prices(price, UnitType::Carton, &config).unwrap();
            let packs = Decimal::from(config.packs_per_carton);

            prop_assert_eq!(prices.wholesale_price, price);
            let error = (prices.retail_price * packs - prices.wholesale_price).abs();
            prop_assert!(error <= Decimal::new(5, 5) * packs);
        }
    }
}
