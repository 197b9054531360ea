//! Tiered maker/taker fee schedule.
//!
//! Fees are flat rates per tier (e.g. `0.001` = 0.1%). A trade's fee amount
//! is `price x quantity x rate`, rounded half-even to [`FEE_SCALE`] decimal
//! places. Unknown tiers fall back to the `default` tier.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decimal places fee amounts are rounded to.
pub const FEE_SCALE: u32 = 8;

/// Maker and taker rates for one client tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    /// Rate charged when the order provided liquidity.
    #[serde(with = "rust_decimal::serde::str")]
    pub maker_rate: Decimal,
    /// Rate charged when the order consumed liquidity.
    #[serde(with = "rust_decimal::serde::str")]
    pub taker_rate: Decimal,
}

impl FeeTier {
    /// A tier that charges nothing.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            maker_rate: Decimal::ZERO,
            taker_rate: Decimal::ZERO,
        }
    }

    /// The stock tier table: `default` at 10/20 bps and `vip` at 5/15 bps.
    #[must_use]
    pub fn standard_tiers() -> HashMap<String, FeeTier> {
        let mut tiers = HashMap::new();
        tiers.insert(
            "default".to_string(),
            FeeTier {
                maker_rate: Decimal::new(1, 3),  // 0.001
                taker_rate: Decimal::new(2, 3),  // 0.002
            },
        );
        tiers.insert(
            "vip".to_string(),
            FeeTier {
                maker_rate: Decimal::new(5, 4),  // 0.0005
                taker_rate: Decimal::new(15, 4), // 0.0015
            },
        );
        tiers
    }
}

/// The rate and amount billed for one side of one fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeBreakdown {
    /// The rate that was applied.
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    /// The fee amount, rounded half-even to [`FEE_SCALE`] places.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Currency the fee is denominated in.
    pub currency: String,
}

/// Tier table plus fee currency; the fee calculator of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    tiers: HashMap<String, FeeTier>,
    currency: String,
}

impl FeeSchedule {
    /// Create a schedule from an explicit tier table.
    #[must_use]
    pub fn new(tiers: HashMap<String, FeeTier>, currency: impl Into<String>) -> Self {
        Self {
            tiers,
            currency: currency.into(),
        }
    }

    /// The stock schedule: [`FeeTier::standard_tiers`] denominated in USDT.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(FeeTier::standard_tiers(), "USDT")
    }

    /// Resolve a tier by name, falling back to `default`, then to zero.
    #[must_use]
    pub fn tier(&self, name: Option<&str>) -> FeeTier {
        name.and_then(|n| self.tiers.get(n).copied())
            .or_else(|| self.tiers.get("default").copied())
            .unwrap_or_else(FeeTier::zero)
    }

    /// Compute the fee for one side of a fill.
    ///
    /// `amount = price x quantity x rate`, rounded half-even to
    /// [`FEE_SCALE`] decimal places.
    #[must_use]
    pub fn calculate(
        &self,
        price: Decimal,
        quantity: Decimal,
        is_maker: bool,
        tier_name: Option<&str>,
    ) -> FeeBreakdown {
        let tier = self.tier(tier_name);
        let rate = if is_maker {
            tier.maker_rate
        } else {
            tier.taker_rate
        };
        let amount = (price * quantity * rate)
            .round_dp_with_strategy(FEE_SCALE, RoundingStrategy::MidpointNearestEven);
        FeeBreakdown {
            rate,
            amount,
            currency: self.currency.clone(),
        }
    }

    /// The currency fees are denominated in.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_tier_rates() {
        let schedule = FeeSchedule::standard();
        let tier = schedule.tier(Some("default"));
        assert_eq!(tier.maker_rate, dec!(0.001));
        assert_eq!(tier.taker_rate, dec!(0.002));
    }

    #[test]
    fn test_unknown_tier_falls_back_to_default() {
        let schedule = FeeSchedule::standard();
        assert_eq!(schedule.tier(Some("whale")), schedule.tier(Some("default")));
        assert_eq!(schedule.tier(None), schedule.tier(Some("default")));
    }

    #[test]
    fn test_maker_fee_amount() {
        let schedule = FeeSchedule::standard();
        // 50000 * 1.0 * 0.001 = 50
        let fee = schedule.calculate(dec!(50000), dec!(1.0), true, None);
        assert_eq!(fee.amount, dec!(50.0000));
        assert_eq!(fee.rate, dec!(0.001));
        assert_eq!(fee.currency, "USDT");
    }

    #[test]
    fn test_taker_fee_amount() {
        let schedule = FeeSchedule::standard();
        // 50000 * 1.0 * 0.002 = 100
        let fee = schedule.calculate(dec!(50000), dec!(1.0), false, None);
        assert_eq!(fee.amount, dec!(100.0000));
    }

    #[test]
    fn test_vip_tier_rates_apply() {
        let schedule = FeeSchedule::standard();
        let fee = schedule.calculate(dec!(10000), dec!(2), true, Some("vip"));
        // 10000 * 2 * 0.0005 = 10
        assert_eq!(fee.amount, dec!(10.0000));
    }

    #[test]
    fn test_fee_rounds_half_even() {
        let mut tiers = HashMap::new();
        tiers.insert(
            "default".to_string(),
            FeeTier {
                maker_rate: dec!(0.000000005),
                taker_rate: dec!(0.000000015),
            },
        );
        let schedule = FeeSchedule::new(tiers, "USDT");
        // 1 * 1 * 0.000000005 -> 0.00000000(5) rounds to even: 0
        let maker = schedule.calculate(dec!(1), dec!(1), true, None);
        assert_eq!(maker.amount, dec!(0.00000000));
        // 1 * 1 * 0.000000015 -> 0.00000001(5) rounds to even: 2e-8
        let taker = schedule.calculate(dec!(1), dec!(1), false, None);
        assert_eq!(taker.amount, dec!(0.00000002));
    }

    #[test]
    fn test_empty_schedule_charges_nothing() {
        let schedule = FeeSchedule::new(HashMap::new(), "USDT");
        let fee = schedule.calculate(dec!(50000), dec!(1), false, Some("vip"));
        assert_eq!(fee.amount, Decimal::ZERO);
    }
}
