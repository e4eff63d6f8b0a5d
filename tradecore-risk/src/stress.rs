use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;
use tradecore_instrument::Symbol;

/// A free-form asset-class tag (`"equity"`, `"tech"`, `"crypto"`, ...) — a
/// symbol may carry several, mirroring the source's `asset_class_mappings`
/// rather than forcing a single rigid category per instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetClass(pub SmolStr);

impl From<&str> for AssetClass {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

/// A named scenario mapping asset-class tags to shock factors (§4.G).
/// Applying one is non-mutating: it returns deltas, it never touches
/// tracked state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    pub description: String,
    pub shocks: HashMap<AssetClass, Decimal>,
}

/// Per-position and portfolio-level deltas from applying a [`StressScenario`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResult {
    pub per_position: HashMap<Symbol, Decimal>,
    pub portfolio_delta: Decimal,
}

/// A position's market value and the asset-class tags it's exposed to.
#[derive(Debug, Clone)]
pub struct TaggedPosition {
    pub symbol: Symbol,
    pub asset_classes: Vec<AssetClass>,
    pub market_value: Decimal,
}

/// Apply `scenario` to `positions`. A position tagged with more than one
/// shocked asset class takes the average of the matching shocks; untagged
/// positions are unaffected. No tracked state is mutated.
pub fn apply_scenario(scenario: &StressScenario, positions: &[TaggedPosition]) -> StressResult {
    let mut per_position = HashMap::new();
    let mut portfolio_delta = Decimal::ZERO;

    for position in positions {
        let matching: Vec<Decimal> = position
            .asset_classes
            .iter()
            .filter_map(|tag| scenario.shocks.get(tag).copied())
            .collect();
        if matching.is_empty() {
            continue;
        }
        let avg_shock = matching.iter().sum::<Decimal>() / Decimal::from(matching.len() as u64);
        let delta = position.market_value * avg_shock;
        portfolio_delta += delta;
        per_position.insert(position.symbol.clone(), delta);
    }

    StressResult { per_position, portfolio_delta }
}

/// The five named scenarios carried over from
/// `original_source/backend/risk_service/stress_testing.py`'s
/// `predefined_scenarios`.
pub fn predefined_scenarios() -> Vec<StressScenario> {
    let shocks = |pairs: &[(&str, Decimal)]| -> HashMap<AssetClass, Decimal> {
        pairs.iter().map(|(tag, shock)| (AssetClass::from(*tag), *shock)).collect()
    };

    vec![
        StressScenario {
            name: "market_crash".into(),
            description: "Simulates a severe market crash similar to 2008".into(),
            shocks: shocks(&[
                ("equity", dec!(-0.40)),
                ("bond", dec!(0.05)),
                ("commodity", dec!(-0.30)),
                ("crypto", dec!(-0.70)),
            ]),
        },
        StressScenario {
            name: "tech_bubble".into(),
            description: "Simulates a tech sector crash similar to 2000".into(),
            shocks: shocks(&[
                ("equity", dec!(-0.25)),
                ("tech", dec!(-0.60)),
                ("bond", dec!(0.10)),
                ("commodity", dec!(0.05)),
            ]),
        },
        StressScenario {
            name: "inflation_surge".into(),
            description: "Simulates a period of high inflation".into(),
            shocks: shocks(&[
                ("equity", dec!(-0.15)),
                ("bond", dec!(-0.20)),
                ("commodity", dec!(0.30)),
                ("gold", dec!(0.25)),
                ("real_estate", dec!(0.10)),
            ]),
        },
        StressScenario {
            name: "interest_rate_hike".into(),
            description: "Simulates a sudden increase in interest rates".into(),
            shocks: shocks(&[
                ("equity", dec!(-0.10)),
                ("bond", dec!(-0.15)),
                ("bank", dec!(0.05)),
                ("real_estate", dec!(-0.20)),
            ]),
        },
        StressScenario {
            name: "pandemic".into(),
            description: "Simulates a global pandemic scenario".into(),
            shocks: shocks(&[
                ("equity", dec!(-0.30)),
                ("travel", dec!(-0.60)),
                ("healthcare", dec!(0.20)),
                ("tech", dec!(0.15)),
                ("retail", dec!(-0.25)),
            ]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applying_market_crash_shocks_equity_and_crypto_positions() {
        let scenario = predefined_scenarios().into_iter().find(|s| s.name == "market_crash").unwrap();
        let positions = vec![
            TaggedPosition {
                symbol: Symbol::from("AAPL"),
                asset_classes: vec![AssetClass::from("equity"), AssetClass::from("tech")],
                market_value: dec!(10000),
            },
            TaggedPosition {
                symbol: Symbol::from("BTC-USD"),
                asset_classes: vec![AssetClass::from("crypto")],
                market_value: dec!(5000),
            },
        ];
        let result = apply_scenario(&scenario, &positions);
        assert_eq!(result.per_position[&Symbol::from("AAPL")], dec!(-4000));
        assert_eq!(result.per_position[&Symbol::from("BTC-USD")], dec!(-3500));
        assert_eq!(result.portfolio_delta, dec!(-7500));
    }

    #[test]
    fn untagged_position_is_unaffected() {
        let scenario = predefined_scenarios().into_iter().find(|s| s.name == "pandemic").unwrap();
        let positions = vec![TaggedPosition {
            symbol: Symbol::from("AGG"),
            asset_classes: vec![AssetClass::from("bond")],
            market_value: dec!(1000),
        }];
        let result = apply_scenario(&scenario, &positions);
        assert!(result.per_position.is_empty());
        assert_eq!(result.portfolio_delta, Decimal::ZERO);
    }
}
