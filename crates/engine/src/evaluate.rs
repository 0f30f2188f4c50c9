//! Satisfaction predicates for both alert categories.
//!
//! Pure over their inputs: the sweep driver fetches prices / the aggregate
//! snapshot and these functions decide satisfaction and format the post.
//! All comparisons are strict; equality never satisfies.

use crate::aggregate::{Aggregate, QuerySpec};
use crate::error::EngineError;
use pricebell_core::{Alert, AlertKind, Comparison, IndicatorCatalog, Pair};
use tracing::warn;

/// Decimal places shown for technical output values.
const OUTPUT_VALUE_PRECISION: usize = 3;

/// A satisfied alert: the observed value and the formatted post line.
#[derive(Debug, Clone, PartialEq)]
pub struct Satisfaction {
    pub value: f64,
    pub post: String,
}

/// Evaluate a simple price alert against the latest spot price.
/// `window_change` is the rolling-window percent change, fetched by the
/// caller only for 24HRCHG alerts.
pub fn evaluate_simple(
    pair: &Pair,
    alert: &Alert,
    price: f64,
    window_change: Option<f64>,
) -> Result<Option<Satisfaction>, EngineError> {
    let entry = match &alert.kind {
        AlertKind::Simple { entry } => *entry,
        AlertKind::Technical { .. } => return Ok(None),
    };
    let target = alert.target;

    let satisfaction = match alert.comparison {
        Comparison::PctChg => {
            let entry = entry.ok_or(EngineError::MissingEntry {
                comparison: alert.comparison,
            })?;
            if price > entry * (1.0 + target) {
                let pct = (price - entry) / entry * 100.0;
                Some(Satisfaction {
                    value: pct,
                    post: format!("{pair} UP {pct:.1}% FROM {entry} AT {price}"),
                })
            } else if price < entry * (1.0 - target) {
                let pct = (entry - price) / entry * 100.0;
                Some(Satisfaction {
                    value: pct,
                    post: format!("{pair} DOWN {pct:.1}% FROM {entry} AT {price}"),
                })
            } else {
                None
            }
        }
        Comparison::Change24h => {
            let change = window_change.ok_or(EngineError::MissingEntry {
                comparison: alert.comparison,
            })?;
            if change.abs() >= target {
                Some(Satisfaction {
                    value: change,
                    post: format!("{pair} 24HR CHANGE {change:.1}% AT {price}"),
                })
            } else {
                None
            }
        }
        Comparison::Above => (price > target).then(|| Satisfaction {
            value: price,
            post: format!("{pair} ABOVE {target} TARGET AT {price}"),
        }),
        Comparison::Below => (price < target).then(|| Satisfaction {
            value: price,
            post: format!("{pair} BELOW {target} TARGET AT {price}"),
        }),
    };

    Ok(satisfaction)
}

/// Evaluate a technical alert against the shared aggregate snapshot.
///
/// The alert's canonical query must match an aggregate entry; a missing
/// match means the builder and evaluator have diverged and is raised as
/// a data-consistency error. A null output value means the poller has not
/// fetched it yet and is simply not-yet-satisfied.
pub fn evaluate_technical(
    pair: &Pair,
    alert: &Alert,
    aggregate: &Aggregate,
    catalog: &IndicatorCatalog,
) -> Result<Option<Satisfaction>, EngineError> {
    let AlertKind::Technical {
        indicator,
        interval,
        params,
        output_value,
    } = &alert.kind
    else {
        return Ok(None);
    };

    if aggregate.is_empty() {
        warn!(%pair, indicator, "aggregate is empty while technical alerts exist");
        return Ok(None);
    }

    let symbol = pair.to_string();
    let spec = QuerySpec::from_technical(indicator, params, catalog)?;
    let matched = aggregate.find(&symbol, interval, &spec).ok_or_else(|| {
        EngineError::DataConsistency {
            pair: symbol.clone(),
            indicator: indicator.clone(),
            interval: interval.clone(),
        }
    })?;

    let value = match matched.values.get(output_value) {
        Some(Some(value)) => *value,
        // Not fetched yet.
        Some(None) => return Ok(None),
        None => {
            return Err(EngineError::DataConsistency {
                pair: symbol,
                indicator: indicator.clone(),
                interval: interval.clone(),
            })
        }
    };

    let satisfied = match alert.comparison {
        Comparison::Above => value > alert.target,
        Comparison::Below => value < alert.target,
        comparison => return Err(EngineError::InvalidTechnicalComparison { comparison }),
    };
    if !satisfied {
        return Ok(None);
    }

    let name = &catalog.get(indicator)?.name;
    let params_str = spec
        .params
        .iter()
        .map(|(key, value)| format!("{}={value}", key.to_uppercase()))
        .collect::<Vec<_>>()
        .join(", ");
    let post = format!(
        "{pair} {name} ({indicator}) {interval} {params_str} {} {} AT {value:.prec$}",
        alert.comparison,
        alert.target,
        prec = OUTPUT_VALUE_PRECISION,
    );

    Ok(Some(Satisfaction { value, post }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{rebuild, Aggregate};
    use pretty_assertions::assert_eq;
    use pricebell_core::{AlertsByPair, Trigger};
    use std::collections::BTreeMap;

    fn pair() -> Pair {
        Pair::new("ETH", "USDT")
    }

    fn simple(comparison: Comparison, target: f64, entry: Option<f64>) -> Alert {
        Alert::simple(comparison, target, entry, Trigger::one_shot()).unwrap()
    }

    #[test]
    fn test_above_below_strict_inequality() {
        let above = simple(Comparison::Above, 3000.0, None);
        assert!(evaluate_simple(&pair(), &above, 3000.0, None)
            .unwrap()
            .is_none());
        let sat = evaluate_simple(&pair(), &above, 3100.0, None)
            .unwrap()
            .unwrap();
        assert_eq!(sat.post, "ETH/USDT ABOVE 3000 TARGET AT 3100");

        let below = simple(Comparison::Below, 3000.0, None);
        assert!(evaluate_simple(&pair(), &below, 3000.0, None)
            .unwrap()
            .is_none());
        assert!(evaluate_simple(&pair(), &below, 2999.0, None)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_pctchg_is_symmetric() {
        let alert = simple(Comparison::PctChg, 0.10, Some(2000.0));

        let up = evaluate_simple(&pair(), &alert, 2201.0, None)
            .unwrap()
            .unwrap();
        assert!((up.value - 10.05).abs() < 0.01);
        assert!(up.post.contains("UP 10.1% FROM 2000"));

        let down = evaluate_simple(&pair(), &alert, 1799.0, None)
            .unwrap()
            .unwrap();
        assert!((down.value - 10.05).abs() < 0.01);
        assert!(down.post.contains("DOWN 10.1% FROM 2000"));

        assert!(evaluate_simple(&pair(), &alert, 2000.0, None)
            .unwrap()
            .is_none());
        // Exactly on the boundary does not satisfy.
        assert!(evaluate_simple(&pair(), &alert, 2200.0, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_24hr_change_uses_absolute_value() {
        let alert = simple(Comparison::Change24h, 5.0, None);
        assert!(evaluate_simple(&pair(), &alert, 3000.0, Some(-6.2))
            .unwrap()
            .is_some());
        assert!(evaluate_simple(&pair(), &alert, 3000.0, Some(5.0))
            .unwrap()
            .is_some());
        assert!(evaluate_simple(&pair(), &alert, 3000.0, Some(4.9))
            .unwrap()
            .is_none());
    }

    fn technical_fixture(value: Option<f64>) -> (Alert, Aggregate, IndicatorCatalog) {
        let catalog = IndicatorCatalog::builtin().unwrap();
        let alert = Alert::technical(
            &catalog,
            "RSI",
            "1h",
            &BTreeMap::new(),
            "value",
            Comparison::Below,
            30.0,
            Trigger::one_shot(),
        )
        .unwrap();

        let mut alerts = AlertsByPair::new();
        alerts.push(pair(), alert.clone());
        let mut aggregate = rebuild(&[("1".to_string(), alerts)], &catalog, &Aggregate::new());
        if let Some(value) = value {
            let entries = aggregate
                .groups
                .get_mut("ETH/USDT")
                .and_then(|i| i.get_mut("1h"))
                .unwrap();
            entries[0].values.insert("value".to_string(), Some(value));
        }
        (alert, aggregate, catalog)
    }

    #[test]
    fn test_technical_satisfied_formats_post() {
        let (alert, aggregate, catalog) = technical_fixture(Some(24.5));
        let sat = evaluate_technical(&pair(), &alert, &aggregate, &catalog)
            .unwrap()
            .unwrap();
        assert_eq!(sat.value, 24.5);
        assert_eq!(
            sat.post,
            "ETH/USDT Relative Strength Index (RSI) 1h PERIOD=14 BELOW 30 AT 24.500"
        );
    }

    #[test]
    fn test_technical_null_value_is_not_satisfied() {
        let (alert, aggregate, catalog) = technical_fixture(None);
        assert!(evaluate_technical(&pair(), &alert, &aggregate, &catalog)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_technical_unsatisfied() {
        let (alert, aggregate, catalog) = technical_fixture(Some(55.0));
        assert!(evaluate_technical(&pair(), &alert, &aggregate, &catalog)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_technical_unmatched_query_is_data_consistency_error() {
        let (alert, _aggregate, catalog) = technical_fixture(Some(24.5));

        // An aggregate built for a different pair cannot match this alert.
        let mut other_alerts = AlertsByPair::new();
        other_alerts.push(Pair::new("BTC", "USDT"), alert.clone());
        let aggregate = rebuild(
            &[("1".to_string(), other_alerts)],
            &catalog,
            &Aggregate::new(),
        );

        assert!(matches!(
            evaluate_technical(&pair(), &alert, &aggregate, &catalog),
            Err(EngineError::DataConsistency { .. })
        ));
    }

    #[test]
    fn test_technical_empty_aggregate_is_not_an_error() {
        let (alert, _, catalog) = technical_fixture(None);
        let empty = Aggregate::new();
        assert!(evaluate_technical(&pair(), &alert, &empty, &catalog)
            .unwrap()
            .is_none());
    }
}
