//! Parsing for the alert-management command arguments.
//!
//! `/newalert` accepts two forms, distinguished by the second token:
//!
//! ```text
//! /newalert ETH/USDT ABOVE 3000 [5m]
//! /newalert ETH/USDT PRICE ABOVE 3000 [5m]          (explicit simple form)
//! /newalert ETH/USDT RSI 1h default value BELOW 30 [5m]
//! /newalert ETH/USDT RSI 1h period=7 value BELOW 30 [5m]
//! ```
//!
//! PCTCHG targets are entered as percentages (10 = 10%) and stored as
//! fractions; 24HRCHG targets stay in percent points to match the feed.

use pricebell_core::{AlertError, Comparison, Pair, PairError, Trigger};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const SIMPLE_USAGE: &str = "/newalert PAIR COMPARISON TARGET [COOLDOWN]";
pub const TECHNICAL_USAGE: &str =
    "/newalert PAIR INDICATOR INTERVAL PARAMS OUTPUT COMPARISON TARGET [COOLDOWN]";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid message formatting, expected:\n{0}")]
    BadFormat(&'static str),
    #[error("'{0}' is not a number")]
    BadNumber(String),
    #[error(transparent)]
    Pair(#[from] PairError),
    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Parsed `/newalert` arguments. The entry price of a PCTCHG alert is not
/// part of the message; the handler snapshots the live price at creation.
#[derive(Debug, PartialEq)]
pub enum NewAlert {
    Simple {
        pair: Pair,
        comparison: Comparison,
        target: f64,
        trigger: Trigger,
    },
    Technical {
        pair: Pair,
        indicator: String,
        interval: String,
        params: BTreeMap<String, Value>,
        output_value: String,
        comparison: Comparison,
        target: f64,
        trigger: Trigger,
    },
}

fn parse_number(token: &str) -> Result<f64, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::BadNumber(token.to_string()))
}

fn parse_trigger(token: Option<&&str>) -> Result<Trigger, ParseError> {
    match token {
        Some(token) => Ok(Trigger::with_cooldown(token)?),
        None => Ok(Trigger::one_shot()),
    }
}

/// Parse a `param=value,param=value` token. `default` keeps every default.
/// Values that read as numbers become numbers, everything else stays a
/// string.
fn parse_params(token: &str) -> Result<BTreeMap<String, Value>, ParseError> {
    let mut params = BTreeMap::new();
    if token.eq_ignore_ascii_case("default") {
        return Ok(params);
    }
    for arg in token.split(',') {
        let (key, value) = arg
            .split_once('=')
            .ok_or(ParseError::BadFormat(TECHNICAL_USAGE))?;
        let value = if let Ok(int) = value.parse::<i64>() {
            Value::from(int)
        } else if let Ok(float) = value.parse::<f64>() {
            Value::from(float)
        } else {
            Value::from(value)
        };
        params.insert(key.to_string(), value);
    }
    Ok(params)
}

pub fn parse_new_alert(args: &str) -> Result<NewAlert, ParseError> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(ParseError::BadFormat(SIMPLE_USAGE));
    }
    let pair: Pair = tokens[0].parse()?;

    // Simple forms: the second token is a comparison, or the literal PRICE
    // indicator followed by one.
    let simple_offset = if tokens[1].eq_ignore_ascii_case("price") {
        Some(2)
    } else if tokens[1].parse::<Comparison>().is_ok() {
        Some(1)
    } else {
        None
    };

    if let Some(offset) = simple_offset {
        if tokens.len() < offset + 2 {
            return Err(ParseError::BadFormat(SIMPLE_USAGE));
        }
        let comparison: Comparison = tokens[offset]
            .parse()
            .map_err(|_| ParseError::BadFormat(SIMPLE_USAGE))?;
        let mut target = parse_number(tokens[offset + 1])?;
        // Users enter percent points; PCTCHG is stored as a fraction.
        if comparison == Comparison::PctChg {
            target /= 100.0;
        }
        let trigger = parse_trigger(tokens.get(offset + 2))?;
        return Ok(NewAlert::Simple {
            pair,
            comparison,
            target,
            trigger,
        });
    }

    // Technical form.
    if tokens.len() < 7 {
        return Err(ParseError::BadFormat(TECHNICAL_USAGE));
    }
    let comparison: Comparison = tokens[5]
        .parse()
        .map_err(|_| ParseError::BadFormat(TECHNICAL_USAGE))?;
    Ok(NewAlert::Technical {
        pair,
        indicator: tokens[1].to_uppercase(),
        interval: tokens[2].to_lowercase(),
        params: parse_params(tokens[3])?,
        output_value: tokens[4].to_string(),
        comparison,
        target: parse_number(tokens[6])?,
        trigger: parse_trigger(tokens.get(7))?,
    })
}

/// Parse `/cancelalert PAIR INDEX` (1-based index).
pub fn parse_cancel_alert(args: &str) -> Result<(Pair, usize), ParseError> {
    const USAGE: &str = "/cancelalert PAIR INDEX";
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let [pair, index] = tokens.as_slice() else {
        return Err(ParseError::BadFormat(USAGE));
    };
    let index: usize = index
        .parse()
        .map_err(|_| ParseError::BadNumber(index.to_string()))?;
    if index == 0 {
        return Err(ParseError::BadNumber(index.to_string()));
    }
    Ok((pair.parse()?, index))
}

/// `add`/`remove` list-management arguments for /channels and /emails.
#[derive(Debug, PartialEq)]
pub enum ListEdit {
    Add(Vec<String>),
    Remove(Vec<String>),
}

pub fn parse_list_edit(args: &str, usage: &'static str) -> Result<ListEdit, ParseError> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let [action, items] = tokens.as_slice() else {
        return Err(ParseError::BadFormat(usage));
    };
    let items: Vec<String> = items
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        return Err(ParseError::BadFormat(usage));
    }
    match action.to_lowercase().as_str() {
        "add" => Ok(ListEdit::Add(items)),
        "remove" => Ok(ListEdit::Remove(items)),
        _ => Err(ParseError::BadFormat(usage)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_simple_above() {
        let parsed = parse_new_alert("ETH/USDT ABOVE 3000").unwrap();
        assert_eq!(
            parsed,
            NewAlert::Simple {
                pair: Pair::new("ETH", "USDT"),
                comparison: Comparison::Above,
                target: 3000.0,
                trigger: Trigger::one_shot(),
            }
        );
    }

    #[test]
    fn test_parse_simple_with_price_token_and_cooldown() {
        let parsed = parse_new_alert("eth/usdt PRICE below 2500 5m").unwrap();
        match parsed {
            NewAlert::Simple {
                comparison,
                target,
                trigger,
                ..
            } => {
                assert_eq!(comparison, Comparison::Below);
                assert_eq!(target, 2500.0);
                assert_eq!(trigger.cooldown_seconds, Some(300));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_simple_pctchg_scales_to_fraction() {
        let parsed = parse_new_alert("ETH/USDT PCTCHG 10").unwrap();
        match parsed {
            NewAlert::Simple { target, .. } => assert_eq!(target, 0.10),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_technical_default_params() {
        let parsed = parse_new_alert("ETH/USDT RSI 1h default value BELOW 30").unwrap();
        assert_eq!(
            parsed,
            NewAlert::Technical {
                pair: Pair::new("ETH", "USDT"),
                indicator: "RSI".to_string(),
                interval: "1h".to_string(),
                params: BTreeMap::new(),
                output_value: "value".to_string(),
                comparison: Comparison::Below,
                target: 30.0,
                trigger: Trigger::one_shot(),
            }
        );
    }

    #[test]
    fn test_parse_technical_explicit_params() {
        let parsed =
            parse_new_alert("ETH/USDT RSI 4h period=7 value ABOVE 70 1h").unwrap();
        match parsed {
            NewAlert::Technical {
                params,
                interval,
                trigger,
                ..
            } => {
                assert_eq!(params.get("period"), Some(&json!(7)));
                assert_eq!(interval, "4h");
                assert_eq!(trigger.cooldown_seconds, Some(3600));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_short_messages() {
        assert!(parse_new_alert("ETH/USDT ABOVE").is_err());
        assert!(parse_new_alert("ETH/USDT RSI 1h default value BELOW").is_err());
        assert!(parse_new_alert("ETHUSDT ABOVE 3000").is_err());
    }

    #[test]
    fn test_parse_cancel_alert() {
        let (pair, index) = parse_cancel_alert("ETH/USDT 2").unwrap();
        assert_eq!(pair, Pair::new("ETH", "USDT"));
        assert_eq!(index, 2);
        assert!(parse_cancel_alert("ETH/USDT 0").is_err());
        assert!(parse_cancel_alert("ETH/USDT two").is_err());
        assert!(parse_cancel_alert("ETH/USDT").is_err());
    }

    #[test]
    fn test_parse_list_edit() {
        assert_eq!(
            parse_list_edit("add 123,456", "usage").unwrap(),
            ListEdit::Add(vec!["123".to_string(), "456".to_string()])
        );
        assert_eq!(
            parse_list_edit("REMOVE a@b.c", "usage").unwrap(),
            ListEdit::Remove(vec!["a@b.c".to_string()])
        );
        assert!(parse_list_edit("clear 1", "usage").is_err());
        assert!(parse_list_edit("add", "usage").is_err());
    }
}
