//! Edge condition evaluator — a deliberately minimal expression language.
//!
//! Supported shapes:
//! - the literals `true` and `false`;
//! - a single binary comparison `field OP value` where OP is one of
//!   `>  >=  <  <=  ==  =  !=` and `value` parses as an integer.
//!
//! `field` resolves against the variables snapshot; floats are truncated to
//! integers. An unresolved or non-numeric field evaluates to `false` rather
//! than erroring, so a branch whose data never materialised is simply not
//! taken. Any other expression shape is [`EngineError::InvalidExpression`].

use nodes::ValueMap;
use serde_json::Value;

use crate::EngineError;

/// Evaluate a condition expression against a variables snapshot.
///
/// Deterministic and side-effect-free.
pub fn evaluate(expression: &str, variables: &ValueMap) -> Result<bool, EngineError> {
    let expression = expression.trim();
    match expression {
        "true" => return Ok(true),
        "false" => return Ok(false),
        _ => {}
    }

    let tokens: Vec<&str> = expression.split_whitespace().collect();
    if tokens.len() != 3 {
        return Err(EngineError::InvalidExpression(expression.to_string()));
    }
    let (field, operator, value) = (tokens[0], tokens[1], tokens[2]);

    let target: i64 = value
        .parse()
        .map_err(|_| EngineError::InvalidExpression(expression.to_string()))?;

    let actual = match variables.get(field).and_then(as_integer) {
        Some(actual) => actual,
        // Unresolved or non-numeric field: the condition is simply false.
        None => return Ok(false),
    };

    match operator {
        ">" => Ok(actual > target),
        ">=" => Ok(actual >= target),
        "<" => Ok(actual < target),
        "<=" => Ok(actual <= target),
        "==" | "=" => Ok(actual == target),
        "!=" => Ok(actual != target),
        _ => Err(EngineError::InvalidExpression(expression.to_string())),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        _ => None,
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn literals() {
        assert!(evaluate("true", &ValueMap::new()).unwrap());
        assert!(!evaluate("false", &ValueMap::new()).unwrap());
    }

    #[test]
    fn comparisons() {
        let variables = vars(&[("count", json!(5))]);
        assert!(evaluate("count > 1", &variables).unwrap());
        assert!(evaluate("count >= 5", &variables).unwrap());
        assert!(!evaluate("count < 5", &variables).unwrap());
        assert!(evaluate("count <= 5", &variables).unwrap());
        assert!(evaluate("count == 5", &variables).unwrap());
        assert!(evaluate("count = 5", &variables).unwrap());
        assert!(evaluate("count != 4", &variables).unwrap());
    }

    #[test]
    fn floats_are_truncated() {
        let variables = vars(&[("ratio", json!(1.9))]);
        assert!(evaluate("ratio == 1", &variables).unwrap());
        assert!(!evaluate("ratio >= 2", &variables).unwrap());
    }

    #[test]
    fn unresolved_field_is_false_not_an_error() {
        assert!(!evaluate("missing > 0", &ValueMap::new()).unwrap());
    }

    #[test]
    fn non_numeric_field_is_false_not_an_error() {
        let variables = vars(&[("name", json!("alice"))]);
        assert!(!evaluate("name > 0", &variables).unwrap());
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        let variables = vars(&[("x", json!(1))]);
        assert!(evaluate("x >", &variables).is_err());
        assert!(evaluate("x > 1 2", &variables).is_err());
        assert!(evaluate("x ~ 1", &variables).is_err());
        assert!(evaluate("x > abc", &variables).is_err());
        assert!(evaluate("", &variables).is_err());
    }
}
