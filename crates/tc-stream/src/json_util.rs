//! JSON field helpers shared by the protocol adapter.
//!
//! Numeric fields may arrive as JSON numbers or numeric strings. A slot that
//! is `null`, non-numeric, or non-finite becomes `None`; it never fails the
//! whole message.

use serde_json::Value;

/// Parse a JSON value (string or number) as a finite `f64`.
#[inline]
pub fn parse_str_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    let n = if let Some(s) = v.as_str() {
        fast_float2::parse::<f64, _>(s.trim()).ok()?
    } else {
        v.as_f64()?
    };
    n.is_finite().then_some(n)
}

/// Parse a JSON value (string or number) as a MIDI-style pitch.
///
/// Fractional values are rounded to the nearest semitone.
#[inline]
pub fn parse_pitch(v: Option<&Value>) -> Option<i32> {
    let v = v?;
    if let Some(n) = v.as_i64() {
        return i32::try_from(n).ok();
    }
    let f = parse_str_f64(Some(v))?;
    let r = f.round();
    (r >= i32::MIN as f64 && r <= i32::MAX as f64).then_some(r as i32)
}

/// Parse a JSON value (string or number) as `i64`.
#[inline]
pub fn parse_str_i64(v: Option<&Value>) -> Option<i64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.trim().parse().ok()
    } else {
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }
}

/// Parse a named field as `f64` (string or number).
#[inline]
pub fn parse_f64_field(v: &Value, key: &str) -> Option<f64> {
    parse_str_f64(v.get(key))
}

/// A named field holding an array of optional prices. `None` if the field is
/// missing or not an array.
pub fn price_array(v: &Value, key: &str) -> Option<Vec<Option<f64>>> {
    let arr = v.get(key)?.as_array()?;
    Some(arr.iter().map(|x| parse_str_f64(Some(x))).collect())
}

/// A named field holding an array of optional pitches.
pub fn pitch_array(v: &Value, key: &str) -> Option<Vec<Option<i32>>> {
    let arr = v.get(key)?.as_array()?;
    Some(arr.iter().map(|x| parse_pitch(Some(x))).collect())
}

/// A named string field.
pub fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)?.as_str().map(str::to_owned)
}

/// A named boolean field. Numbers count as `true` when non-zero.
pub fn bool_field(v: &Value, key: &str) -> bool {
    match v.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// The field is present and holds a scalar (number, string, or null).
pub fn has_scalar(v: &Value, key: &str) -> bool {
    matches!(
        v.get(key),
        Some(Value::Number(_) | Value::String(_) | Value::Null)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_strings() {
        assert_eq!(parse_str_f64(Some(&json!(430.25))), Some(430.25));
        assert_eq!(parse_str_f64(Some(&json!("430.25"))), Some(430.25));
        assert_eq!(parse_str_f64(Some(&json!("abc"))), None);
        assert_eq!(parse_str_f64(Some(&Value::Null)), None);
        assert_eq!(parse_str_f64(None), None);
    }

    #[test]
    fn pitches_round() {
        assert_eq!(parse_pitch(Some(&json!(72))), Some(72));
        assert_eq!(parse_pitch(Some(&json!(71.6))), Some(72));
        assert_eq!(parse_pitch(Some(&json!("48"))), Some(48));
        assert_eq!(parse_pitch(Some(&Value::Null)), None);
    }

    #[test]
    fn arrays_keep_slot_positions() {
        let v = json!({"p": [1.0, null, "2.5", "x"]});
        let expected = vec![Some(1.0), None, Some(2.5), None];
        assert_eq!(price_array(&v, "p"), Some(expected));
        assert_eq!(price_array(&v, "missing"), None);
        assert_eq!(price_array(&json!({"p": 3}), "p"), None);
    }

    #[test]
    fn bool_accepts_numbers() {
        assert!(bool_field(&json!({"d": true}), "d"));
        assert!(bool_field(&json!({"d": 1}), "d"));
        assert!(!bool_field(&json!({"d": 0}), "d"));
        assert!(!bool_field(&json!({}), "d"));
    }
}
