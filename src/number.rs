// ============================================================================
// NUMBER HELPERS — clamping and safe coercion of untrusted document fields
// ============================================================================

use serde_json::Value;

/// Clamp `value` into `[min, max]`.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    max.min(min.max(value))
}

/// Coerce an arbitrary f64 to a usable number, falling back when it is
/// NaN or infinite. Hydration paths route every numeric field through this
/// so malformed input degrades to the field default instead of propagating.
pub fn to_number(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Coerce a JSON value to a finite number. Accepts numbers and numeric
/// strings; everything else (null, missing, objects, non-numeric strings)
/// yields `fallback`.
pub fn json_number(value: Option<&Value>, fallback: f64) -> f64 {
    match value {
        Some(Value::Number(n)) => to_number(n.as_f64().unwrap_or(fallback), fallback),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(n) => to_number(n, fallback),
            Err(_) => fallback,
        },
        _ => fallback,
    }
}

/// Non-empty string field, or `fallback`.
pub fn json_string(value: Option<&Value>, fallback: &str) -> String {
    match value {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clamp_orders_bounds() {
        assert_eq!(clamp(5.0, 0.0, 10.0), 5.0);
        assert_eq!(clamp(-3.0, 0.0, 10.0), 0.0);
        assert_eq!(clamp(99.0, 0.0, 10.0), 10.0);
    }

    #[test]
    fn json_number_coerces_strings_and_rejects_junk() {
        assert_eq!(json_number(Some(&json!(2.5)), 0.0), 2.5);
        assert_eq!(json_number(Some(&json!("17")), 0.0), 17.0);
        assert_eq!(json_number(Some(&json!("not a number")), 4.0), 4.0);
        assert_eq!(json_number(Some(&json!(null)), 4.0), 4.0);
        assert_eq!(json_number(None, 4.0), 4.0);
    }
}
