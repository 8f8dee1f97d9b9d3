//! Grouping-key resolution from layered attribute sets.
//!
//! A log record carries attributes at three levels. The grouping value for
//! an attribute key is looked up in strict precedence order:
//!
//! 1. record attributes
//! 2. instrumentation scope attributes
//! 3. resource attributes
//!
//! The first layer whose **first** entry for the key carries a value wins,
//! even if that value is the empty string. An entry without a value does not
//! count as a match and the search moves on to the next layer.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use logtally_types::{AnyValue, KeyValue};

/// Value substituted by callers for records whose key resolves nowhere.
pub const UNKNOWN_VALUE: &str = "unknown";

/// Rendering used for composite or unset attribute values.
pub const UNSUPPORTED_VALUE: &str = "<unknown>";

/// Resolve `key` against the record, scope and resource attribute layers.
///
/// Returns `Some(value)` from the highest-precedence layer holding a valued
/// entry for `key`, or `None` when no layer does. Never fails.
pub fn resolve(
    key: &str,
    log_attrs: &[KeyValue],
    scope_attrs: &[KeyValue],
    resource_attrs: &[KeyValue],
) -> Option<String> {
    find_in_layer(key, log_attrs)
        .or_else(|| find_in_layer(key, scope_attrs))
        .or_else(|| find_in_layer(key, resource_attrs))
}

/// Look up the first entry named `key` in one layer.
fn find_in_layer(key: &str, attrs: &[KeyValue]) -> Option<String> {
    attrs
        .iter()
        .find(|kv| kv.key == key)
        .and_then(|kv| kv.value.as_ref())
        .map(canonical_string)
}

/// Coerce a typed attribute value to its canonical string form.
///
/// Strings pass through, booleans become `true`/`false`, integers their
/// decimal form, doubles their shortest round-trip digits in `%g` layout
/// (see [`format_double`]), bytes standard base64. Arrays, key/value lists and unset values render
/// as [`UNSUPPORTED_VALUE`].
pub fn canonical_string(value: &AnyValue) -> String {
    match value {
        AnyValue::String(s) => s.clone(),
        AnyValue::Bool(b) => b.to_string(),
        AnyValue::Int(i) => i.to_string(),
        AnyValue::Double(d) => format_double(*d),
        AnyValue::Bytes(bytes) => STANDARD.encode(bytes),
        AnyValue::Array(_) | AnyValue::KvList(_) | AnyValue::Unset => {
            UNSUPPORTED_VALUE.to_owned()
        }
    }
}

/// Render a double with the shortest digits that round-trip, switching to
/// exponent form when the decimal exponent is below -4 or at least 6.
///
/// The exponent carries a sign and at least two digits (`1e+21`, `1e-07`).
/// Infinities render as `+Inf`/`-Inf`, NaN as `NaN`.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return String::from("NaN");
    }
    if value.is_infinite() {
        return String::from(if value.is_sign_positive() { "+Inf" } else { "-Inf" });
    }

    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };

    if (-4..6).contains(&exponent) {
        value.to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue::new(key, value)
    }

    #[test]
    fn record_layer_takes_precedence() {
        let got = resolve(
            "foo",
            &[kv("foo", "log")],
            &[kv("foo", "scope")],
            &[kv("foo", "resource")],
        );
        assert_eq!(got.as_deref(), Some("log"));
    }

    #[test]
    fn falls_back_to_scope_then_resource() {
        let got = resolve("foo", &[kv("other", "x")], &[kv("foo", "scope")], &[kv("foo", "res")]);
        assert_eq!(got.as_deref(), Some("scope"));

        let got = resolve("foo", &[], &[], &[kv("foo", "res")]);
        assert_eq!(got.as_deref(), Some("res"));
    }

    #[test]
    fn absent_everywhere_is_none() {
        assert_eq!(resolve("foo", &[kv("bar", "1")], &[], &[kv("baz", "2")]), None);
        assert_eq!(resolve("foo", &[], &[], &[]), None);
    }

    #[test]
    fn empty_string_still_matches() {
        let got = resolve("foo", &[kv("foo", "")], &[kv("foo", "scope")], &[]);
        assert_eq!(got.as_deref(), Some(""));
    }

    #[test]
    fn first_occurrence_in_a_layer_wins() {
        let got = resolve("foo", &[kv("foo", "first"), kv("foo", "second")], &[], &[]);
        assert_eq!(got.as_deref(), Some("first"));
    }

    #[test]
    fn valueless_entry_defers_to_lower_layer() {
        let got = resolve(
            "foo",
            &[KeyValue::without_value("foo")],
            &[KeyValue::without_value("foo")],
            &[kv("foo", "res")],
        );
        assert_eq!(got.as_deref(), Some("res"));
    }

    #[test]
    fn valueless_first_occurrence_shadows_later_duplicate() {
        let got = resolve(
            "foo",
            &[KeyValue::without_value("foo"), kv("foo", "late")],
            &[],
            &[],
        );
        assert_eq!(got, None);
    }

    #[test]
    fn scalar_coercion() {
        assert_eq!(canonical_string(&AnyValue::string("v")), "v");
        assert_eq!(canonical_string(&AnyValue::Bool(true)), "true");
        assert_eq!(canonical_string(&AnyValue::Bool(false)), "false");
        assert_eq!(canonical_string(&AnyValue::Int(-42)), "-42");
        assert_eq!(canonical_string(&AnyValue::Double(1.5)), "1.5");
        assert_eq!(canonical_string(&AnyValue::Double(0.1)), "0.1");
        assert_eq!(canonical_string(&AnyValue::Double(2.75)), "2.75");
        assert_eq!(canonical_string(&AnyValue::Double(1e21)), "1e+21");
        assert_eq!(canonical_string(&AnyValue::Double(1e-7)), "1e-07");
        assert_eq!(canonical_string(&AnyValue::Double(f64::INFINITY)), "+Inf");
        assert_eq!(canonical_string(&AnyValue::Bytes(b"hi".to_vec())), "aGk=");
    }

    #[test]
    fn double_layout_switches_at_exponent_bounds() {
        assert_eq!(format_double(0.0), "0");
        assert_eq!(format_double(-0.0), "-0");
        assert_eq!(format_double(100_000.0), "100000");
        assert_eq!(format_double(123_456.0), "123456");
        assert_eq!(format_double(1_000_000.0), "1e+06");
        assert_eq!(format_double(1_234_567.0), "1.234567e+06");
        assert_eq!(format_double(0.0001), "0.0001");
        assert_eq!(format_double(0.000_012_5), "1.25e-05");
        assert_eq!(format_double(-2.5e-10), "-2.5e-10");
        assert_eq!(format_double(1e300), "1e+300");
        assert_eq!(format_double(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_double(f64::NAN), "NaN");
    }

    #[test]
    fn composite_and_unset_render_as_sentinel() {
        assert_eq!(canonical_string(&AnyValue::Array(vec![AnyValue::Int(1)])), "<unknown>");
        assert_eq!(canonical_string(&AnyValue::KvList(vec![kv("a", "b")])), "<unknown>");
        assert_eq!(canonical_string(&AnyValue::Unset), "<unknown>");
    }

    #[test]
    fn typed_values_resolve_through_layers() {
        let got = resolve("code", &[], &[KeyValue::new("code", 200_i64)], &[]);
        assert_eq!(got.as_deref(), Some("200"));
    }
}
