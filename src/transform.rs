// Convert raw broker payloads into stock levels.
// The sensor hangs 400 cm above the empty floor; one stock unit is 100 cm.

use std::fmt;

use thiserror::Error;

pub const SENSOR_HEIGHT_CM: f64 = 400.0;
pub const CM_PER_UNIT: f64 = 100.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("payload {0:?} does not start with an integer")]
    NotNumeric(String),
    #[error("measurement {0:?} is out of range")]
    OutOfRange(String),
}

/// Distance reading in centimetres, as published by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement(pub i64);

/// Derived fill level, `(400 - cm) / 100`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockLevel(pub f64);

impl StockLevel {
    pub fn from_measurement(m: Measurement) -> Self {
        // Done in f64 so extreme readings cannot overflow the subtraction.
        StockLevel((SENSOR_HEIGHT_CM - m.0 as f64) / CM_PER_UNIT)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<Measurement> for StockLevel {
    fn from(m: Measurement) -> Self {
        StockLevel::from_measurement(m)
    }
}

impl fmt::Display for StockLevel {
    // f64's Display already prints the shortest round-trip form ("3", "2.5", "-1").
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read the leading decimal integer of a payload.
///
/// Leading whitespace and an optional sign are accepted, and parsing stops at
/// the first non-digit, so `"150cm"` reads as 150 and `"12.7"` as 12.
pub fn parse_measurement(payload: &[u8]) -> Result<Measurement, TransformError> {
    let text = std::str::from_utf8(payload).map_err(|_| TransformError::NotUtf8)?;
    let trimmed = text.trim_start();

    let sign_len = match trimmed.as_bytes().first() {
        Some(b'+') | Some(b'-') => 1,
        _ => 0,
    };
    let digits_len = trimmed[sign_len..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();

    if digits_len == 0 {
        return Err(TransformError::NotNumeric(text.to_string()));
    }

    let number = &trimmed[..sign_len + digits_len];
    number
        .parse::<i64>()
        .map(Measurement)
        .map_err(|_| TransformError::OutOfRange(number.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn level_for(payload: &str) -> StockLevel {
        StockLevel::from(parse_measurement(payload.as_bytes()).unwrap())
    }

    #[test]
    fn test_formula_reference_points() {
        assert_eq!(StockLevel::from(Measurement(100)).value(), 3.0);
        assert_eq!(StockLevel::from(Measurement(400)).value(), 0.0);
        assert_eq!(StockLevel::from(Measurement(500)).value(), -1.0);
        assert_eq!(StockLevel::from(Measurement(150)).value(), 2.5);
        assert_eq!(StockLevel::from(Measurement(250)).value(), 1.5);
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(level_for("100").to_string(), "3");
        assert_eq!(level_for("400").to_string(), "0");
        assert_eq!(level_for("500").to_string(), "-1");
        assert_eq!(level_for("150").to_string(), "2.5");
        assert_eq!(level_for("250").to_string(), "1.5");
        assert_eq!(level_for("333").to_string(), "0.67");
    }

    #[test]
    fn test_parse_leading_integer() {
        assert_eq!(parse_measurement(b"150"), Ok(Measurement(150)));
        assert_eq!(parse_measurement(b"  42\n"), Ok(Measurement(42)));
        assert_eq!(parse_measurement(b"150cm"), Ok(Measurement(150)));
        assert_eq!(parse_measurement(b"12.7"), Ok(Measurement(12)));
        assert_eq!(parse_measurement(b"-20"), Ok(Measurement(-20)));
        assert_eq!(parse_measurement(b"+7"), Ok(Measurement(7)));
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        assert_eq!(
            parse_measurement(b"abc"),
            Err(TransformError::NotNumeric("abc".into()))
        );
        assert_eq!(parse_measurement(b""), Err(TransformError::NotNumeric("".into())));
        assert_eq!(parse_measurement(b"-"), Err(TransformError::NotNumeric("-".into())));
        assert_eq!(parse_measurement(&[0xff, 0xfe]), Err(TransformError::NotUtf8));
    }

    #[test]
    fn test_parse_out_of_range() {
        let huge = "99999999999999999999999";
        assert_eq!(
            parse_measurement(huge.as_bytes()),
            Err(TransformError::OutOfRange(huge.into()))
        );
    }

    proptest! {
        #[test]
        fn level_inverts_back_to_measurement(cm in -1_000_000i64..1_000_000) {
            let level = StockLevel::from(parse_measurement(cm.to_string().as_bytes()).unwrap());
            let back = SENSOR_HEIGHT_CM - level.value() * CM_PER_UNIT;
            prop_assert!((back - cm as f64).abs() < 1e-6);
        }

        #[test]
        fn higher_reading_means_lower_stock(a in -100_000i64..100_000, b in -100_000i64..100_000) {
            prop_assume!(a < b);
            prop_assert!(StockLevel::from(Measurement(a)).value() > StockLevel::from(Measurement(b)).value());
        }
    }
}
