use std::fmt;
use std::str::FromStr;

use crate::native::types::MAX_DECIMAL_PRECISION;
use crate::{Error, Result};

/// Exact fixed-point number: `mantissa × 10^-scale`, bounded to `precision` significant digits.
///
/// Mirrors the wire representation of `Decimal(P, S)` columns, so values survive a round trip
/// through the server without any floating-point drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa:  i128,
    precision: u8,
    scale:     u8,
}

fn pow10(exp: u8) -> Option<i128> { 10i128.checked_pow(u32::from(exp)) }

fn fits(mantissa: i128, precision: u8) -> bool {
    pow10(precision).is_none_or(|limit| mantissa.unsigned_abs() < limit.unsigned_abs())
}

impl Decimal {
    /// # Errors
    ///
    /// Returns an error if `precision` is outside `1..=38`, `scale` exceeds `precision`, or
    /// `mantissa` has more than `precision` digits.
    pub fn new(mantissa: i128, precision: u8, scale: u8) -> Result<Self> {
        if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision {
            return Err(Error::encode(format!("invalid decimal precision/scale ({precision}, {scale})")));
        }
        if !fits(mantissa, precision) {
            return Err(Error::encode(format!(
                "{} does not fit Decimal({precision}, {scale})",
                Decimal { mantissa, precision: MAX_DECIMAL_PRECISION, scale }
            )));
        }
        Ok(Decimal { mantissa, precision, scale })
    }

    pub(crate) fn from_raw(mantissa: i128, precision: u8, scale: u8) -> Self {
        Decimal { mantissa, precision, scale }
    }

    pub(crate) fn zero(precision: u8, scale: u8) -> Self { Decimal { mantissa: 0, precision, scale } }

    pub fn mantissa(&self) -> i128 { self.mantissa }

    pub fn precision(&self) -> u8 { self.precision }

    pub fn scale(&self) -> u8 { self.scale }

    /// Convert to another precision and scale without losing any digit.
    ///
    /// # Errors
    ///
    /// Fails when dropping fractional digits would discard a non-zero digit, or when the result
    /// does not fit `precision` digits.
    pub fn rescale(&self, precision: u8, scale: u8) -> Result<Self> {
        let overflow = || Error::encode(format!("{self} does not fit Decimal({precision}, {scale})"));
        let mantissa = if scale >= self.scale {
            pow10(scale - self.scale)
                .and_then(|factor| self.mantissa.checked_mul(factor))
                .ok_or_else(overflow)?
        } else {
            let factor = pow10(self.scale - scale).ok_or_else(overflow)?;
            if self.mantissa % factor != 0 {
                return Err(Error::encode(format!(
                    "{self} has more than {scale} fractional digits"
                )));
            }
            self.mantissa / factor
        };
        Decimal::new(mantissa, precision, scale).map_err(|_| overflow())
    }

    /// Lossy conversion, for display or arithmetic outside the database.
    #[expect(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(i32::from(self.scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = usize::from(self.scale);
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let digits = format!("{digits:0>width$}", width = scale + 1);
        let (int, frac) = digits.split_at(digits.len() - scale);
        write!(f, "{sign}{int}.{frac}")
    }
}

impl FromStr for Decimal {
    type Err = Error;

    /// Parses `[-+]digits[.digits]`; precision is the number of digits written.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::encode(format!("invalid decimal literal '{s}'"));
        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let int = int.trim_start_matches('0');
        let digits = int.len() + frac.len();
        if digits > usize::from(MAX_DECIMAL_PRECISION) {
            return Err(Error::encode(format!("decimal literal '{s}' exceeds 38 digits")));
        }
        let mut mantissa = format!("{int}{frac}").parse::<i128>().unwrap_or(0);
        if negative {
            mantissa = -mantissa;
        }
        let scale = u8::try_from(frac.len()).map_err(|_| invalid())?;
        let precision = u8::try_from(digits.max(1)).map_err(|_| invalid())?.max(scale).max(1);
        Decimal::new(mantissa, precision, scale)
    }
}

#[cfg(feature = "rust_decimal")]
impl From<rust_decimal::Decimal> for Decimal {
    fn from(value: rust_decimal::Decimal) -> Self {
        #[expect(clippy::cast_possible_truncation)]
        let scale = value.scale() as u8;
        Decimal { mantissa: value.mantissa(), precision: MAX_DECIMAL_PRECISION, scale }
    }
}

#[cfg(feature = "rust_decimal")]
impl TryFrom<Decimal> for rust_decimal::Decimal {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        rust_decimal::Decimal::try_from_i128_with_scale(value.mantissa, u32::from(value.scale))
            .map_err(|e| Error::decode(format!("{value} does not fit rust_decimal: {e}")))
    }
}
