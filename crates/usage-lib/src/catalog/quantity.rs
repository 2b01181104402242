//! Kubernetes quantity parsing
//!
//! Converts quantity strings such as `500m`, `2`, `1Gi` or `1e3` to their
//! integer value, rounding fractional results up. Arithmetic is exact: the
//! mantissa is kept as an integer with a decimal scale rather than a float.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::debug;

/// Integer value of a quantity, rounded up
///
/// Returns `None` when the string is not a valid non-negative quantity.
/// Values above `u64::MAX` saturate.
pub fn parse_quantity(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let number = number.strip_prefix('+').unwrap_or(number);

    let (mantissa, scale) = parse_decimal(number)?;
    let (binary_pow, decimal_exp) = parse_suffix(suffix)?;

    let mut value = mantissa;
    for _ in 0..binary_pow {
        value = value.saturating_mul(1024);
    }

    let exp = decimal_exp.saturating_add(scale);
    let value = if exp >= 0 {
        match 10u128.checked_pow(exp.unsigned_abs()).and_then(|m| value.checked_mul(m)) {
            Some(v) => v,
            None if value == 0 => 0,
            None => u128::MAX,
        }
    } else {
        match 10u128.checked_pow(exp.unsigned_abs()) {
            Some(divisor) => value.div_ceil(divisor),
            // Anything non-zero this small still rounds up to one
            None => u128::from(value != 0),
        }
    };

    Some(u64::try_from(value).unwrap_or(u64::MAX))
}

/// Integer value of a quantity, zero when it cannot be parsed
pub fn quantity_value(quantity: &Quantity) -> u64 {
    match parse_quantity(&quantity.0) {
        Some(value) => value,
        None => {
            debug!(quantity = %quantity.0, "Unparseable quantity, treating as zero");
            0
        }
    }
}

/// Split `12.50` into mantissa 1250 and power-of-ten scale -2
///
/// Whole digits past the range of u128 are dropped and counted in the scale,
/// with the mantissa bumped up when a dropped digit is non-zero.
fn parse_decimal(number: &str) -> Option<(u128, i32)> {
    let (whole, frac) = match number.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (number, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut mantissa: u128 = 0;
    let mut scale: i32 = 0;
    let mut truncated = false;
    for c in whole.chars() {
        if scale > 0 {
            scale = scale.saturating_add(1);
            truncated |= c != '0';
            continue;
        }
        match mantissa.checked_mul(10).and_then(|m| m.checked_add(digit(c))) {
            Some(next) => mantissa = next,
            None => {
                scale = 1;
                truncated = c != '0';
            }
        }
    }
    if scale > 0 {
        let bump = u128::from(truncated || frac.chars().any(|c| c != '0'));
        return Some((mantissa.saturating_add(bump), scale));
    }

    for c in frac.chars() {
        // Precision beyond u128 is dropped
        let Some(next) = mantissa.checked_mul(10).and_then(|m| m.checked_add(digit(c))) else {
            break;
        };
        mantissa = next;
        scale -= 1;
    }

    Some((mantissa, scale))
}

fn digit(c: char) -> u128 {
    u128::from(c as u8 - b'0')
}

/// Returns (power of 1024, power of 10) for a suffix
fn parse_suffix(suffix: &str) -> Option<(u32, i32)> {
    let parsed = match suffix {
        "" => (0, 0),
        "Ki" => (1, 0),
        "Mi" => (2, 0),
        "Gi" => (3, 0),
        "Ti" => (4, 0),
        "Pi" => (5, 0),
        "Ei" => (6, 0),
        "n" => (0, -9),
        "u" => (0, -6),
        "m" => (0, -3),
        "k" => (0, 3),
        "M" => (0, 6),
        "G" => (0, 9),
        "T" => (0, 12),
        "P" => (0, 15),
        "E" => (0, 18),
        _ => {
            let exp = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            if exp.is_empty() {
                return None;
            }
            (0, exp.parse::<i32>().ok()?)
        }
    };
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_integers() {
        assert_eq!(parse_quantity("0"), Some(0));
        assert_eq!(parse_quantity("2"), Some(2));
        assert_eq!(parse_quantity("128974848"), Some(128_974_848));
    }

    #[test]
    fn test_millicores_round_up() {
        assert_eq!(parse_quantity("500m"), Some(1));
        assert_eq!(parse_quantity("1500m"), Some(2));
        assert_eq!(parse_quantity("2000m"), Some(2));
        assert_eq!(parse_quantity("0.1"), Some(1));
        assert_eq!(parse_quantity("250u"), Some(1));
    }

    #[test]
    fn test_binary_suffixes() {
        assert_eq!(parse_quantity("1Ki"), Some(1024));
        assert_eq!(parse_quantity("1Gi"), Some(1_073_741_824));
        assert_eq!(parse_quantity("1.5Gi"), Some(1_610_612_736));
        assert_eq!(parse_quantity("129Mi"), Some(135_266_304));
    }

    #[test]
    fn test_decimal_suffixes_and_exponents() {
        assert_eq!(parse_quantity("1.5k"), Some(1500));
        assert_eq!(parse_quantity("128M"), Some(128_000_000));
        assert_eq!(parse_quantity("1.1G"), Some(1_100_000_000));
        assert_eq!(parse_quantity("1e3"), Some(1000));
        assert_eq!(parse_quantity("12E-1"), Some(2));
    }

    #[test]
    fn test_invalid_quantities() {
        assert_eq!(parse_quantity(""), None);
        assert_eq!(parse_quantity("Gi"), None);
        assert_eq!(parse_quantity("-1"), None);
        assert_eq!(parse_quantity("1Zi"), None);
        assert_eq!(parse_quantity("1e"), None);
        assert_eq!(quantity_value(&Quantity("lots".to_string())), 0);
    }

    #[test]
    fn test_saturates_on_overflow() {
        assert_eq!(parse_quantity("100E"), Some(u64::MAX));
        assert_eq!(parse_quantity("1e40"), Some(u64::MAX));
    }

    #[test]
    fn test_oversized_mantissa_saturates_instead_of_failing() {
        let huge = format!("1{}", "0".repeat(39));
        assert_eq!(parse_quantity(&huge), Some(u64::MAX));
        assert_eq!(parse_quantity("1000000000000000000000Ei"), Some(u64::MAX));
        assert_eq!(quantity_value(&Quantity(huge)), u64::MAX);
    }

    #[test]
    fn test_oversized_mantissa_keeps_its_magnitude() {
        // 1e40 * 1e-30
        let scaled = format!("1{}e-30", "0".repeat(40));
        assert_eq!(parse_quantity(&scaled), Some(10_000_000_000));
    }
}
