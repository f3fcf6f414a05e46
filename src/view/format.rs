//! Number formatting for popup text, following the browser conventions the
//! web map relies on (`en-US` grouping, `Math.round`, `toFixed`).

/// Fraction digits printed beyond the requested precision before rounding,
/// enough to decide ties exactly for any double of practical magnitude.
const EXACT_DIGITS: usize = 30;

/// Inserts `,` between groups of three digits of an unsigned digit string.
fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

pub fn group_thousands(value: u64) -> String {
    group_digits(&value.to_string())
}

/// Rounds to the nearest integer with ties towards positive infinity.
pub fn round_half_up(value: f64) -> f64 {
    let floor = value.floor();
    if value - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

/// Rounds half up and groups thousands, e.g. `1234.6` gives `"1,235"`.
pub fn group_rounded(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = round_half_up(value);
    let digits = format!("{:.0}", rounded.abs());
    if rounded < 0.0 {
        format!("-{}", group_digits(&digits))
    } else {
        group_digits(&digits)
    }
}

/// Fixed-point notation with `fraction_digits` decimals. Ties on the exact
/// binary value round away from zero, so `0.125` prints as `0.13` while
/// `1.005` (stored as 1.00499...) prints as `1.00`.
pub fn to_fixed(value: f64, fraction_digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let exact = format!("{:.*}", fraction_digits + EXACT_DIGITS, value.abs());
    let (int_part, fraction) = exact.split_once('.').unwrap_or((exact.as_str(), ""));

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(fraction.bytes().take(fraction_digits))
        .map(|b| b - b'0')
        .collect();
    let round_up = fraction.as_bytes().get(fraction_digits).is_some_and(|b| *b >= b'5');
    if round_up {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == 9 {
                *digit = 0;
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, 1);
        }
    }

    let int_len = digits.len() - fraction_digits;
    let mut out = String::with_capacity(digits.len() + 2);
    if value < 0.0 {
        out.push('-');
    }
    for (i, digit) in digits.iter().enumerate() {
        if i == int_len {
            out.push('.');
        }
        out.push(char::from(b'0' + digit));
    }
    out
}
