//! Canonical formatting of `metav1.Duration` strings.

const NANOSECOND: u128 = 1;
const MICROSECOND: u128 = 1_000 * NANOSECOND;
const MILLISECOND: u128 = 1_000 * MICROSECOND;
const SECOND: u128 = 1_000 * MILLISECOND;
const MINUTE: u128 = 60 * SECOND;
const HOUR: u128 = 60 * MINUTE;

const UNITS: [(&str, u128); 8] = [
    ("ns", NANOSECOND),
    ("us", MICROSECOND),
    ("µs", MICROSECOND),
    ("μs", MICROSECOND),
    ("ms", MILLISECOND),
    ("s", SECOND),
    ("m", MINUTE),
    ("h", HOUR),
];

/// Parses a duration such as `"1h30m"` or `"-1.5s"` into signed nanoseconds.
fn parse(s: &str) -> Option<(bool, u128)> {
    let (negative, mut rest) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if rest == "0" {
        return Some((false, 0));
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        let scale = UNITS.iter().find(|(name, _)| *name == unit).map(|(_, n)| *n)?;

        let whole: u128 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
        total = total.checked_add(whole.checked_mul(scale)?)?;
        if !frac_part.is_empty() {
            let frac: u128 = frac_part.parse().ok()?;
            let denominator = 10u128.checked_pow(frac_part.len() as u32)?;
            total = total.checked_add(frac.checked_mul(scale)? / denominator)?;
        }
        rest = next;
    }
    Some((negative && total != 0, total))
}

// Formats v / 10^precision keeping only significant fractional digits.
fn format_fraction(v: u128, precision: u32) -> (String, u128) {
    let divisor = 10u128.pow(precision);
    let frac = v % divisor;
    if frac == 0 {
        return (String::new(), v / divisor);
    }
    let digits = format!("{:0width$}", frac, width = precision as usize);
    (format!(".{}", digits.trim_end_matches('0')), v / divisor)
}

fn format(negative: bool, nanos: u128) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }
    let sign = if negative { "-" } else { "" };

    if nanos < SECOND {
        let (precision, unit) = if nanos < MICROSECOND {
            (0, "ns")
        } else if nanos < MILLISECOND {
            (3, "µs")
        } else {
            (6, "ms")
        };
        let (frac, whole) = format_fraction(nanos, precision);
        return format!("{}{}{}{}", sign, whole, frac, unit);
    }

    let (frac, seconds) = format_fraction(nanos, 9);
    let mut out = format!("{}{}s", seconds % 60, frac);
    let minutes = seconds / 60;
    if minutes > 0 {
        out = format!("{}m{}", minutes % 60, out);
        let hours = minutes / 60;
        if hours > 0 {
            out = format!("{}h{}", hours, out);
        }
    }
    format!("{}{}", sign, out)
}

/// Returns the canonical form of a duration string, or `None` when it does
/// not parse.
///
/// `"8760h"` becomes `"8760h0m0s"` and `"90s"` becomes `"1m30s"`.
pub fn canonical_duration(s: &str) -> Option<String> {
    let (negative, nanos) = parse(s.trim())?;
    Some(format(negative, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_canonical_duration() {
        let cases = [
            ("8760h", "8760h0m0s"),
            ("90s", "1m30s"),
            ("1h", "1h0m0s"),
            ("30m", "30m0s"),
            ("1h90m", "2h30m0s"),
            ("1.5s", "1.5s"),
            ("0", "0s"),
            ("0s", "0s"),
            ("1500ms", "1.5s"),
            ("250ms", "250ms"),
            ("1500ns", "1.5µs"),
            ("10ns", "10ns"),
            ("-90s", "-1m30s"),
        ];
        for (input, want) in cases {
            assert_eq!(canonical_duration(input).as_deref(), Some(want), "{}", input);
        }
    }

    #[test]
    fn test_invalid_durations() {
        for s in ["", "1", "h", "1d", "1.2.3s", "-"] {
            assert_eq!(canonical_duration(s), None, "{}", s);
        }
    }
}
