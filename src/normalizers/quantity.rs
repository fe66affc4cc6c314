//! Canonical formatting of resource quantities.
//!
//! Quantities keep the family of their suffix: binary suffixes (`Ki`..`Ei`)
//! stay binary while the value is a whole multiple of 1024, decimal suffixes
//! pick the largest SI suffix that keeps the mantissa integral, and
//! exponent notation stays exponent notation. Values below 1n round up.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    BinarySI,
    DecimalSI,
    DecimalExponent,
}

const DECIMAL_SUFFIXES: [(&str, i32); 10] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

const BINARY_SUFFIXES: [(&str, u32); 7] = [
    ("", 0),
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

/// An exact quantity: `mantissa * 10^exponent`, optionally negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decimal {
    negative: bool,
    mantissa: u128,
    exponent: i32,
}

fn pow10(n: u32) -> Option<u128> {
    10u128.checked_pow(n)
}

impl Decimal {
    fn normalize(mut self) -> Self {
        if self.mantissa == 0 {
            return Decimal {
                negative: false,
                mantissa: 0,
                exponent: 0,
            };
        }
        while self.mantissa % 10 == 0 {
            self.mantissa /= 10;
            self.exponent += 1;
        }
        self
    }

    // Rounds away from zero to a multiple of 10^-9.
    fn round_up_to_nano(self) -> Option<Self> {
        if self.exponent >= -9 {
            return Some(self);
        }
        let divisor = pow10((-9 - self.exponent) as u32)?;
        let mut mantissa = self.mantissa / divisor;
        if self.mantissa % divisor != 0 {
            mantissa += 1;
        }
        Some(
            Decimal {
                negative: self.negative,
                mantissa,
                exponent: -9,
            }
            .normalize(),
        )
    }

    fn as_integer(self) -> Option<u128> {
        if self.exponent < 0 {
            return None;
        }
        self.mantissa.checked_mul(pow10(self.exponent as u32)?)
    }

    /// Lowers the exponent to a multiple of three.
    fn align(mut self) -> Option<Self> {
        while self.exponent.rem_euclid(3) != 0 {
            self.mantissa = self.mantissa.checked_mul(10)?;
            self.exponent -= 1;
        }
        Some(self)
    }
}

fn parse(s: &str) -> Option<(Decimal, Format)> {
    let s = s.trim();
    let (negative, rest) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let number_end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_end);
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let digits = format!("{}{}", int_part, frac_part);
    let mantissa: u128 = digits.parse().ok()?;
    let mut exponent = -(frac_part.len() as i32);

    let format = if let Some(&(_, power)) = BINARY_SUFFIXES.iter().find(|(sfx, _)| !sfx.is_empty() && *sfx == suffix) {
        let factor = 1024u128.checked_pow(power)?;
        return Some((
            Decimal {
                negative,
                mantissa: mantissa.checked_mul(factor)?,
                exponent,
            }
            .normalize(),
            Format::BinarySI,
        ));
    } else if let Some(&(_, power)) = DECIMAL_SUFFIXES.iter().find(|(sfx, _)| *sfx == suffix) {
        exponent += power;
        Format::DecimalSI
    } else if let Some(exp) = suffix.strip_prefix(['e', 'E']) {
        exponent += exp.parse::<i32>().ok()?;
        Format::DecimalExponent
    } else {
        return None;
    };

    Some((
        Decimal {
            negative,
            mantissa,
            exponent,
        }
        .normalize(),
        format,
    ))
}

/// Returns the canonical form of a quantity string, or `None` when it is
/// not a valid quantity.
///
/// `"1.25G"` becomes `"1250M"`, `"0.5"` becomes `"500m"` and `"0.5Gi"`
/// becomes `"512Mi"`.
pub fn canonical_quantity(s: &str) -> Option<String> {
    let (value, mut format) = parse(s)?;
    let value = value.round_up_to_nano()?;
    if value.mantissa == 0 {
        return Some("0".to_string());
    }
    let sign = if value.negative { "-" } else { "" };

    if format == Format::BinarySI {
        match value.as_integer() {
            Some(n) if n >= 1024 => {
                let mut number = n;
                let mut power = 0usize;
                while number % 1024 == 0 && power < BINARY_SUFFIXES.len() - 1 {
                    number /= 1024;
                    power += 1;
                }
                return Some(format!("{}{}{}", sign, number, BINARY_SUFFIXES[power].0));
            }
            _ => format = Format::DecimalSI,
        }
    }

    let mut aligned = value.align()?;
    if format == Format::DecimalExponent {
        if aligned.exponent == 0 {
            return Some(format!("{}{}", sign, aligned.mantissa));
        }
        return Some(format!("{}{}e{}", sign, aligned.mantissa, aligned.exponent));
    }

    if aligned.exponent > 18 {
        aligned.mantissa = aligned
            .mantissa
            .checked_mul(pow10((aligned.exponent - 18) as u32)?)?;
        aligned.exponent = 18;
    }
    let suffix = DECIMAL_SUFFIXES
        .iter()
        .find(|(_, power)| *power == aligned.exponent)
        .map(|(sfx, _)| *sfx)?;
    Some(format!("{}{}{}", sign, aligned.mantissa, suffix))
}
