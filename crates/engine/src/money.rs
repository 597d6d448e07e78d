use std::{
    fmt,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use crate::ShiftError;

/// Signed money amount represented as **integer centavos**.
///
/// Use this type for **all** monetary values crossing the engine boundary
/// (ride fares, expense values, settlement figures) to avoid floating-point
/// drift in the revenue split.
///
/// # Examples
///
/// ```rust
/// use engine::Centavos;
///
/// let amount = Centavos::new(12_34);
/// assert_eq!(amount.centavos(), 1234);
/// assert_eq!(amount.to_string(), "R$ 12,34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator; rejects
/// more than 2 decimals):
///
/// ```rust
/// use engine::Centavos;
///
/// assert_eq!("10".parse::<Centavos>().unwrap().centavos(), 1000);
/// assert_eq!("10,5".parse::<Centavos>().unwrap().centavos(), 1050);
/// assert!("12.345".parse::<Centavos>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Centavos(i64);

impl Centavos {
    pub const ZERO: Centavos = Centavos(0);

    /// Creates a new amount from integer centavos.
    #[must_use]
    pub const fn new(centavos: i64) -> Self {
        Self(centavos)
    }

    /// Returns the raw value in centavos.
    #[must_use]
    pub const fn centavos(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is 0.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

/// Splits `amount` by a share expressed in basis points (1/100 of a
/// percent; 10_000 bp = 100%), rounding half away from zero to the nearest
/// centavo.
///
/// This is the single rounding rule of the settlement: callers that need a
/// complementary share take the remainder instead of rounding twice, so the
/// two parts always add back to `amount`.
pub(crate) fn split_basis_points(amount: i64, basis_points: i64) -> i64 {
    let product = i128::from(amount) * i128::from(basis_points);
    let rounded = if product >= 0 {
        (product + 5_000) / 10_000
    } else {
        (product - 5_000) / 10_000
    };
    rounded as i64
}

impl fmt::Display for Centavos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let reais = abs / 100;
        let centavos = abs % 100;
        write!(f, "R$ {sign}{reais},{centavos:02}")
    }
}

impl From<i64> for Centavos {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Centavos> for i64 {
    fn from(value: Centavos) -> Self {
        value.0
    }
}

impl Add for Centavos {
    type Output = Centavos;

    fn add(self, rhs: Centavos) -> Self::Output {
        Centavos(self.0 + rhs.0)
    }
}

impl AddAssign for Centavos {
    fn add_assign(&mut self, rhs: Centavos) {
        self.0 += rhs.0;
    }
}

impl Sub for Centavos {
    type Output = Centavos;

    fn sub(self, rhs: Centavos) -> Self::Output {
        Centavos(self.0 - rhs.0)
    }
}

impl SubAssign for Centavos {
    fn sub_assign(&mut self, rhs: Centavos) {
        self.0 -= rhs.0;
    }
}

impl Neg for Centavos {
    type Output = Centavos;

    fn neg(self) -> Self::Output {
        Centavos(-self.0)
    }
}

impl FromStr for Centavos {
    type Err = ShiftError;

    /// Parses a decimal string into centavos.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading
    /// `+`/`-`.
    ///
    /// Validation rules:
    /// - max 2 fractional digits (rejects `12.345`)
    /// - rejects empty/invalid strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || ShiftError::InvalidField("valor vazio".to_string());
        let invalid = || ShiftError::InvalidField("valor inválido".to_string());
        let overflow = || ShiftError::InvalidField("valor grande demais".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let (sign, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (-1i64, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (1i64, stripped)
        } else {
            (1i64, trimmed)
        };

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(empty());
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let reais_str = parts.next().ok_or_else(invalid)?;
        let centavos_str = parts.next();

        if parts.next().is_some() {
            return Err(invalid());
        }

        if reais_str.is_empty() || !reais_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let reais: i64 = reais_str.parse().map_err(|_| invalid())?;

        let centavos: i64 = match centavos_str {
            None => 0,
            Some("") => 0,
            Some(frac) => {
                if !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid());
                }
                match frac.len() {
                    0 => 0,
                    1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
                    2 => frac.parse::<i64>().map_err(|_| invalid())?,
                    _ => {
                        return Err(ShiftError::InvalidField(
                            "mais de duas casas decimais".to_string(),
                        ));
                    }
                }
            }
        };

        let total = reais
            .checked_mul(100)
            .and_then(|v| v.checked_add(centavos))
            .ok_or_else(overflow)?;

        let signed = if sign < 0 {
            total.checked_neg().ok_or_else(overflow)?
        } else {
            total
        };

        Ok(Centavos(signed))
    }
}
