//! # Money Types
//!
//! Currency and price handling. Every amount is stored in the smallest
//! currency unit so that deposit + balance always adds back to the total.

use serde::{Deserialize, Serialize};

/// Currencies a studio can charge in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    ZAR,
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
}

impl Currency {
    const ALL: [Currency; 7] = [
        Currency::ZAR,
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
        Currency::JPY,
        Currency::CAD,
        Currency::AUD,
    ];

    /// Lowercase code as the payment gateway expects it
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::ZAR => "zar",
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::JPY => "jpy",
            Currency::CAD => "cad",
            Currency::AUD => "aud",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL.into_iter().find(|c| c.as_str().eq_ignore_ascii_case(code))
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::ZAR => "R",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CAD => "C$",
            Currency::AUD => "A$",
        }
    }

    /// Minor units in one major unit (yen has none)
    pub fn minor_per_major(&self) -> i64 {
        match self {
            Currency::JPY => 1,
            _ => 100,
        }
    }

    pub fn to_minor(&self, major: f64) -> i64 {
        (major * self.minor_per_major() as f64).round() as i64
    }

    pub fn to_major(&self, minor: i64) -> f64 {
        minor as f64 / self.minor_per_major() as f64
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

/// An amount in minor units plus its currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Minor units (cents for ZAR)
    pub amount: i64,
    pub currency: Currency,
}

impl Price {
    /// From a major-unit amount such as a sheet cell (`450.00`)
    pub fn new(amount: f64, currency: Currency) -> Self {
        Self {
            amount: currency.to_minor(amount),
            currency,
        }
    }

    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::from_minor(0, currency)
    }

    /// Major units, for JSON responses and sheet cells
    pub fn as_decimal(&self) -> f64 {
        self.currency.to_major(self.amount)
    }

    /// Sum two prices; the currency of `self` wins
    pub fn plus(&self, other: Price) -> Price {
        Price::from_minor(self.amount.saturating_add(other.amount), self.currency)
    }

    /// Human form for notifications, e.g. `R450.00`
    pub fn display(&self) -> String {
        let decimals = if self.currency.minor_per_major() == 1 { 0 } else { 2 };
        format!("{}{:.*}", self.currency.symbol(), decimals, self.as_decimal())
    }
}

/// Deposit/balance split of a booking total.
///
/// The balance is always derived as `total - deposit`, so the two halves
/// add back to the total exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSplit {
    pub total: Price,
    pub deposit: Price,
    pub balance: Price,
}

impl DepositSplit {
    /// Split `total` with `percent` (clamped to 0..=100) taken as deposit.
    /// The deposit is rounded half-up to the smallest currency unit.
    pub fn compute(total: Price, percent: f64) -> Self {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let basis_points = (percent * 100.0).round() as i128;
        let total_amount = total.amount.max(0);
        // Widened so the product cannot overflow; the quotient is <= total
        let deposit = (i128::from(total_amount) * basis_points + 5_000) / 10_000;
        let deposit = i64::try_from(deposit).unwrap_or(total_amount).min(total_amount);

        Self {
            total: Price::from_minor(total_amount, total.currency),
            deposit: Price::from_minor(deposit, total.currency),
            balance: Price::from_minor(total_amount - deposit, total.currency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(Currency::ZAR.to_minor(10.99), 1099);
        assert_eq!(Currency::ZAR.to_major(1099), 10.99);
        assert_eq!(Currency::JPY.to_minor(1000.0), 1000);
        assert_eq!(Currency::default(), Currency::ZAR);
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("ZAR"), Some(Currency::ZAR));
        assert_eq!(Currency::parse(" usd "), Some(Currency::USD));
        assert_eq!(Currency::parse("doge"), None);
    }

    #[test]
    fn test_display_for_notifications() {
        assert_eq!(Price::new(450.0, Currency::ZAR).display(), "R450.00");
        assert_eq!(Price::from_minor(1250, Currency::JPY).display(), "¥1250");
    }

    #[test]
    fn test_fifty_percent_split_of_one_thousand() {
        let total = Price::new(450.0, Currency::ZAR).plus(Price::new(550.0, Currency::ZAR));
        let split = DepositSplit::compute(total, 50.0);

        assert_eq!(split.deposit.amount, 50_000);
        assert_eq!(split.balance.amount, 50_000);
        assert_eq!(split.deposit.as_decimal(), 500.0);
        assert_eq!(split.deposit.amount + split.balance.amount, split.total.amount);
    }

    #[test]
    fn test_split_adds_back_to_total_with_odd_amounts() {
        for (amount, percent) in [(1, 50.0), (333, 33.3), (99_999, 12.5), (10_001, 70.0), (7, 0.0)] {
            let split = DepositSplit::compute(Price::from_minor(amount, Currency::ZAR), percent);
            assert_eq!(split.deposit.amount + split.balance.amount, amount);
            assert!(split.deposit.amount >= 0 && split.balance.amount >= 0);
        }
    }

    #[test]
    fn test_split_of_extreme_totals_stays_balanced() {
        let total = Price::from_minor(i64::MAX, Currency::ZAR).plus(Price::from_minor(500, Currency::ZAR));
        assert_eq!(total.amount, i64::MAX);

        let split = DepositSplit::compute(total, 50.0);
        assert!(split.deposit.amount > 0 && split.balance.amount > 0);
        assert_eq!(split.deposit.amount + split.balance.amount, i64::MAX);
    }

    #[test]
    fn test_split_clamps_percent() {
        let total = Price::from_minor(1_000, Currency::ZAR);
        assert_eq!(DepositSplit::compute(total, 150.0).balance.amount, 0);
        assert_eq!(DepositSplit::compute(total, -5.0).deposit.amount, 0);
        assert_eq!(DepositSplit::compute(total, f64::NAN).deposit.amount, 0);
    }
}
