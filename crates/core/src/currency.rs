use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};

/// Exchange rates against a common base, keyed by upper-case currency code.
/// Injected from configuration; the engine never mutates it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateTable {
    rates: BTreeMap<String, Decimal>,
}

impl RateTable {
    pub fn new(rates: BTreeMap<String, Decimal>) -> Self {
        let rates =
            rates.into_iter().map(|(code, rate)| (code.to_ascii_uppercase(), rate)).collect();
        Self { rates }
    }

    pub fn rate(&self, code: &str) -> Option<Decimal> {
        self.rates.get(&code.trim().to_ascii_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl FromIterator<(String, Decimal)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Convert `amount` from `source` to `target` for display and threshold
/// evaluation. Fail-open: a missing or unusable rate returns the amount
/// unconverted with a diagnostic, so an approver's view is never blocked on
/// a rate-table gap. Result is rounded half-away-from-zero to 2 decimals.
pub fn convert(amount: Decimal, source: &str, target: &str, table: &RateTable) -> Decimal {
    let source_code = source.trim().to_ascii_uppercase();
    let target_code = target.trim().to_ascii_uppercase();

    if source_code == target_code {
        return amount;
    }

    let Some(source_rate) = table.rate(&source_code) else {
        tracing::warn!(
            source = %source_code,
            target = %target_code,
            "no exchange rate for source currency; returning amount unconverted"
        );
        return amount;
    };
    let Some(target_rate) = table.rate(&target_code) else {
        tracing::warn!(
            source = %source_code,
            target = %target_code,
            "no exchange rate for target currency; returning amount unconverted"
        );
        return amount;
    };
    if source_rate.is_zero() {
        tracing::warn!(
            source = %source_code,
            "zero exchange rate for source currency; returning amount unconverted"
        );
        return amount;
    }

    (amount / source_rate * target_rate)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::{convert, RateTable};

    fn table() -> RateTable {
        RateTable::new(BTreeMap::from([
            ("USD".to_string(), Decimal::ONE),
            ("EUR".to_string(), Decimal::new(93, 2)),
            ("INR".to_string(), Decimal::new(83_25, 2)),
        ]))
    }

    #[test]
    fn converts_between_known_currencies() {
        // 100 / 0.93 * 1.0 = 107.5268... -> 107.53
        let converted = convert(Decimal::from(100), "EUR", "USD", &table());
        assert_eq!(converted, Decimal::new(107_53, 2));
    }

    #[test]
    fn identical_currencies_pass_through() {
        let amount = Decimal::new(49_99, 2);
        assert_eq!(convert(amount, "USD", "usd", &table()), amount);
    }

    #[test]
    fn unknown_source_currency_fails_open() {
        let amount = Decimal::from(50);
        assert_eq!(convert(amount, "XYZ", "USD", &table()), amount);
    }

    #[test]
    fn unknown_target_currency_fails_open() {
        let amount = Decimal::from(50);
        assert_eq!(convert(amount, "USD", "XYZ", &table()), amount);
    }

    #[test]
    fn zero_source_rate_fails_open() {
        let table = RateTable::new(BTreeMap::from([
            ("USD".to_string(), Decimal::ONE),
            ("BAD".to_string(), Decimal::ZERO),
        ]));

        let amount = Decimal::from(10);
        assert_eq!(convert(amount, "BAD", "USD", &table), amount);
    }

    #[test]
    fn codes_are_case_insensitive() {
        let converted = convert(Decimal::from(100), "eur", "Usd", &table());
        assert_eq!(converted, Decimal::new(107_53, 2));
    }

    #[test]
    fn result_is_rounded_to_two_decimals() {
        // 10 / 83.25 * 1.0 = 0.120120... -> 0.12
        let converted = convert(Decimal::from(10), "INR", "USD", &table());
        assert_eq!(converted, Decimal::new(12, 2));
    }
}
