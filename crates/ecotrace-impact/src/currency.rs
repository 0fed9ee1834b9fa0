//! Conversion of billed amounts to SEK.
//!
//! USD uses a caller-adjustable override rate rather than the static table.
//! Currencies missing from the table convert 1:1; that fallback is lossy and
//! intentionally kept, so a debug event is emitted each time it applies.

use std::collections::BTreeMap;

use ecotrace_config::ImpactConfig;
use tracing::debug;

/// EUR rate used when the table has no EUR entry.
pub const DEFAULT_EUR_RATE: f64 = 11.5;

/// Canonical form of a currency code, used for both rows and table keys.
pub fn normalize_code(currency: &str) -> String {
    currency.trim().to_uppercase()
}

fn lookup(table: &BTreeMap<String, f64>, code: &str) -> Option<f64> {
    table
        .get(code)
        .or_else(|| {
            table
                .iter()
                .find(|(key, _)| normalize_code(key) == code)
                .map(|(_, rate)| rate)
        })
        .copied()
}

/// Convert `amount` in `currency` to SEK.
///
/// Currency codes are matched case-insensitively, in `currency` and in the
/// table keys alike.
pub fn convert_to_sek(
    amount: f64,
    currency: &str,
    usd_rate_override: f64,
    table: &BTreeMap<String, f64>,
) -> f64 {
    let code = normalize_code(currency);
    match code.as_str() {
        "SEK" => amount,
        "USD" => amount * usd_rate_override,
        "EUR" => amount * lookup(table, "EUR").unwrap_or(DEFAULT_EUR_RATE),
        _ => match lookup(table, &code) {
            Some(rate) => amount * rate,
            None => {
                debug!(currency = %code, "no exchange rate, converting 1:1");
                amount
            }
        },
    }
}

/// Converter holding the rate table for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyConverter {
    rates: BTreeMap<String, f64>,
    usd_rate: f64,
}

impl CurrencyConverter {
    /// Table keys are normalised to upper case.
    pub fn new(rates: BTreeMap<String, f64>, usd_rate: f64) -> Self {
        let rates = rates
            .into_iter()
            .map(|(code, rate)| (normalize_code(&code), rate))
            .collect();
        Self { rates, usd_rate }
    }

    pub fn from_config(config: &ImpactConfig) -> Self {
        Self::new(config.exchange_rates.clone(), config.usd_rate)
    }

    /// Replace the USD override rate.
    pub fn with_usd_rate(mut self, usd_rate: f64) -> Self {
        self.usd_rate = usd_rate;
        self
    }

    pub fn usd_rate(&self) -> f64 {
        self.usd_rate
    }

    pub fn to_sek(&self, amount: f64, currency: &str) -> f64 {
        convert_to_sek(amount, currency, self.usd_rate, &self.rates)
    }
}

impl Default for CurrencyConverter {
    fn default() -> Self {
        Self::from_config(&ImpactConfig::default())
    }
}
