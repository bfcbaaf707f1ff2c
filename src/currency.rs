use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub group_separator: String,
    pub decimal_separator: String,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self {
            symbol: "₱".to_string(),
            group_separator: ",".to_string(),
            decimal_separator: ".".to_string(),
        }
    }
}

impl CurrencyFormat {
    /// Minor units divided by 100, two decimals, thousands grouped.
    pub fn format_minor_units(&self, minor_units: u64) -> String {
        let whole = (minor_units / 100).to_string();
        let cents = minor_units % 100;

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (index, digit) in whole.chars().enumerate() {
            if index > 0 && (whole.len() - index) % 3 == 0 {
                grouped.push_str(&self.group_separator);
            }
            grouped.push(digit);
        }

        format!(
            "{}{}{}{:02}",
            self.symbol, grouped, self.decimal_separator, cents
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands_with_two_decimals() {
        let format = CurrencyFormat::default();
        assert_eq!(format.format_minor_units(0), "₱0.00");
        assert_eq!(format.format_minor_units(5), "₱0.05");
        assert_eq!(format.format_minor_units(100_000), "₱1,000.00");
        assert_eq!(format.format_minor_units(123_456_789), "₱1,234,567.89");
        assert_eq!(format.format_minor_units(99_999), "₱999.99");
    }

    #[test]
    fn honours_custom_separators() {
        let format = CurrencyFormat {
            symbol: "€ ".to_string(),
            group_separator: ".".to_string(),
            decimal_separator: ",".to_string(),
        };
        assert_eq!(format.format_minor_units(1_234_550), "€ 12.345,50");
    }
}
