// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - CURRENCY CONVERTER
//
// Fixed-rate conversion between real-currency minor units and diamonds.
// Integer math only: partial diamonds are floored, never rounded up.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::CURRENCY_UNITS_PER_DIAMOND;

/// Currency minor units → diamonds, `floor(amount / RATE)`.
pub const fn to_diamonds(currency_amount: u64) -> u64 {
    currency_amount / CURRENCY_UNITS_PER_DIAMOND
}

/// Diamonds → currency minor units, `diamonds × RATE` (saturating).
pub const fn to_currency(diamonds: u64) -> u64 {
    diamonds.saturating_mul(CURRENCY_UNITS_PER_DIAMOND)
}
