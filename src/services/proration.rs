//! Prorated upgrade pricing in integer cents.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proration {
    /// Value of the unused part of the current period.
    pub credit_cents: i64,
    /// Amount to charge now; never negative.
    pub charge_cents: i64,
}

/// `a / b` rounded half away from zero. `b` must be positive.
fn div_round(a: i128, b: i128) -> i128 {
    if a >= 0 {
        (a + b / 2) / b
    } else {
        -((-a + b / 2) / b)
    }
}

/// Credits the unused share of `current_price_cents` and charges the rest of
/// `target_price_cents`.
///
/// `unused = max(0, period_end - now) / (period_end - period_start)`; a
/// degenerate period gives no credit. The charge is computed from the exact
/// ratio and rounded once to the cent, then clamped at zero.
pub fn compute(
    current_price_cents: i64,
    target_price_cents: i64,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Proration {
    let total = (period_end - period_start).num_milliseconds() as i128;
    if total <= 0 {
        return Proration {
            credit_cents: 0,
            charge_cents: target_price_cents.max(0),
        };
    }
    let remaining = ((period_end - now).num_milliseconds() as i128).clamp(0, total);
    let current = current_price_cents as i128;
    let target = target_price_cents as i128;

    let credit = div_round(current * remaining, total);
    let charge = div_round(target * total - current * remaining, total).max(0);

    Proration {
        credit_cents: credit as i64,
        charge_cents: charge as i64,
    }
}
