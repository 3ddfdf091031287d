use rust_decimal::Decimal;

use crate::domain::offer::Priced;

/// Index of the last offer priced strictly below `budget`, or 0 when even
/// the cheapest offer is unaffordable. Offers must be price-ascending; the
/// scan stops at the first offer at or above the budget.
pub fn frontier_index<T: Priced>(offers: &[T], budget: Decimal) -> usize {
    offers.iter().take_while(|offer| offer.price() < budget).count().saturating_sub(1)
}

/// Half-open index range of the `count` offers centred on the budget
/// frontier, shifted inward when it would run past either end.
pub fn window_bounds<T: Priced>(
    offers: &[T],
    budget: Option<Decimal>,
    count: usize,
) -> std::ops::Range<usize> {
    let len = offers.len();
    if count == 0 || len == 0 {
        return 0..0;
    }
    if len <= count {
        return 0..len;
    }

    let Some(budget) = budget else {
        return 0..count;
    };

    let frontier = frontier_index(offers, budget);
    let lower = frontier.saturating_sub(count / 2);
    let upper = (frontier + count / 2 + count % 2).min(len);

    if upper - lower == count {
        lower..upper
    } else if lower == 0 {
        0..count
    } else {
        len - count..len
    }
}

/// Samples `count` representative offers around what the budget affords.
/// Without a budget the cheapest `count` offers are returned.
pub fn select_window<T: Priced + Clone>(
    offers: &[T],
    budget: Option<Decimal>,
    count: usize,
) -> Vec<T> {
    offers[window_bounds(offers, budget, count)].to_vec()
}
