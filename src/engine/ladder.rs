//! Operations over one side of a book, ordered best-first.
//!
//! Shared by the single-venue `OrderBook` and the cross-venue `CombinedBook`,
//! which both keep their sides as plain best-first vectors of `PriceLevel`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use itertools::Itertools;
use rust_decimal::Decimal;
use serde::Serialize;
use smallvec::SmallVec;

use crate::engine::types::{Fill, MalformedLevelError, PriceLevel, RawLevel, Side, VenueId};

/// Turn an unordered raw side into a best-first ladder for `venue`.
///
/// Levels with a non-positive quantity are dropped. A price seen twice with the
/// same quantity collapses into one level; with different quantities the input is
/// ambiguous and rejected.
pub fn build(
    levels: impl IntoIterator<Item = RawLevel>,
    side: Side,
    venue: &VenueId,
) -> Result<Vec<PriceLevel>, MalformedLevelError> {
    let mut by_price: BTreeMap<Decimal, Decimal> = BTreeMap::new();

    for lvl in levels {
        if lvl.price <= Decimal::ZERO {
            return Err(MalformedLevelError::NonPositivePrice { side, price: lvl.price });
        }
        match by_price.entry(lvl.price) {
            Entry::Vacant(slot) => {
                slot.insert(lvl.quantity);
            }
            Entry::Occupied(slot) => {
                if *slot.get() != lvl.quantity {
                    return Err(MalformedLevelError::ConflictingQuantity {
                        side,
                        price: *slot.key(),
                        first: *slot.get(),
                        second: lvl.quantity,
                    });
                }
            }
        }
    }

    let live = by_price
        .into_iter()
        .filter(|(_, qty)| *qty > Decimal::ZERO)
        .map(|(price, quantity)| PriceLevel { price, quantity, venue: venue.clone() });

    Ok(match side {
        Side::Bid => live.rev().collect(),
        Side::Ask => live.collect(),
    })
}

/// Walk the ladder consuming `base_qty` units of the base asset.
pub fn fill_base(levels: &[PriceLevel], base_qty: Decimal) -> Option<Fill> {
    if base_qty <= Decimal::ZERO {
        return None;
    }
    let mut remaining = base_qty;
    let mut base = Decimal::ZERO;
    let mut quote = Decimal::ZERO;

    for lvl in levels {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(lvl.quantity);
        base += take;
        quote += take * lvl.price;
        remaining -= take;
    }

    finish(base, quote, !remaining.is_zero())
}

/// Walk the ladder spending `notional` units of the quote asset.
pub fn fill_quote(levels: &[PriceLevel], notional: Decimal) -> Option<Fill> {
    if notional <= Decimal::ZERO {
        return None;
    }
    let mut remaining = notional;
    let mut base = Decimal::ZERO;
    let mut quote = Decimal::ZERO;

    for lvl in levels {
        if remaining.is_zero() {
            break;
        }
        let level_notional = lvl.notional();
        if remaining >= level_notional {
            base += lvl.quantity;
            quote += level_notional;
            remaining -= level_notional;
        } else {
            base += remaining / lvl.price;
            quote += remaining;
            remaining = Decimal::ZERO;
        }
    }

    finish(base, quote, !remaining.is_zero())
}

fn finish(base: Decimal, quote: Decimal, exhausted: bool) -> Option<Fill> {
    if base.is_zero() {
        return None;
    }
    Some(Fill {
        average_price: (quote / base).normalize(),
        base_filled: base.normalize(),
        quote_filled: quote.normalize(),
        exhausted,
    })
}

/// Same-price liquidity summed across venues. A display view only: the venues that
/// contributed are listed so routing information is still recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NettedLevel {
    pub price: Decimal,
    pub quantity: Decimal,
    pub venues: SmallVec<[VenueId; 4]>,
}

/// Net adjacent equal-price levels and return the first `n` netted levels.
pub fn netted(levels: &[PriceLevel], n: usize) -> Vec<NettedLevel> {
    levels
        .iter()
        .chunk_by(|lvl| lvl.price)
        .into_iter()
        .take(n)
        .map(|(price, group)| {
            let mut quantity = Decimal::ZERO;
            let mut venues: SmallVec<[VenueId; 4]> = SmallVec::new();
            for lvl in group {
                quantity += lvl.quantity;
                if !venues.contains(&lvl.venue) {
                    venues.push(lvl.venue.clone());
                }
            }
            NettedLevel { price, quantity, venues }
        })
        .collect()
}

pub fn total_quantity(levels: &[PriceLevel]) -> Decimal {
    levels.iter().map(|lvl| lvl.quantity).sum()
}
