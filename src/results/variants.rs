//! Display-only price variants.
//!
//! Each call draws fresh randomness from the caller's RNG. Values are not
//! reproducible and must never be compared against fixed expectations.

use super::sorting::price_key;
use rand::Rng;

/// Maximum relative deviation from the base price.
pub const VARIANT_SPREAD: f64 = 0.2;

/// `base * (1 + U)` with `U` uniform on `[-VARIANT_SPREAD, VARIANT_SPREAD]`.
pub fn synthesize_variant<R: Rng + ?Sized>(base: f64, rng: &mut R) -> f64 {
    base * (1.0 + rng.gen_range(-VARIANT_SPREAD..=VARIANT_SPREAD))
}

/// Variant of a price cell, based on its first component.
pub fn variant_for_price<R: Rng + ?Sized>(price: &str, rng: &mut R) -> Option<f64> {
    price_key(price).map(|base| synthesize_variant(base, rng))
}
