//! 16-bit fixed-point distances at centimetre resolution.
//!
//! A distance `f` (world units, metres) is stored as `round(f * 100)` in a
//! `u16`, so the representable range is `[0, 655.35]`. Inputs outside that
//! range saturate: negative values (and NaN) become `0`, large values become
//! `u16::MAX`.

/// Number of fixed-point steps per world unit.
pub const DISTANCE_SCALE: f32 = 100.0;

/// Largest distance that survives encoding without saturating.
pub const MAX_ENCODED_DISTANCE: f32 = u16::MAX as f32 / DISTANCE_SCALE;

/// Encode a distance, rounding up to the next centimetre.
///
/// Use this when the encoded value acts as a lower bound that must not shrink,
/// e.g. a movement grace margin added to a cull distance.
pub fn encode_ceil(f: f32) -> u16 {
    if f >= MAX_ENCODED_DISTANCE {
        return u16::MAX;
    }
    saturate((f * DISTANCE_SCALE).ceil())
}

/// Encode a distance, rounding down to the previous centimetre.
pub fn encode_floor(f: f32) -> u16 {
    // `655.35 * 100.0` is 65534.996 in f32.
    if f >= MAX_ENCODED_DISTANCE {
        return u16::MAX;
    }
    saturate((f * DISTANCE_SCALE).floor())
}

/// Decode a fixed-point distance back to world units.
pub fn decode_distance(encoded: u16) -> f32 {
    f32::from(encoded) / DISTANCE_SCALE
}

fn saturate(scaled: f32) -> u16 {
    // `as` maps NaN to 0 and clamps out-of-range floats.
    scaled.clamp(0.0, u16::MAX as f32) as u16
}
