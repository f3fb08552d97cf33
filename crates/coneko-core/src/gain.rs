//! Decibel / linear gain conversion.

/// Levels at or below this are treated as silence.
pub const MINUS_INFINITY_DB: f32 = -100.0;

/// Convert decibels to a linear gain factor. Returns 0 at or below
/// [`MINUS_INFINITY_DB`].
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    if db > MINUS_INFINITY_DB {
        10.0_f32.powf(db * 0.05)
    } else {
        0.0
    }
}

/// Convert a linear gain factor to decibels, floored at [`MINUS_INFINITY_DB`].
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(MINUS_INFINITY_DB)
    } else {
        MINUS_INFINITY_DB
    }
}
