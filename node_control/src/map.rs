/// Re-maps `value` from `in_min..in_max` onto `out_min..out_max`, like Arduino's `map`.
///
/// Integer math, truncates toward zero and does not clamp. A degenerate input range maps
/// everything to `out_min`.
pub fn map_range(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    if in_min == in_max {
        return out_min;
    }
    let scaled = (value as i64 - in_min as i64) * (out_max as i64 - out_min as i64)
        / (in_max as i64 - in_min as i64);
    (scaled + out_min as i64) as i32
}

/// [map_range] onto `0..=100`, clamped.
pub fn to_percent(raw: u16, min_raw: u16, max_raw: u16) -> u8 {
    map_range(raw as i32, min_raw as i32, max_raw as i32, 0, 100).clamp(0, 100) as u8
}
