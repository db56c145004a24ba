//! Lookup-table activations for the scoring network.
//!
//! Q10 tables sample `[-4.0, +4.0]` every 0.125 and interpolate linearly in
//! between; inputs outside that range saturate. The Q7 tanh covers the same
//! `[-4.0, +4.0]` (`[-512, 512]`) every 1/16 without interpolation, and the
//! Q7 output squashes through a straight line whose slope matches the
//! sigmoid at zero.

const Q10_TABLE_MIN: i32 = -4096;
const Q10_TABLE_STEP_SHIFT: u32 = 7;
const Q10_TABLE_LAST: usize = 64;

/// `tanh(x) * 1024` for `x = -4.0 + k / 8`.
const TANH_Q10: [i16; 65] = [
    -1023, -1023, -1023, -1023, -1022, -1022, -1021, -1020, -1019, -1018, -1016, -1013, -1010,
    -1006, -1001, -995, -987, -977, -964, -948, -927, -901, -869, -829, -780, -721,
    -650, -568, -473, -367, -251, -127, 0, 127, 251, 367, 473, 568, 650,
    721, 780, 829, 869, 901, 927, 948, 964, 977, 987, 995, 1001, 1006,
    1010, 1013, 1016, 1018, 1019, 1020, 1021, 1022, 1022, 1023, 1023, 1023, 1023,
];

/// `sigmoid(x) * 1024` for `x = -4.0 + k / 8`.
const SIGMOID_Q10: [i16; 65] = [
    18, 21, 24, 27, 30, 34, 38, 43, 49, 55, 62, 69, 78,
    87, 98, 109, 122, 136, 152, 168, 187, 207, 228, 251, 275, 301,
    329, 357, 387, 417, 448, 480, 512, 544, 576, 607, 637, 667, 695,
    723, 749, 773, 796, 817, 837, 856, 872, 888, 902, 915, 926, 937,
    946, 955, 962, 969, 975, 981, 986, 990, 994, 997, 1000, 1003, 1006,
];

/// `tanh(x / 128) * 127` for `x = -512 + 8k`.
const TANH_Q7: [i8; 129] = [
    -127, -127, -127, -127, -127, -127, -127, -127, -127, -127, -127, -127, -127, -127, -127, -126,
    -126, -126, -126, -126, -126, -126, -126, -125, -125, -125, -125, -125, -124, -124, -123, -123,
    -122, -122, -121, -120, -120, -119, -118, -116, -115, -113, -112, -110, -108, -105, -103, -100,
    -97, -93, -89, -85, -81, -76, -70, -65, -59, -52, -46, -38, -31, -24, -16, -8,
    0, 8, 16, 24, 31, 38, 46, 52, 59, 65, 70, 76, 81, 85, 89, 93,
    97, 100, 103, 105, 108, 110, 112, 113, 115, 116, 118, 119, 120, 120, 121, 122,
    122, 123, 123, 124, 124, 125, 125, 125, 125, 125, 126, 126, 126, 126, 126, 126,
    126, 126, 127, 127, 127, 127, 127, 127, 127, 127, 127, 127, 127, 127, 127, 127,
    127,
];

fn interpolate_q10(table: &[i16; 65], x: i32) -> i32 {
    let offset = x.saturating_sub(Q10_TABLE_MIN).max(0);
    let index = (offset >> Q10_TABLE_STEP_SHIFT) as usize;
    if index >= Q10_TABLE_LAST {
        return i32::from(table[Q10_TABLE_LAST]);
    }
    let frac = offset & ((1 << Q10_TABLE_STEP_SHIFT) - 1);
    let lo = i32::from(table[index]);
    let hi = i32::from(table[index + 1]);
    lo + (((hi - lo) * frac) >> Q10_TABLE_STEP_SHIFT)
}

/// Q10 tanh, output in `[-1023, 1023]`.
pub(crate) fn tanh_q10(x: i32) -> i16 {
    interpolate_q10(&TANH_Q10, x) as i16
}

/// Q10 sigmoid, output in `[0, 1024]`.
pub(crate) fn sigmoid_q10(x: i32) -> u16 {
    interpolate_q10(&SIGMOID_Q10, x).clamp(0, 1024) as u16
}

/// Q7 tanh, output in `[-127, 127]`.
pub(crate) fn tanh_q7(x: i32) -> i8 {
    let index = ((x.clamp(-512, 512) + 512) >> 3) as usize;
    TANH_Q7[index]
}

/// Linear sigmoid for the Q7 network: `0.5 + x / 4`, rescaled to `[0, 1024]`.
pub(crate) fn ramp_q7(x: i32) -> u16 {
    match x {
        ..=-256 => 0,
        256.. => 1024,
        _ => ((x + 256) << 1) as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tanh_is_odd_and_saturating() {
        assert_eq!(tanh_q10(0), 0);
        assert_eq!(tanh_q10(1024), 780);
        assert_eq!(tanh_q10(-1024), -780);
        assert_eq!(tanh_q10(i32::MAX), 1023);
        assert_eq!(tanh_q10(i32::MIN), -1023);
    }

    #[test]
    fn tables_are_monotonic() {
        for pair in TANH_Q10.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for pair in SIGMOID_Q10.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for pair in TANH_Q7.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn interpolates_between_entries() {
        // halfway between sigmoid(0) = 512 and sigmoid(0.125) = 544
        assert_eq!(sigmoid_q10(64), 528);
        let mut previous = sigmoid_q10(-5000);
        for x in (-5000..5000).step_by(17) {
            let y = sigmoid_q10(x);
            assert!(y >= previous);
            assert!(y <= 1024);
            previous = y;
        }
    }

    #[test]
    fn q7_helpers_cover_their_range() {
        assert_eq!(tanh_q7(0), 0);
        assert_eq!(tanh_q7(1_000), 127);
        assert_eq!(tanh_q7(-1_000), -127);
        assert_eq!(tanh_q7(128), 97);
        assert_eq!(ramp_q7(-256), 0);
        assert_eq!(ramp_q7(0), 512);
        assert_eq!(ramp_q7(255), 1022);
        assert_eq!(ramp_q7(256), 1024);
    }
}
