//! Requantization of the decoded Huffman samples.
//!
//! The Huffman decoder leaves `s(i)^(4/3)` in the sample buffer, so
//! requantization reduces to multiplying each scale factor band by its gain:
//!
//! ```text
//! xr(i) = s(i)^(4/3) * 2^(0.25 * A) * 2^(-B)
//!     A = global_gain - 210            (- 8 * subblock_gain per short window)
//!     B = scalefac_multiplier * (scalefac + preflag * pretab)
//! ```

use lazy_static::lazy_static;

use crate::structs::header::FrameHeader;
use crate::structs::sfb::{
    SFB_LONG_BANDS, SFB_MIXED_BANDS, SFB_MIXED_SWITCH_POINT, SFB_SHORT_BANDS,
};
use crate::structs::side_info::{BlockType, GranuleChannel};

lazy_static! {
    /// Lookup of x^(4/3) for every Huffman magnitude. The largest value is
    /// 15 + 2^13 - 1 = 8206 (magnitude 15 extended by 13 linbits).
    pub(crate) static ref REQUANTIZE_POW43: [f32; 8207] = {
        let mut pow43 = [0f32; 8207];
        for (i, p) in pow43.iter_mut().enumerate() {
            *p = f32::powf(i as f32, 4.0 / 3.0);
        }
        pow43
    };
}

/// Applies the scale factor band gains for one granule-channel.
pub fn requantize(header: &FrameHeader, channel: &GranuleChannel, buf: &mut [f32; 576]) {
    match channel.block_type {
        BlockType::Short { is_mixed: false } => {
            requantize_short(channel, &SFB_SHORT_BANDS[header.sample_rate_idx], 0, buf);
        }
        BlockType::Short { is_mixed: true } => {
            // Mixed blocks requantize as one long block up to the switch
            // point and as short windows after it.
            let bands = SFB_MIXED_BANDS[header.sample_rate_idx];
            let switch = SFB_MIXED_SWITCH_POINT[header.sample_rate_idx];

            requantize_long(channel, &bands[..=switch], buf);
            requantize_short(channel, &bands[switch..], switch, buf);
        }
        _ => {
            requantize_long(channel, &SFB_LONG_BANDS[header.sample_rate_idx], buf);
        }
    }
}

fn requantize_long(channel: &GranuleChannel, bands: &[usize], buf: &mut [f32; 576]) {
    // Pre-emphasis per band, ISO/IEC 11172-3 Table B.6.
    const PRE_EMPHASIS: [u8; 22] =
        [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 2, 0];

    let a = i32::from(channel.global_gain) - 210;
    let scalefac_shift = if channel.scalefac_scale { 2 } else { 1 };

    for (i, (start, end)) in bands.iter().zip(&bands[1..]).enumerate() {
        // Everything past rzero is zero already.
        if *start >= channel.rzero {
            break;
        }

        let pre_emphasis = if channel.preflag { PRE_EMPHASIS[i] } else { 0 };

        // scalefac_shift folds the 2^(-B) exponent into quarter units so a
        // single 2^(0.25 * (A - B)) covers both gain terms.
        let b = i32::from((channel.scalefacs[i] + pre_emphasis) << scalefac_shift);

        let pow2ab = f64::powf(2.0, 0.25 * f64::from(a - b)) as f32;

        let band_end = (*end).min(channel.rzero);

        for sample in &mut buf[*start..band_end] {
            *sample *= pow2ab;
        }
    }
}

/// Requantizes short windows. `switch` is the scale factor index of the
/// first short window, nonzero only for mixed blocks.
fn requantize_short(
    channel: &GranuleChannel,
    bands: &[usize],
    switch: usize,
    buf: &mut [f32; 576],
) {
    let gain = i32::from(channel.global_gain) - 210;

    // Window-specific gain offsets.
    let a = [
        gain - 8 * i32::from(channel.subblock_gain[0]),
        gain - 8 * i32::from(channel.subblock_gain[1]),
        gain - 8 * i32::from(channel.subblock_gain[2]),
    ];

    let scalefac_shift = if channel.scalefac_scale { 2 } else { 1 };

    for (i, (start, end)) in bands.iter().zip(&bands[1..]).enumerate() {
        if *start > channel.rzero {
            break;
        }

        let b = i32::from(channel.scalefacs[switch + i] << scalefac_shift);

        let pow2ab = f64::powf(2.0, 0.25 * f64::from(a[i % 3] - b)) as f32;

        let win_end = (*end).min(channel.rzero);

        for sample in &mut buf[*start..win_end] {
            *sample *= pow2ab;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::header::FrameHeader;

    fn mpeg1_header() -> FrameHeader {
        FrameHeader::read(0xfffb_9000).unwrap()
    }

    #[test]
    fn pow43_table() {
        assert_eq!(REQUANTIZE_POW43[0], 0.0);
        assert_eq!(REQUANTIZE_POW43[1], 1.0);
        assert!((REQUANTIZE_POW43[2] - 2.519_842).abs() < 1e-5);
        assert!((REQUANTIZE_POW43[8206] - f32::powf(8206.0, 4.0 / 3.0)).abs() < 1.0);
    }

    #[test]
    fn long_block_band_gains() {
        let header = mpeg1_header();

        let mut channel = GranuleChannel {
            global_gain: 210,
            rzero: 576,
            ..Default::default()
        };
        channel.scalefacs[1] = 2;

        let mut buf = [1f32; 576];
        requantize(&header, &channel, &mut buf);

        // A = 0, B = 0 in band 0: unity gain
        assert!((buf[0] - 1.0).abs() < 1e-6);
        // band 1 (samples 4..8): B = 2 << 1 = 4 -> 2^-1
        assert!((buf[4] - 0.5).abs() < 1e-6);
        assert!((buf[7] - 0.5).abs() < 1e-6);
        assert!((buf[8] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scalefac_scale_doubles_the_shift() {
        let header = mpeg1_header();

        let mut channel = GranuleChannel {
            global_gain: 210,
            scalefac_scale: true,
            rzero: 576,
            ..Default::default()
        };
        channel.scalefacs[0] = 1;

        let mut buf = [1f32; 576];
        requantize(&header, &channel, &mut buf);

        // B = 1 << 2 = 4 -> 2^-1
        assert!((buf[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn preflag_adds_pre_emphasis() {
        let header = mpeg1_header();

        let channel = GranuleChannel {
            global_gain: 210,
            preflag: true,
            rzero: 576,
            ..Default::default()
        };

        let mut buf = [1f32; 576];
        requantize(&header, &channel, &mut buf);

        // band 11 has pretab = 1: B = 1 << 1 = 2 -> 2^-0.5
        assert!((buf[0] - 1.0).abs() < 1e-6);
        assert!((buf[62] - f32::powf(2.0, -0.5)).abs() < 1e-6);
    }

    #[test]
    fn short_windows_use_subblock_gain() {
        let header = mpeg1_header();

        let channel = GranuleChannel {
            global_gain: 210,
            block_type: BlockType::Short { is_mixed: false },
            subblock_gain: [0, 1, 0],
            rzero: 576,
            ..Default::default()
        };

        let mut buf = [1f32; 576];
        requantize(&header, &channel, &mut buf);

        // window 0 (samples 0..4): unity; window 1 (4..8): A = -8 -> 2^-2
        assert!((buf[0] - 1.0).abs() < 1e-6);
        assert!((buf[4] - 0.25).abs() < 1e-6);
        assert!((buf[8] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bands_past_rzero_are_untouched() {
        let header = mpeg1_header();

        let channel = GranuleChannel {
            global_gain: 218, // A = 8 -> gain 4
            rzero: 6,
            ..Default::default()
        };

        let mut buf = [1f32; 576];
        requantize(&header, &channel, &mut buf);

        assert!((buf[0] - 4.0).abs() < 1e-6);
        assert!((buf[5] - 4.0).abs() < 1e-6);
        // rzero clamps the band that straddles it
        assert!((buf[6] - 1.0).abs() < 1e-6);
    }
}
