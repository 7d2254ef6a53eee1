//! Joint stereo reconstruction.
//!
//! A Layer III joint stereo frame combines two schemes per scale factor
//! band: mid-side coding over the lower spectrum, and intensity coding for
//! the zeroed upper bands of channel 1, whose scale factors then carry
//! intensity positions instead of gains.

use std::f32;
use std::f64;

use lazy_static::lazy_static;

use crate::structs::header::{ChannelMode, FrameHeader, JointStereoMode};
use crate::structs::sfb::{
    SFB_LONG_BANDS, SFB_MIXED_BANDS, SFB_MIXED_SWITCH_POINT, SFB_SHORT_BANDS,
};
use crate::structs::side_info::{BlockType, Granule};
use crate::utils::errors::DecodeError;

/// Intensity positions at or above these values code no ratio. MPEG-1
/// defines ratios for positions 0..7, MPEG-2 and 2.5 for 0..31.
const INTENSITY_INV_POS_MPEG1: u8 = 7;
const INTENSITY_INV_POS_MPEG2: u8 = 31;

lazy_static! {
    /// MPEG-1 intensity (left, right) coefficients indexed by position
    /// (ISO/IEC 11172-3 2.4.3.4.9.3):
    ///
    /// ```text
    /// is_ratio = tan(is_pos * PI/12)
    /// k_l = is_ratio / (1 + is_ratio)
    /// k_r = 1 / (1 + is_ratio)
    /// ```
    static ref INTENSITY_RATIOS_MPEG1: [(f32, f32); 7] = {
        const PI_12: f64 = f64::consts::PI / 12.0;

        let mut ratios = [(0.0, 0.0); 7];

        for (is_pos, ratio) in ratios.iter_mut().enumerate() {
            let is_ratio = (PI_12 * is_pos as f64).tan();
            *ratio =
                ((is_ratio / (1.0 + is_ratio)) as f32, (1.0 / (1.0 + is_ratio)) as f32);
        }

        // position 6 maps to a fully panned pair; tan(PI/2) is undefined
        ratios[6] = (1.0, 0.0);

        ratios
    };
}

lazy_static! {
    /// MPEG-2 intensity (left, right) coefficients (ISO/IEC 13818-3
    /// 2.4.3.2). Odd positions scale the left channel, even ones the right:
    ///
    /// ```text
    /// is_pos & 1 == 1: k_l = i0^((is_pos + 1) / 2), k_r = 1.0
    /// is_pos & 1 == 0: k_l = 1.0, k_r = i0^(is_pos / 2)
    /// ```
    ///
    /// The first index is `scalefac_compress & 1`, selecting i0 as
    /// 2^(-1/4) or 2^(-1/2).
    static ref INTENSITY_RATIOS_MPEG2: [[(f32, f32); 32]; 2] = {
        let is_scale: [f64; 2] =
            [1.0 / f64::sqrt(f64::consts::SQRT_2), f64::consts::FRAC_1_SQRT_2];

        let mut ratios = [[(0.0, 0.0); 32]; 2];

        for (i, is_pos) in (0..32).enumerate() {
            if is_pos & 1 != 0 {
                ratios[0][i] = (is_scale[0].powf(f64::from(is_pos + 1) / 2.0) as f32, 1.0);
                ratios[1][i] = (is_scale[1].powf(f64::from(is_pos + 1) / 2.0) as f32, 1.0);
            } else {
                ratios[0][i] = (1.0, is_scale[0].powf(f64::from(is_pos) / 2.0) as f32);
                ratios[1][i] = (1.0, is_scale[1].powf(f64::from(is_pos) / 2.0) as f32);
            }
        }

        ratios
    };
}

/// Decorrelates a mid-side coded sample run in place:
///
/// ```text
/// l[i] = (m[i] + s[i]) / sqrt(2)
/// r[i] = (m[i] - s[i]) / sqrt(2)
/// ```
fn process_mid_side(mid: &mut [f32], side: &mut [f32]) {
    debug_assert!(mid.len() == side.len());

    for (m, s) in mid.iter_mut().zip(side) {
        let left = (*m + *s) * f32::consts::FRAC_1_SQRT_2;
        let right = (*m - *s) * f32::consts::FRAC_1_SQRT_2;
        *m = left;
        *s = right;
    }
}

/// Expands the intensity coded signal in `ch0` into both channels. An
/// invalid position leaves the band mid-side coded (or untouched when
/// mid-side is off).
fn process_intensity(
    is_pos: u8,
    is_table: &[(f32, f32)],
    is_inv_pos: u8,
    mid_side: bool,
    ch0: &mut [f32],
    ch1: &mut [f32],
) {
    if is_pos < is_inv_pos {
        let (ratio_l, ratio_r) = is_table[usize::from(is_pos)];

        for (l, r) in ch0.iter_mut().zip(ch1) {
            let is = *l;
            *l = ratio_l * is;
            *r = ratio_r * is;
        }
    } else if mid_side {
        process_mid_side(ch0, ch1);
    }
}

#[inline(always)]
fn is_zero_band(band: &[f32]) -> bool {
    !band.iter().any(|&x| x != 0.0)
}

fn intensity_table(
    header: &FrameHeader,
    granule: &Granule,
) -> (&'static [(f32, f32)], u8) {
    if header.is_mpeg1() {
        (&INTENSITY_RATIOS_MPEG1[..], INTENSITY_INV_POS_MPEG1)
    } else {
        let is_scale = granule.channels[1].scalefac_compress & 1;
        (&INTENSITY_RATIOS_MPEG2[usize::from(is_scale)][..], INTENSITY_INV_POS_MPEG2)
    }
}

/// Decodes the intensity coded bands of a long block, scanning down from
/// the top of the spectrum while channel 1 stays zero. Returns the
/// intensity bound.
fn process_intensity_long_block(
    header: &FrameHeader,
    granule: &Granule,
    mid_side: bool,
    max_bound: usize,
    ch0: &mut [f32; 576],
    ch1: &mut [f32; 576],
) -> usize {
    let rzero = granule.channels[1].rzero;

    let (is_table, is_inv_pos) = intensity_table(header, granule);

    let bands = &SFB_LONG_BANDS[header.sample_rate_idx];

    // Channel 1 scale factors hold the intensity positions. Band 21 is not
    // coded and reuses band 20's position.
    let mut is_pos = [0; 22];
    is_pos.copy_from_slice(&granule.channels[1].scalefacs[..22]);
    is_pos[21] = is_pos[20];

    let mut bound = max_bound;

    for ((&start, &end), &is_pos) in bands.iter().zip(&bands[1..]).zip(is_pos.iter()).rev() {
        // Bands above rzero are zero by construction; below it the samples
        // have to be checked.
        let zero = start >= rzero || is_zero_band(&ch1[start..end]);

        if !zero {
            break;
        }

        process_intensity(
            is_pos,
            is_table,
            is_inv_pos,
            mid_side,
            &mut ch0[start..end],
            &mut ch1[start..end],
        );

        bound = start;
    }

    bound
}

/// Decodes the intensity coded bands of a short (or mixed) block. The three
/// windows of a band are interleaved but logically separate runs, so each
/// window tracks its own zero state. Returns the intensity bound.
fn process_intensity_short_block(
    header: &FrameHeader,
    granule: &Granule,
    is_mixed: bool,
    mid_side: bool,
    max_bound: usize,
    ch0: &mut [f32; 576],
    ch1: &mut [f32; 576],
) -> usize {
    let (short_bands, long_bands, mut sfi) = if is_mixed {
        let bands = SFB_MIXED_BANDS[header.sample_rate_idx];
        let switch = SFB_MIXED_SWITCH_POINT[header.sample_rate_idx];
        (&bands[switch..], Some(&bands[..switch + 1]), bands.len() - 1)
    } else {
        // 13 bands of 3 windows yield 39 scale factors
        (&SFB_SHORT_BANDS[header.sample_rate_idx][..], None, 39)
    };

    let (is_table, is_inv_pos) = intensity_table(header, granule);

    // One intensity position per window interval. The final band is never
    // coded and its three windows reuse the previous band's triple, whose
    // index depends on the band layout: pure short blocks code 36
    // positions, mixed blocks fewer because of their long prefix.
    let scalefacs = &granule.channels[1].scalefacs;
    let coded = sfi - 3;

    let mut is_pos = [0; 39];
    is_pos[..coded].copy_from_slice(&scalefacs[..coded]);
    is_pos[coded..sfi].copy_from_slice(&scalefacs[coded - 3..coded]);

    let mut window_is_zero = [true; 3];

    let mut bound = max_bound;
    let mut found_bound = false;

    // Walk bands top-down; each band spans four consecutive boundaries.
    for base in (0..short_bands.len() - 3).step_by(3).rev() {
        // Windows are processed in reverse so sfi tracks the last scale
        // factor consumed.
        for w in (0..3).rev() {
            let ws = short_bands[base + w];
            let we = short_bands[base + w + 1];

            // A window stays "zero" only while every higher band was zero
            // too; the short-circuit skips the scan once a window is live.
            window_is_zero[w] = window_is_zero[w] && is_zero_band(&ch1[ws..we]);

            if window_is_zero[w] {
                process_intensity(
                    is_pos[sfi - 1],
                    is_table,
                    is_inv_pos,
                    mid_side,
                    &mut ch0[ws..we],
                    &mut ch1[ws..we],
                );
            } else if mid_side {
                process_mid_side(&mut ch0[ws..we], &mut ch1[ws..we]);
            }

            sfi -= 1;
        }

        bound = short_bands[base];

        // Once every window is live the rest of the spectrum is plain
        // mid-side territory.
        found_bound = !window_is_zero[0] && !window_is_zero[1] && !window_is_zero[2];

        if found_bound {
            break;
        }
    }

    // A mixed block may extend the intensity region into its long bands.
    if !found_bound {
        if let Some(long_bands) = long_bands {
            for (&start, &end) in long_bands.iter().zip(&long_bands[1..]).rev() {
                if !is_zero_band(&ch1[start..end]) {
                    break;
                }

                process_intensity(
                    is_pos[sfi - 1],
                    is_table,
                    is_inv_pos,
                    mid_side,
                    &mut ch0[start..end],
                    &mut ch1[start..end],
                );

                sfi -= 1;

                bound = start;
            }
        }
    }

    bound
}

/// Performs joint stereo decoding on a channel pair. Channel 0 holds mid or
/// intensity samples on entry and the left channel on exit.
pub fn stereo(
    header: &FrameHeader,
    granule: &mut Granule,
    ch: &mut [[f32; 576]; 2],
) -> Result<(), DecodeError> {
    let (mid_side, intensity) = match header.channel_mode {
        ChannelMode::JointStereo(JointStereoMode::Layer3 { mid_side, intensity }) => {
            (mid_side, intensity)
        }
        _ => return Ok(()),
    };

    // Both channels of a joint stereo granule must share a window type.
    if granule.channels[0].block_type != granule.channels[1].block_type {
        return Err(DecodeError::BadStereo);
    }

    let [ch0, ch1] = ch;

    let end = granule.channels[0].rzero.max(granule.channels[1].rzero);

    // Intensity coding applies from the intensity bound upward; without it
    // the whole non-zero spectrum is mid-side coded.
    let is_bound = if intensity {
        match granule.channels[1].block_type {
            BlockType::Short { is_mixed } => {
                process_intensity_short_block(header, granule, is_mixed, mid_side, end, ch0, ch1)
            }
            _ => process_intensity_long_block(header, granule, mid_side, end, ch0, ch1),
        }
    } else {
        end
    };

    if mid_side && is_bound > 0 {
        process_mid_side(&mut ch0[0..is_bound], &mut ch1[0..is_bound]);
    }

    // After decoding both channels carry samples up to the same point.
    if intensity || mid_side {
        granule.channels[0].rzero = end;
        granule.channels[1].rzero = end;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 128 kbps 44.1 kHz joint stereo; 0x20 = mid-side, 0x10 = intensity
    fn js_header(mode_ext: u32) -> FrameHeader {
        FrameHeader::read(0xfffb_9040 | mode_ext).unwrap()
    }

    #[test]
    fn mid_side_decorrelation() {
        let header = js_header(0x20);
        let mut granule = Granule::default();
        granule.channels[0].rzero = 4;
        granule.channels[1].rzero = 2;

        let mut ch = [[0f32; 576]; 2];
        ch[0][0] = 1.0; // mid
        ch[1][0] = 0.5; // side
        ch[0][2] = 2.0; // side channel silent here

        stereo(&header, &mut granule, &mut ch).unwrap();

        let sqrt2_inv = f32::consts::FRAC_1_SQRT_2;
        assert!((ch[0][0] - 1.5 * sqrt2_inv).abs() < 1e-6);
        assert!((ch[1][0] - 0.5 * sqrt2_inv).abs() < 1e-6);
        assert!((ch[0][2] - 2.0 * sqrt2_inv).abs() < 1e-6);
        assert!((ch[1][2] - 2.0 * sqrt2_inv).abs() < 1e-6);

        // both channels now span the union of the coded spectra
        assert_eq!(granule.channels[0].rzero, 4);
        assert_eq!(granule.channels[1].rzero, 4);
    }

    #[test]
    fn intensity_positions_pan_channel0() {
        let header = js_header(0x10);
        let mut granule = Granule::default();
        granule.channels[0].rzero = 4;
        granule.channels[1].rzero = 0;

        // position 0: tan(0) ratio puts everything in the right channel
        let mut ch = [[0f32; 576]; 2];
        ch[0][0] = 0.75;

        stereo(&header, &mut granule, &mut ch).unwrap();

        assert_eq!(ch[0][0], 0.0);
        assert_eq!(ch[1][0], 0.75);
    }

    #[test]
    fn intensity_position_3_splits_evenly() {
        let header = js_header(0x10);
        let mut granule = Granule::default();
        granule.channels[0].rzero = 4;
        granule.channels[1].rzero = 0;
        // position 3: is_ratio = tan(PI/4) = 1
        for sfb in granule.channels[1].scalefacs.iter_mut() {
            *sfb = 3;
        }

        let mut ch = [[0f32; 576]; 2];
        ch[0][0] = 1.0;

        stereo(&header, &mut granule, &mut ch).unwrap();

        assert!((ch[0][0] - 0.5).abs() < 1e-6);
        assert!((ch[1][0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn invalid_position_falls_back_to_mid_side() {
        let header = js_header(0x30);
        let mut granule = Granule::default();
        granule.channels[0].rzero = 4;
        granule.channels[1].rzero = 0;
        // position 7 is invalid for MPEG-1
        for sfb in granule.channels[1].scalefacs.iter_mut() {
            *sfb = 7;
        }

        let mut ch = [[0f32; 576]; 2];
        ch[0][0] = 1.0;

        stereo(&header, &mut granule, &mut ch).unwrap();

        let sqrt2_inv = f32::consts::FRAC_1_SQRT_2;
        assert!((ch[0][0] - sqrt2_inv).abs() < 1e-6);
        assert!((ch[1][0] - sqrt2_inv).abs() < 1e-6);
    }

    #[test]
    fn mixed_block_intensity_reuses_last_coded_triple() {
        let header = js_header(0x10);
        let mut granule = Granule::default();
        granule.channels[0].block_type = BlockType::Short { is_mixed: true };
        granule.channels[1].block_type = BlockType::Short { is_mixed: true };
        granule.channels[0].rzero = 464;
        granule.channels[1].rzero = 0;

        // The top short band is uncoded and its windows reuse the last
        // coded triple, which sits three slots lower than in a pure short
        // block because of the long-band prefix.
        granule.channels[1].scalefacs[32] = 3; // tan(PI/4): even split
        granule.channels[1].scalefacs[33] = 3;
        granule.channels[1].scalefacs[34] = 3;

        let mut ch = [[0f32; 576]; 2];
        ch[0][408] = 1.0; // window 0 of the final band at 44.1 kHz

        stereo(&header, &mut granule, &mut ch).unwrap();

        assert!((ch[0][408] - 0.5).abs() < 1e-6);
        assert!((ch[1][408] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn block_type_mismatch_is_rejected() {
        let header = js_header(0x20);
        let mut granule = Granule::default();
        granule.channels[1].block_type = BlockType::Short { is_mixed: false };

        let mut ch = [[0f32; 576]; 2];
        let err = stereo(&header, &mut granule, &mut ch).unwrap_err();
        assert_eq!(err, DecodeError::BadStereo);
    }

    #[test]
    fn plain_stereo_is_untouched() {
        let header = FrameHeader::read(0xfffb_9000).unwrap();
        let mut granule = Granule::default();
        granule.channels[0].rzero = 4;

        let mut ch = [[0f32; 576]; 2];
        ch[0][0] = 1.0;

        stereo(&header, &mut granule, &mut ch).unwrap();

        assert_eq!(ch[0][0], 1.0);
        assert_eq!(ch[1][0], 0.0);
        assert_eq!(granule.channels[1].rzero, 0);
    }
}
