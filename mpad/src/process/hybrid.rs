//! Hybrid filterbank synthesis: reordering, alias reduction, IMDCT and
//! windowing of the 32 subbands, and frequency inversion.

use std::f64;

use lazy_static::lazy_static;

use crate::structs::header::FrameHeader;
use crate::structs::sfb::{SFB_MIXED_BANDS, SFB_MIXED_SWITCH_POINT, SFB_SHORT_BANDS};
use crate::structs::side_info::{BlockType, GranuleChannel};

lazy_static! {
    /// IMDCT windows for Long, Start, Short and End blocks, in that order.
    ///
    /// ```text
    /// long:  w[0..36] = sin(PI/36 * (i + 0.5))
    /// start: w[0..18] = sin(PI/36 * (i + 0.5)), w[18..24] = 1.0,
    ///        w[24..30] = sin(PI/12 * (i - 18 + 0.5)), w[30..36] = 0.0
    /// short: w[0..12] = sin(PI/12 * (i + 0.5)), w[12..36] = 0.0
    /// end:   w[0..6] = 0.0, w[6..12] = sin(PI/12 * (i - 6 + 0.5)),
    ///        w[12..18] = 1.0, w[18..36] = sin(PI/36 * (i + 0.5))
    /// ```
    static ref IMDCT_WINDOWS: [[f32; 36]; 4] = {
        const PI_36: f64 = f64::consts::PI / 36.0;
        const PI_12: f64 = f64::consts::PI / 12.0;

        let mut windows = [[0f32; 36]; 4];

        for i in 0..36 {
            windows[0][i] = (PI_36 * (i as f64 + 0.5)).sin() as f32;
        }

        for i in 0..18 {
            windows[1][i] = (PI_36 * (i as f64 + 0.5)).sin() as f32;
        }
        for i in 18..24 {
            windows[1][i] = 1.0;
        }
        for i in 24..30 {
            windows[1][i] = (PI_12 * ((i - 18) as f64 + 0.5)).sin() as f32;
        }

        for i in 0..12 {
            windows[2][i] = (PI_12 * (i as f64 + 0.5)).sin() as f32;
        }

        for i in 6..12 {
            windows[3][i] = (PI_12 * ((i - 6) as f64 + 0.5)).sin() as f32;
        }
        for i in 12..18 {
            windows[3][i] = 1.0;
        }
        for i in 18..36 {
            windows[3][i] = (PI_36 * (i as f64 + 0.5)).sin() as f32;
        }

        windows
    };
}

lazy_static! {
    /// Middle half of the 12-point IMDCT cosine table:
    /// `cos(PI/24 * (2i + 7) * (2k + 1))` for i in 3..9, k in 0..6.
    static ref IMDCT_HALF_COS_12: [[f32; 6]; 6] = {
        const PI_24: f64 = f64::consts::PI / 24.0;

        let mut cos = [[0f32; 6]; 6];

        for (i, cos_i) in cos.iter_mut().enumerate() {
            for (k, cos_ik) in cos_i.iter_mut().enumerate() {
                let n = (2 * (i + 3) + (12 / 2) + 1) * (2 * k + 1);
                *cos_ik = (PI_24 * n as f64).cos() as f32;
            }
        }

        cos
    };
}

lazy_static! {
    /// Alias reduction butterfly coefficients (cs, ca) computed from the
    /// eight constants of ISO/IEC 11172-3 Table B.9:
    ///
    /// ```text
    /// cs[i] = 1 / sqrt(1 + c[i]^2)
    /// ca[i] = c[i] / sqrt(1 + c[i]^2)
    /// ```
    static ref ANTIALIAS_CS_CA: ([f32; 8], [f32; 8]) = {
        const C: [f64; 8] = [-0.6, -0.535, -0.33, -0.185, -0.095, -0.041, -0.0142, -0.0037];

        let mut cs = [0f32; 8];
        let mut ca = [0f32; 8];

        for i in 0..8 {
            let sqrt = f64::sqrt(1.0 + C[i] * C[i]);
            cs[i] = (1.0 / sqrt) as f32;
            ca[i] = (C[i] / sqrt) as f32;
        }

        (cs, ca)
    };
}

/// Moves short-block samples from window order back into subband order.
///
/// The three windows of a short band are stored planar in the bitstream and
/// interleaved here, so `[w0; n][w1; n][w2; n]` becomes
/// `[w0[0], w1[0], w2[0], w0[1], ...]`.
pub fn reorder(header: &FrameHeader, channel: &GranuleChannel, buf: &mut [f32; 576]) {
    let BlockType::Short { is_mixed } = channel.block_type else {
        return;
    };

    debug_assert!(channel.rzero <= 576);

    // Mixed blocks only reorder the short bands after the switch point.
    let bands = if is_mixed {
        let switch = SFB_MIXED_SWITCH_POINT[header.sample_rate_idx];
        &SFB_MIXED_BANDS[header.sample_rate_idx][switch..]
    } else {
        &SFB_SHORT_BANDS[header.sample_rate_idx]
    };

    let start = bands[0];

    let mut reorder_buf = [0f32; 576];
    let mut i = start;

    for (((s0, s1), s2), s3) in
        bands.iter().zip(&bands[1..]).zip(&bands[2..]).zip(&bands[3..]).step_by(3)
    {
        let win0 = &buf[*s0..*s1];
        let win1 = &buf[*s1..*s2];
        let win2 = &buf[*s2..*s3];

        for ((w0, w1), w2) in win0.iter().zip(win1).zip(win2) {
            reorder_buf[i] = *w0;
            reorder_buf[i + 1] = *w1;
            reorder_buf[i + 2] = *w2;
            i += 3;
        }
    }

    buf[start..i].copy_from_slice(&reorder_buf[start..i]);
}

/// Applies the alias reduction butterflies across subband boundaries.
pub fn antialias(channel: &GranuleChannel, samples: &mut [f32; 576]) {
    // Short blocks skip alias reduction; mixed blocks only treat the two
    // long subbands at the bottom.
    let sb_end = match channel.block_type {
        BlockType::Short { is_mixed: false } => return,
        BlockType::Short { is_mixed: true } => 2 * 18,
        _ => 32 * 18,
    };

    let (cs, ca): &([f32; 8], [f32; 8]) = &ANTIALIAS_CS_CA;

    // Eight butterflies straddle each subband boundary, with the lower
    // index walking back from the boundary and the upper walking forward:
    //
    //   l1 = l0 * cs[i] - u0 * ca[i]
    //   u1 = u0 * cs[i] + l0 * ca[i]
    for sb in (18..sb_end).step_by(18) {
        for i in 0..8 {
            let li = sb - 1 - i;
            let ui = sb + i;
            let lower = samples[li];
            let upper = samples[ui];
            samples[li] = lower * cs[i] - upper * ca[i];
            samples[ui] = upper * cs[i] + lower * ca[i];
        }
    }
}

/// Runs the IMDCT and windowing over all 32 subbands, overlap-adding with
/// the previous granule's tail kept in `overlap`.
pub fn hybrid_synthesis(
    channel: &GranuleChannel,
    overlap: &mut [[f32; 18]; 32],
    samples: &mut [f32; 576],
) {
    // Long, start and end blocks use the 36-point IMDCT on every subband;
    // short blocks use 3 x 12-point IMDCTs; mixed blocks are long over the
    // lowest two subbands and short above them.
    let n_long_bands = match channel.block_type {
        BlockType::Short { is_mixed: false } => 0,
        BlockType::Short { is_mixed: true } => 2,
        _ => 32,
    };

    if n_long_bands > 0 {
        let window: &[f32; 36] = match channel.block_type {
            BlockType::Start => &IMDCT_WINDOWS[1],
            BlockType::End => &IMDCT_WINDOWS[3],
            _ => &IMDCT_WINDOWS[0],
        };

        for (sub_band, overlap) in
            samples.chunks_exact_mut(18).zip(overlap.iter_mut()).take(n_long_bands)
        {
            imdct36(sub_band, window, overlap);
        }
    }

    if n_long_bands < 32 {
        let window: &[f32; 36] = &IMDCT_WINDOWS[2];

        for (sub_band, overlap) in
            samples.chunks_exact_mut(18).zip(overlap.iter_mut()).skip(n_long_bands)
        {
            imdct12_win(sub_band, window, overlap);
        }
    }
}

/// Negates the odd samples of the odd subbands, undoing the alternate
/// inversion the analysis filterbank applied.
pub fn frequency_inversion(samples: &mut [f32; 576]) {
    for i in (18..576).step_by(36) {
        for j in (i..i + 16).step_by(8) {
            samples[j + 1] = -samples[j + 1];
            samples[j + 3] = -samples[j + 3];
            samples[j + 5] = -samples[j + 5];
            samples[j + 7] = -samples[j + 7];
        }
        samples[i + 18 - 1] = -samples[i + 18 - 1];
    }
}

/// 12-point IMDCT and windowing for the 3 short windows of one subband,
/// overlap-added into 18 output samples plus 18 samples of new overlap.
fn imdct12_win(x: &mut [f32], window: &[f32; 36], overlap: &mut [f32; 18]) {
    debug_assert!(x.len() == 18);

    let cos12: &[[f32; 6]; 6] = &IMDCT_HALF_COS_12;

    let mut tmp = [0.0; 36];

    for w in 0..3 {
        for i in 0..3 {
            // Half-size IMDCT: y[0..3] = -y[3..6].rev() and
            // y[9..12] = y[6..9].rev(), so computing the middle half (yl
            // left, yr right) yields four output samples per iteration.
            let yl = (x[w] * cos12[i][0])
                + (x[3 + w] * cos12[i][1])
                + (x[3 * 2 + w] * cos12[i][2])
                + (x[3 * 3 + w] * cos12[i][3])
                + (x[3 * 4 + w] * cos12[i][4])
                + (x[3 * 5 + w] * cos12[i][5]);

            let yr = (x[w] * cos12[i + 3][0])
                + (x[3 + w] * cos12[i + 3][1])
                + (x[3 * 2 + w] * cos12[i + 3][2])
                + (x[3 * 3 + w] * cos12[i + 3][3])
                + (x[3 * 4 + w] * cos12[i + 3][4])
                + (x[3 * 5 + w] * cos12[i + 3][5]);

            // The 3 windowed IMDCTs overlap by 6 samples inside tmp, with
            // 6 leading and trailing zeros.
            tmp[6 + 6 * w + 3 - i - 1] += -yl * window[3 - i - 1];
            tmp[6 + 6 * w + i + 3] += yl * window[i + 3];
            tmp[6 + 6 * w + i + 6] += yr * window[i + 6];
            tmp[6 + 6 * w + 12 - i - 1] += yr * window[12 - i - 1];
        }
    }

    for i in 0..18 {
        x[i] = tmp[i] + overlap[i];
        overlap[i] = tmp[i + 18];
    }
}

/// 36-point IMDCT via an 18-point DCT-IV, using Szu-Wei Lee's decomposition
/// into scaled SDCT-IIs ("Improved algorithm for efficient computation of
/// the forward and backward MDCT in MPEG audio coder", IEEE TCAS-II vol. 48
/// no. 10, 2001). Windows the output and overlap-adds the first half.
fn imdct36(x: &mut [f32], window: &[f32; 36], overlap: &mut [f32; 18]) {
    debug_assert!(x.len() == 18);

    let mut dct = [0f32; 18];

    dct_iv(x, &mut dct);

    // The IMDCT maps onto the DCT-IV as
    // [dct[9..18], -dct[0..18].rev(), -dct[0..9]].
    for i in 0..9 {
        x[i] = overlap[i] + dct[9 + i] * window[i];
    }

    for i in 9..18 {
        x[i] = overlap[i] - dct[27 - i - 1] * window[i];
    }

    for i in 18..27 {
        overlap[i - 18] = -dct[27 - i - 1] * window[i];
    }

    for i in 27..36 {
        overlap[i - 18] = -dct[i - 27] * window[i];
    }
}

/// 18-point DCT-IV expressed as a scaled SDCT-II plus differencing.
fn dct_iv(x: &[f32], y: &mut [f32; 18]) {
    debug_assert!(x.len() == 18);

    // 2 * cos(PI * (2m + 1) / 72)
    const SCALE: [f32; 18] = [
        1.998_096_443_163_715_6,  // m=0
        1.982_889_722_747_620_8,  // m=1
        1.952_592_014_239_866_7,  // m=2
        1.907_433_901_496_453_9,  // m=3
        1.847_759_065_022_573_5,  // m=4
        1.774_021_666_356_443_4,  // m=5
        1.686_782_891_625_771_4,  // m=6
        1.586_706_680_582_470_6,  // m=7
        1.474_554_673_620_247_9,  // m=8
        1.351_180_415_231_320_7,  // m=9
        1.217_522_858_017_441_3,  // m=10
        1.074_599_216_693_647_8,  // m=11
        0.923_497_226_470_067_7,  // m=12
        0.765_366_864_730_179_7,  // m=13
        0.601_411_599_008_546_1,  // m=14
        0.432_879_227_876_205_8,  // m=15
        0.261_052_384_440_103_0,  // m=16
        0.087_238_774_730_672_0,  // m=17
    ];

    let mut samples = [0f32; 18];
    for i in 0..18 {
        samples[i] = SCALE[i] * x[i];
    }

    sdct_ii_18(&samples, y);

    y[0] /= 2.0;
    for i in 1..17 {
        y[i] = (y[i] / 2.0) - y[i - 1];
    }
    y[17] = (y[17] / 2.0) - y[16];
}

/// 18-point SDCT-II split into two 9-point SDCT-IIs over the even and
/// scaled odd input sums.
fn sdct_ii_18(x: &[f32; 18], y: &mut [f32; 18]) {
    // 2 * cos(PI * (2m + 1) / 36)
    const SCALE: [f32; 9] = [
        1.992_389_396_183_491_1,  // m=0
        1.931_851_652_578_136_6,  // m=1
        1.812_615_574_073_299_9,  // m=2
        1.638_304_088_577_983_6,  // m=3
        std::f32::consts::SQRT_2, // m=4
        1.147_152_872_702_092_3,  // m=5
        0.845_236_523_481_398_9,  // m=6
        0.517_638_090_205_041_9,  // m=7
        0.174_311_485_495_316_3,  // m=8
    ];

    let even = [
        x[0] + x[17],
        x[1] + x[16],
        x[2] + x[15],
        x[3] + x[14],
        x[4] + x[13],
        x[5] + x[12],
        x[6] + x[11],
        x[7] + x[10],
        x[8] + x[9],
    ];

    sdct_ii_9(&even, y);

    let odd = [
        SCALE[0] * (x[0] - x[17]),
        SCALE[1] * (x[1] - x[16]),
        SCALE[2] * (x[2] - x[15]),
        SCALE[3] * (x[3] - x[14]),
        SCALE[4] * (x[4] - x[13]),
        SCALE[5] * (x[5] - x[12]),
        SCALE[6] * (x[6] - x[11]),
        SCALE[7] * (x[7] - x[10]),
        SCALE[8] * (x[8] - x[9]),
    ];

    sdct_ii_9(&odd, &mut y[1..]);

    y[3] -= y[3 - 2];
    y[5] -= y[5 - 2];
    y[7] -= y[7 - 2];
    y[9] -= y[9 - 2];
    y[11] -= y[11 - 2];
    y[13] -= y[13 - 2];
    y[15] -= y[15 - 2];
    y[17] -= y[17 - 2];
}

/// 9-point SDCT-II writing every second element of `y`.
fn sdct_ii_9(x: &[f32; 9], y: &mut [f32]) {
    const D: [f32; 7] = [
        -1.732_050_807_568_877_2, // -sqrt(3.0)
        1.879_385_241_571_816_6,  // -2.0 * cos(8.0 * PI / 9.0)
        -0.347_296_355_333_860_8, // -2.0 * cos(4.0 * PI / 9.0)
        -1.532_088_886_237_956_0, // -2.0 * cos(2.0 * PI / 9.0)
        -0.684_040_286_651_337_8, // -2.0 * sin(8.0 * PI / 9.0)
        -1.969_615_506_024_416_0, // -2.0 * sin(4.0 * PI / 9.0)
        -1.285_575_219_373_078_5, // -2.0 * sin(2.0 * PI / 9.0)
    ];

    let a01 = x[3] + x[5];
    let a02 = x[3] - x[5];
    let a03 = x[6] + x[2];
    let a04 = x[6] - x[2];
    let a05 = x[1] + x[7];
    let a06 = x[1] - x[7];
    let a07 = x[8] + x[0];
    let a08 = x[8] - x[0];

    let a09 = x[4] + a05;
    let a10 = a01 + a03;
    let a11 = a10 + a07;
    let a12 = a03 - a07;
    let a13 = a01 - a07;
    let a14 = a01 - a03;
    let a15 = a02 - a04;
    let a16 = a15 + a08;
    let a17 = a04 + a08;
    let a18 = a02 - a08;
    let a19 = a02 + a04;
    let a20 = 2.0 * x[4] - a05;

    let m1 = D[0] * a06;
    let m2 = D[1] * a12;
    let m3 = D[2] * a13;
    let m4 = D[3] * a14;
    let m5 = D[0] * a16;
    let m6 = D[4] * a17;
    let m7 = D[5] * a18;
    let m8 = D[6] * a19;

    let a21 = a20 + m2;
    let a22 = a20 - m2;
    let a23 = a20 + m3;
    let a24 = m1 + m6;
    let a25 = m1 - m6;
    let a26 = m1 + m7;

    y[0] = a09 + a11;
    y[2] = m8 - a26;
    y[4] = m4 - a21;
    y[6] = m5;
    y[8] = a22 - m3;
    y[10] = a25 - m7;
    y[12] = a11 - 2.0 * a09;
    y[14] = a24 + m8;
    y[16] = a23 + m4;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64;

    const TEST_VECTOR: [f32; 18] = [
        0.0976, 0.9321, 0.6138, 0.0857, 0.0433, 0.4855, 0.2144, 0.8488, //
        0.6889, 0.2983, 0.1957, 0.7037, 0.0052, 0.0197, 0.3188, 0.5123, //
        0.2994, 0.7157,
    ];

    fn imdct36_analytical(x: &[f32; 18]) -> [f32; 36] {
        const PI_72: f64 = f64::consts::PI / 72.0;

        let mut result = [0f32; 36];

        for i in 0..36 {
            let mut sum = 0.0;
            for j in 0..18 {
                sum += (x[j] as f64) * (PI_72 * (((2 * i) + 1 + 18) * ((2 * j) + 1)) as f64).cos();
            }
            result[i] = sum as f32;
        }
        result
    }

    #[test]
    fn verify_imdct36() {
        const WINDOW: [f32; 36] = [1.0; 36];

        let mut actual = TEST_VECTOR;
        let mut overlap = [0.0; 18];
        imdct36(&mut actual, &WINDOW, &mut overlap);

        let expected = imdct36_analytical(&TEST_VECTOR);

        for i in 0..18 {
            assert!((expected[i] - actual[i]).abs() < 0.00001);
            assert!((expected[i + 18] - overlap[i]).abs() < 0.00001);
        }
    }

    fn imdct12_analytical(x: &[f32; 6]) -> [f32; 12] {
        const PI_24: f64 = f64::consts::PI / 24.0;

        let mut result = [0f32; 12];

        for i in 0..12 {
            let mut sum = 0.0;
            for k in 0..6 {
                sum +=
                    (x[k] as f64) * (PI_24 * ((2 * i + (12 / 2) + 1) * (2 * k + 1)) as f64).cos();
            }
            result[i] = sum as f32;
        }

        result
    }

    #[test]
    fn verify_imdct12_win() {
        let window = &IMDCT_WINDOWS[2];

        let mut actual = TEST_VECTOR;
        let mut overlap = [0.0; 18];
        imdct12_win(&mut actual, window, &mut overlap);

        // Three analytical 12-point IMDCTs, windowed and overlap-added at
        // 6-sample offsets, reproduce the packed output.
        let expected = {
            let mut expected = [0f32; 36];

            let mut x0 = [0f32; 6];
            let mut x1 = [0f32; 6];
            let mut x2 = [0f32; 6];

            for i in 0..6 {
                x0[i] = TEST_VECTOR[3 * i];
                x1[i] = TEST_VECTOR[3 * i + 1];
                x2[i] = TEST_VECTOR[3 * i + 2];
            }

            let imdct0 = imdct12_analytical(&x0);
            let imdct1 = imdct12_analytical(&x1);
            let imdct2 = imdct12_analytical(&x2);

            for i in 0..12 {
                expected[6 + i] += imdct0[i] * window[i];
                expected[12 + i] += imdct1[i] * window[i];
                expected[18 + i] += imdct2[i] * window[i];
            }

            expected
        };

        for i in 0..18 {
            assert!((expected[i] - actual[i]).abs() < 0.00001);
            assert!((expected[i + 18] - overlap[i]).abs() < 0.00001);
        }
    }

    #[test]
    fn reorder_interleaves_short_windows() {
        use crate::structs::header::FrameHeader;
        use crate::structs::side_info::GranuleChannel;

        let header = FrameHeader::read(0xfffb_9000).unwrap();
        let channel = GranuleChannel {
            block_type: BlockType::Short { is_mixed: false },
            rzero: 576,
            ..Default::default()
        };

        // First band at 44.1 kHz is 4 lines wide: windows at 0..4, 4..8,
        // 8..12.
        let mut buf = [0f32; 576];
        for (i, sample) in buf.iter_mut().enumerate().take(12) {
            *sample = i as f32;
        }

        reorder(&header, &channel, &mut buf);

        let expected = [0., 4., 8., 1., 5., 9., 2., 6., 10., 3., 7., 11.];
        assert_eq!(&buf[..12], &expected);
    }

    #[test]
    fn long_blocks_are_not_reordered() {
        use crate::structs::header::FrameHeader;
        use crate::structs::side_info::GranuleChannel;

        let header = FrameHeader::read(0xfffb_9000).unwrap();
        let channel = GranuleChannel::default();

        let mut buf = [0f32; 576];
        buf[0] = 1.0;
        buf[5] = 2.0;

        reorder(&header, &channel, &mut buf);

        assert_eq!(buf[0], 1.0);
        assert_eq!(buf[5], 2.0);
    }

    #[test]
    fn frequency_inversion_flips_odd_samples_of_odd_subbands() {
        let mut samples = [1f32; 576];
        frequency_inversion(&mut samples);

        // subband 0 untouched
        assert!(samples[..18].iter().all(|&s| s == 1.0));
        // subband 1: odd samples negated
        assert_eq!(samples[18], 1.0);
        assert_eq!(samples[19], -1.0);
        assert_eq!(samples[35], -1.0);
        // subband 2 untouched
        assert_eq!(samples[37], 1.0);
    }
}
