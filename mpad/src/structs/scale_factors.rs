//! Scale factor decoding (part2 of the main data).
//!
//! Scale factors precede the Huffman data of every granule-channel. MPEG-1
//! packs them with two bit lengths selected by `scalefac_compress`; MPEG-2
//! derives up to four bit lengths and band counts from the 9-bit
//! `scalefac_compress` value, with a separate mapping for the intensity
//! coded channel.

use crate::structs::side_info::{BlockType, GranuleChannel, SideInfo};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;

/// MPEG-1 scale factor bit lengths (slen1, slen2), indexed by
/// `scalefac_compress`. The first band group uses slen1, the rest slen2.
const SCALE_FACTOR_SLEN: [(u32, u32); 16] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (0, 3),
    (3, 0),
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 1),
    (2, 2),
    (2, 3),
    (3, 1),
    (3, 2),
    (3, 3),
    (4, 2),
    (4, 3),
];

/// MPEG-2 scale factor band counts per bit-length group, indexed by
/// `scalefac_compress` range and block type (long / short / mixed).
const SCALE_FACTOR_MPEG2_NSFB: [[[usize; 4]; 3]; 6] = [
    // Intensity coded channel.
    [[7, 7, 7, 0], [12, 12, 12, 0], [6, 15, 12, 0]],
    [[6, 6, 6, 3], [12, 9, 9, 6], [6, 12, 9, 6]],
    [[8, 8, 5, 0], [15, 12, 9, 0], [6, 18, 9, 0]],
    // All other channels.
    [[6, 5, 5, 5], [9, 9, 9, 9], [6, 9, 9, 9]],
    [[6, 5, 7, 3], [9, 9, 12, 6], [6, 9, 12, 6]],
    [[11, 10, 0, 0], [18, 18, 0, 0], [15, 18, 0, 0]],
];

/// Reads MPEG-1 scale factors for one granule-channel, honoring the scfsi
/// copy from granule 0. Returns the number of bits consumed.
pub fn read_scale_factors_mpeg1(
    bs: &mut BsIoSliceReader<'_>,
    gr: usize,
    ch: usize,
    si: &mut SideInfo,
) -> Result<u32, DecodeError> {
    let mut bits_read = 0;

    let channel = &mut si.granules[gr].channels[ch];
    let (slen1, slen2) = SCALE_FACTOR_SLEN[channel.scalefac_compress as usize];

    if let BlockType::Short { is_mixed } = channel.block_type {
        // Mixed blocks put 8 long bands before the short windows; pure short
        // blocks start with 6 bands of 3 windows. Either way the first
        // partition uses slen1 and the final 6 bands of 3 windows use slen2.
        let n_sfb = if is_mixed { 8 + 3 * 3 } else { 6 * 3 };

        if slen1 > 0 {
            for sfb in 0..n_sfb {
                channel.scalefacs[sfb] = bs.get_n(slen1)?;
            }
            bits_read += n_sfb as u32 * slen1;
        }

        if slen2 > 0 {
            for sfb in n_sfb..(n_sfb + 6 * 3) {
                channel.scalefacs[sfb] = bs.get_n(slen2)?;
            }
            bits_read += 6 * 3 * slen2;
        }
    } else {
        // 21 long bands in four groups; the first two groups use slen1, the
        // last two slen2. Each group may be copied from granule 0 via scfsi.
        const SCALE_FACTOR_BANDS: [(usize, usize); 4] = [(0, 6), (6, 11), (11, 16), (16, 21)];

        for (i, &(start, end)) in SCALE_FACTOR_BANDS.iter().enumerate() {
            let slen = if i < 2 { slen1 } else { slen2 };

            if gr > 0 && si.scfsi[ch][i] {
                let [granule0, granule1] = &mut si.granules;

                granule1.channels[ch].scalefacs[start..end]
                    .copy_from_slice(&granule0.channels[ch].scalefacs[start..end]);
            } else if slen > 0 {
                for sfb in start..end {
                    si.granules[gr].channels[ch].scalefacs[sfb] = bs.get_n(slen)?;
                }
                bits_read += slen * (end - start) as u32;
            }
        }
    }

    Ok(bits_read)
}

/// Reads MPEG-2 scale factors for one granule-channel. Returns the number of
/// bits consumed. `is_intensity` selects the alternative mapping used for
/// the second channel of an intensity stereo frame.
pub fn read_scale_factors_mpeg2(
    bs: &mut BsIoSliceReader<'_>,
    is_intensity: bool,
    channel: &mut GranuleChannel,
) -> Result<u32, DecodeError> {
    let mut bits_read = 0;

    let block_index = match channel.block_type {
        BlockType::Short { is_mixed: true } => 2,
        BlockType::Short { is_mixed: false } => 1,
        _ => 0,
    };

    let (slen_table, nsfb_table) = if is_intensity {
        // The intensity channel drops the low bit of scalefac_compress.
        let sfc = u32::from(channel.scalefac_compress) >> 1;

        match sfc {
            0..=179 => (
                [sfc / 36, (sfc % 36) / 6, (sfc % 36) % 6, 0],
                &SCALE_FACTOR_MPEG2_NSFB[0][block_index],
            ),
            180..=243 => (
                [((sfc - 180) % 64) >> 4, ((sfc - 180) % 16) >> 2, (sfc - 180) % 4, 0],
                &SCALE_FACTOR_MPEG2_NSFB[1][block_index],
            ),
            244..=255 => (
                [(sfc - 244) / 3, (sfc - 244) % 3, 0, 0],
                &SCALE_FACTOR_MPEG2_NSFB[2][block_index],
            ),
            _ => unreachable!(),
        }
    } else {
        let sfc = u32::from(channel.scalefac_compress);

        // Preflag is implicit for MPEG-2 (ISO/IEC 13818-3 2.4.3.4).
        channel.preflag = sfc >= 500;

        match sfc {
            0..=399 => (
                [(sfc >> 4) / 5, (sfc >> 4) % 5, (sfc % 16) >> 2, sfc % 4],
                &SCALE_FACTOR_MPEG2_NSFB[3][block_index],
            ),
            400..=499 => (
                [((sfc - 400) >> 2) / 5, ((sfc - 400) >> 2) % 5, (sfc - 400) % 4, 0],
                &SCALE_FACTOR_MPEG2_NSFB[4][block_index],
            ),
            500..=512 => (
                [(sfc - 500) / 3, (sfc - 500) % 3, 0, 0],
                &SCALE_FACTOR_MPEG2_NSFB[5][block_index],
            ),
            _ => unreachable!(),
        }
    };

    let mut start = 0;

    for (&slen, &n_sfb) in slen_table.iter().zip(nsfb_table.iter()) {
        // Bands in a zero-length group keep their preinitialized zero.
        if slen > 0 {
            for sfb in start..(start + n_sfb) {
                channel.scalefacs[sfb] = bs.get_n(slen)?;
            }
            bits_read += slen * n_sfb as u32;
        }

        start += n_sfb;
    }

    Ok(bits_read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bitstream_io::BitWriter;

    #[test]
    fn mpeg1_long_block_groups() {
        let mut si = SideInfo::default();
        // scalefac_compress 10 -> slen1 = 2, slen2 = 3
        si.granules[0].channels[0].scalefac_compress = 10;

        let mut bw = BitWriter::new();
        for sfb in 0..11 {
            bw.push(sfb & 0x3, 2);
        }
        for sfb in 11..21 {
            bw.push(sfb & 0x7, 3);
        }
        let bytes = bw.finish();

        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let bits = read_scale_factors_mpeg1(&mut bs, 0, 0, &mut si).unwrap();

        assert_eq!(bits, 11 * 2 + 10 * 3);
        let sf = &si.granules[0].channels[0].scalefacs;
        assert_eq!(sf[0], 0);
        assert_eq!(sf[5], 1);
        assert_eq!(sf[11], 3);
        assert_eq!(sf[20], 4);
    }

    #[test]
    fn mpeg1_scfsi_copies_granule0() {
        let mut si = SideInfo::default();
        si.scfsi[0] = [false, true, false, true];

        // fill granule 0 with a recognizable ramp
        for sfb in 0..21 {
            si.granules[0].channels[0].scalefacs[sfb] = sfb as u8;
        }
        // slen1 = slen2 = 1
        si.granules[1].channels[0].scalefac_compress = 5;

        // groups 0 and 2 are read (6 + 5 bands of one bit each), 1 and 3 copied
        let mut bw = BitWriter::new();
        bw.push(0b111111, 6);
        bw.push(0b11111, 5);
        let bytes = bw.finish();

        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let bits = read_scale_factors_mpeg1(&mut bs, 1, 0, &mut si).unwrap();
        assert_eq!(bits, 11);

        let sf = &si.granules[1].channels[0].scalefacs;
        assert_eq!(sf[0], 1);
        assert_eq!(&sf[6..11], &[6, 7, 8, 9, 10]);
        assert_eq!(sf[11], 1);
        assert_eq!(&sf[16..21], &[16, 17, 18, 19, 20]);
    }

    #[test]
    fn mpeg1_short_block_windows() {
        let mut si = SideInfo::default();
        let channel = &mut si.granules[0].channels[0];
        channel.block_type = BlockType::Short { is_mixed: false };
        // scalefac_compress 4 -> slen1 = 3, slen2 = 0
        channel.scalefac_compress = 4;

        let mut bw = BitWriter::new();
        for sfb in 0..18 {
            bw.push(sfb & 0x7, 3);
        }
        let bytes = bw.finish();

        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let bits = read_scale_factors_mpeg1(&mut bs, 0, 0, &mut si).unwrap();

        assert_eq!(bits, 18 * 3);
        let sf = &si.granules[0].channels[0].scalefacs;
        assert_eq!(sf[17], 1);
        // slen2 bands stay zero
        assert_eq!(&sf[18..36], &[0; 18]);
    }

    #[test]
    fn mpeg2_preflag_from_scalefac_compress() {
        let mut channel = GranuleChannel {
            scalefac_compress: 500,
            ..Default::default()
        };

        // sfc 500 -> slens [0, 0, 0, 0], no bits read, preflag on
        let mut bs = BsIoSliceReader::from_slice(&[]);
        let bits = read_scale_factors_mpeg2(&mut bs, false, &mut channel).unwrap();

        assert_eq!(bits, 0);
        assert!(channel.preflag);

        let mut channel = GranuleChannel {
            scalefac_compress: 499,
            ..Default::default()
        };

        // sfc 499 -> slens [4, 4, 3, 0] over [6, 5, 7] long bands
        let bytes = [0xff; 16];
        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let bits = read_scale_factors_mpeg2(&mut bs, false, &mut channel).unwrap();

        assert_eq!(bits, 6 * 4 + 5 * 4 + 7 * 3);
        assert!(!channel.preflag);
        assert_eq!(channel.scalefacs[0], 15);
        assert_eq!(channel.scalefacs[11], 7);
    }

    #[test]
    fn mpeg2_intensity_channel_mapping() {
        let mut channel = GranuleChannel {
            // sfc >> 1 = 100 -> slens [2, 4, 4, 0] over [7, 7, 7] long bands
            scalefac_compress: 200,
            ..Default::default()
        };

        let bytes = [0xff; 16];
        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let bits = read_scale_factors_mpeg2(&mut bs, true, &mut channel).unwrap();

        assert_eq!(bits, 7 * 2 + 7 * 4 + 7 * 4);
        assert!(!channel.preflag);
        assert_eq!(channel.scalefacs[0], 3);
        assert_eq!(channel.scalefacs[7], 15);
    }
}
