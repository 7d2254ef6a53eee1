//! Huffman decoding of the spectral samples (part3 of the main data).
//!
//! The big-values partition codes sample pairs from up to three regions,
//! each with its own codebook; magnitudes of 15 are extended with the
//! codebook's linbits. The count1 partition codes quadruples of +-1 values
//! until the part3 bit budget runs out. Samples are written as signed
//! `magnitude^(4/3)` values so requantization only has to apply gains.

use crate::process::requantize::REQUANTIZE_POW43;
use crate::structs::side_info::GranuleChannel;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;
use crate::utils::huffman_tables::{
    HUFF_LINBITS, HUFF_TAB_OFFSET, HUFF_TABLES, QUAD_TABLE_A, QUAD_TABLE_B,
};

/// Decodes one granule-channel's spectral samples into `buf`.
///
/// `part3_bits` is the Huffman data budget: `part2_3_length` minus the bits
/// spent on scale factors. Returns the index of the first all-zero sample
/// (rzero); everything from there to 576 is zeroed.
pub fn read_huffman_samples(
    bs: &mut BsIoSliceReader<'_>,
    channel: &GranuleChannel,
    part3_bits: u32,
    buf: &mut [f32; 576],
) -> Result<usize, DecodeError> {
    let mut bits_read: u32 = 0;
    let mut i = 0;

    // Each big_value codes a pair of samples.
    let big_values_len = 2 * channel.big_values as usize;

    let regions = [
        channel.region1_start.min(big_values_len),
        channel.region2_start.min(big_values_len),
        big_values_len,
    ];

    for (region_idx, &region_end) in regions.iter().enumerate() {
        let table = channel.table_select[region_idx] as usize;

        // Tables 4 and 14 do not exist and cannot appear in a valid stream.
        if table == 4 || table == 14 {
            return Err(DecodeError::BadHuffmanTable);
        }

        // Table 0 codes no bits; the whole region is zero.
        if table == 0 {
            while i < region_end {
                buf[i] = 0.0;
                i += 1;
            }
            continue;
        }

        let codebook = &HUFF_TABLES[HUFF_TAB_OFFSET[table]..];
        let linbits = HUFF_LINBITS[table];

        while i < region_end {
            // Walk the jump table: negative entries are internal nodes
            // packed as -(offset << 3 | next_peek_width).
            let mut w = 5;
            let mut leaf = codebook[bs.peek_n(w)? as usize] as i32;

            while leaf < 0 {
                bs.skip_n(w)?;
                bits_read += w;

                w = (leaf & 7) as u32;
                leaf = codebook[(bs.peek_n(w)? as i32 - (leaf >> 3)) as usize] as i32;
            }

            // Bits 8.. of a leaf hold the codeword length still unconsumed.
            bs.skip_n((leaf >> 8) as u32)?;
            bits_read += (leaf >> 8) as u32;

            // The two magnitudes sit in the leaf's low nibbles, x first.
            for _ in 0..2 {
                let mag = (leaf & 0xf) as usize;
                leaf >>= 4;

                buf[i] = if mag == 15 && linbits > 0 {
                    let ext: u32 = bs.get_n(linbits)?;
                    bits_read += linbits + 1;

                    let sample = REQUANTIZE_POW43[15 + ext as usize];
                    if bs.get()? { -sample } else { sample }
                } else if mag > 0 {
                    bits_read += 1;

                    let sample = REQUANTIZE_POW43[mag];
                    if bs.get()? { -sample } else { sample }
                } else {
                    0.0
                };

                i += 1;
            }

            if bits_read > part3_bits {
                return Err(DecodeError::BadHuffmanData);
            }
        }
    }

    // The count1 partition runs until the bit budget is exhausted. A quad
    // whose codeword crosses the budget boundary belongs to the padding and
    // is discarded.
    let codebook: &[u8] =
        if channel.count1table_select == 1 { &QUAD_TABLE_A } else { &QUAD_TABLE_B };

    while i <= 572 && bits_read < part3_bits {
        let mut leaf = u32::from(codebook[bs.peek_n(4)? as usize]);

        // Bit 3 clear marks a first-level entry pointing at a second-level
        // row indexed by the next leaf&3 bits.
        if leaf & 8 == 0 {
            let n = leaf & 3;
            let ext = bs.peek_n(4 + n)? & ((1 << n) - 1);
            leaf = u32::from(codebook[((leaf >> 3) + ext) as usize]);
        }

        bs.skip_n(leaf & 7)?;
        bits_read += leaf & 7;

        if bits_read > part3_bits {
            break;
        }

        for j in 0..4 {
            buf[i + j] = if leaf & (128 >> j) != 0 {
                bits_read += 1;
                if bs.get()? { -1.0 } else { 1.0 }
            } else {
                0.0
            };
        }

        i += 4;
    }

    let rzero = i;

    // Anything not coded is zero.
    while i < 576 {
        buf[i] = 0.0;
        i += 1;
    }

    Ok(rzero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bitstream_io::BitWriter;

    fn channel_with(table: [u8; 3], big_values: u16) -> GranuleChannel {
        GranuleChannel {
            big_values,
            table_select: table,
            region1_start: 576,
            region2_start: 576,
            ..Default::default()
        }
    }

    #[test]
    fn big_values_pairs_with_signs() {
        // Codebook 1: "000" -> (1,1), "01" -> (1,0). One sign bit follows
        // each non-zero magnitude.
        let mut bw = BitWriter::new();
        bw.push(0b000, 3);
        bw.push(1, 1); // x negative
        bw.push(0, 1); // y positive
        bw.push(0b01, 2);
        bw.push(1, 1); // x negative
        let bytes = bw.finish();

        let channel = channel_with([1, 1, 1], 2);
        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let mut buf = [f32::NAN; 576];

        let rzero = read_huffman_samples(&mut bs, &channel, 8, &mut buf).unwrap();

        assert_eq!(rzero, 4);
        assert_eq!(buf[0], -1.0);
        assert_eq!(buf[1], 1.0);
        assert_eq!(buf[2], -1.0);
        assert_eq!(buf[3], 0.0);
        assert!(buf[4..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn table_zero_region_is_silent() {
        let channel = channel_with([0, 0, 0], 4);
        let mut bs = BsIoSliceReader::from_slice(&[]);
        let mut buf = [f32::NAN; 576];

        let rzero = read_huffman_samples(&mut bs, &channel, 0, &mut buf).unwrap();

        assert_eq!(rzero, 8);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn invalid_table_select_is_rejected() {
        for table in [4, 14] {
            let channel = channel_with([table, 0, 0], 1);
            let mut bs = BsIoSliceReader::from_slice(&[0xff; 8]);
            let mut buf = [0f32; 576];

            let err = read_huffman_samples(&mut bs, &channel, 64, &mut buf).unwrap_err();
            assert_eq!(err, DecodeError::BadHuffmanTable);
        }
    }

    #[test]
    fn big_values_overrunning_the_budget_fail() {
        let mut bw = BitWriter::new();
        bw.push(0b000, 3);
        bw.push(0, 1);
        bw.push(0, 1);
        let bytes = bw.finish();

        let channel = channel_with([1, 1, 1], 1);
        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let mut buf = [0f32; 576];

        let err = read_huffman_samples(&mut bs, &channel, 2, &mut buf).unwrap_err();
        assert_eq!(err, DecodeError::BadHuffmanData);
    }

    #[test]
    fn count1_quads() {
        // Quad table A maps the 4-bit codeword directly; "0000" decodes to
        // four coded samples, each followed by a sign bit.
        let mut bw = BitWriter::new();
        bw.push(0b0000, 4);
        bw.push(0b1010, 4); // signs: -, +, -, +
        let bytes = bw.finish();

        let channel = GranuleChannel {
            count1table_select: 1,
            ..Default::default()
        };

        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let mut buf = [f32::NAN; 576];

        let rzero = read_huffman_samples(&mut bs, &channel, 8, &mut buf).unwrap();

        assert_eq!(rzero, 4);
        assert_eq!(&buf[..4], &[-1.0, 1.0, -1.0, 1.0]);
        assert!(buf[4..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn count1_quad_crossing_the_budget_is_discarded() {
        let mut bw = BitWriter::new();
        bw.push(0b0000, 4);
        bw.push(0b0000, 4); // all positive
        bw.push(0b0000, 4); // second quad codeword, crosses the budget
        let bytes = bw.finish();

        let channel = GranuleChannel {
            count1table_select: 1,
            ..Default::default()
        };

        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let mut buf = [0f32; 576];

        let rzero = read_huffman_samples(&mut bs, &channel, 10, &mut buf).unwrap();

        // only the first quad fit the 10-bit budget
        assert_eq!(rzero, 4);
        assert_eq!(&buf[..4], &[1.0, 1.0, 1.0, 1.0]);
    }
}
