//! Layer III side information.
//!
//! The side information immediately follows the header (and optional CRC)
//! and describes how to unpack the main data: the reservoir pointer, scale
//! factor selection, and per granule-channel Huffman parameters.

use crate::structs::header::{ChannelMode, FrameHeader, MpegVersion};
use crate::structs::sfb::SFB_LONG_BANDS;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;

/// Window type of one granule-channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BlockType {
    #[default]
    Long,
    Start,
    Short {
        is_mixed: bool,
    },
    End,
}

/// Huffman and requantization parameters for one channel of one granule.
#[derive(Debug)]
pub struct GranuleChannel {
    /// Total length in bits of part2 (scale factors) and part3 (Huffman
    /// data) for this granule-channel.
    pub part2_3_length: u16,
    /// Number of sample pairs coded by the big-values tables. At most 288.
    pub big_values: u16,
    pub global_gain: u8,
    pub scalefac_compress: u16,
    pub block_type: BlockType,
    /// Per-window gain offset, short blocks only.
    pub subblock_gain: [u8; 3],
    /// Huffman table numbers for the three big-values regions.
    pub table_select: [u8; 3],
    /// First frequency line of big-values region 1.
    pub region1_start: usize,
    /// First frequency line of big-values region 2.
    pub region2_start: usize,
    pub preflag: bool,
    pub scalefac_scale: bool,
    pub count1table_select: u8,
    /// Decoded scale factors. Long blocks use indices 0..21, short blocks
    /// 0..36 (three windows per band), mixed blocks 0..35.
    pub scalefacs: [u8; 39],
    /// Frequency line past which all samples are zero, set by the Huffman
    /// decoder.
    pub rzero: usize,
}

impl Default for GranuleChannel {
    fn default() -> Self {
        GranuleChannel {
            part2_3_length: 0,
            big_values: 0,
            global_gain: 0,
            scalefac_compress: 0,
            block_type: BlockType::Long,
            subblock_gain: [0; 3],
            table_select: [0; 3],
            region1_start: 0,
            region2_start: 0,
            preflag: false,
            scalefac_scale: false,
            count1table_select: 0,
            scalefacs: [0; 39],
            rzero: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct Granule {
    pub channels: [GranuleChannel; 2],
}

/// The decoded side information of one frame.
#[derive(Debug, Default)]
pub struct SideInfo {
    /// Negative byte offset of this frame's main data in the bit reservoir.
    pub main_data_begin: u16,
    /// Scale factor selection information: per channel, whether each of the
    /// four long-block band groups reuses granule 0's scale factors in
    /// granule 1. MPEG-1 only.
    pub scfsi: [[bool; 4]; 2],
    pub granules: [Granule; 2],
}

impl SideInfo {
    /// Reads the side information bits following the frame header.
    pub fn read(bs: &mut BsIoSliceReader<'_>, header: &FrameHeader) -> Result<Self, DecodeError> {
        let mut si = SideInfo::default();

        if header.is_mpeg1() {
            si.main_data_begin = bs.get_n(9)?;

            // private bits
            match header.channel_mode {
                ChannelMode::Mono => bs.skip_n(5)?,
                _ => bs.skip_n(3)?,
            }

            for scfsi in si.scfsi.iter_mut().take(header.n_channels()) {
                for band in scfsi.iter_mut() {
                    *band = bs.get()?;
                }
            }
        } else {
            si.main_data_begin = bs.get_n(8)?;

            match header.channel_mode {
                ChannelMode::Mono => bs.skip_n(1)?,
                _ => bs.skip_n(2)?,
            }
        }

        for granule in si.granules.iter_mut().take(header.n_granules()) {
            for channel in granule.channels.iter_mut().take(header.n_channels()) {
                read_granule_channel(bs, header, channel)?;
            }
        }

        Ok(si)
    }
}

fn read_granule_channel(
    bs: &mut BsIoSliceReader<'_>,
    header: &FrameHeader,
    channel: &mut GranuleChannel,
) -> Result<(), DecodeError> {
    channel.part2_3_length = bs.get_n(12)?;
    channel.big_values = bs.get_n(9)?;

    // One big_value codes two samples, so 288 pairs fill the granule.
    if channel.big_values > 288 {
        return Err(DecodeError::BadBigValues);
    }

    channel.global_gain = bs.get_n(8)?;

    channel.scalefac_compress =
        if header.is_mpeg1() { bs.get_n(4)? } else { bs.get_n(9)? };

    let window_switching = bs.get()?;

    if window_switching {
        let block_type_enc: u8 = bs.get_n(2)?;
        let is_mixed = bs.get()?;

        channel.block_type = match block_type_enc {
            // A switching granule is always transitional or short.
            0b00 => return Err(DecodeError::BadBlockType),
            0b01 => BlockType::Start,
            0b10 => BlockType::Short { is_mixed },
            0b11 => BlockType::End,
            _ => unreachable!(),
        };

        // Window switching implies two big-values regions, so only two
        // table selectors are present.
        for select in channel.table_select[..2].iter_mut() {
            *select = bs.get_n(5)?;
        }

        for gain in channel.subblock_gain.iter_mut() {
            *gain = bs.get_n(3)?;
        }

        // Region boundaries are implicit when switching. MPEG-1 long
        // transitions use the first 8 long bands and short blocks the first
        // 9 short windows, both summing to 36 lines; MPEG-2 long transitions
        // cover 54 lines; MPEG-2.5 takes band counts from the long table.
        channel.region1_start = match header.version {
            MpegVersion::Mpeg2p5 => {
                let region0_count = match channel.block_type {
                    BlockType::Short { is_mixed: false } => 5 + 1,
                    _ => 7 + 1,
                };
                SFB_LONG_BANDS[header.sample_rate_idx][region0_count]
            }
            _ if header.is_mpeg1() || block_type_enc == 0b10 => 36,
            _ => 54,
        };

        // region1 spans the rest of the spectrum.
        channel.region2_start = 576;
    } else {
        channel.block_type = BlockType::Long;

        for select in channel.table_select.iter_mut() {
            *select = bs.get_n(5)?;
        }

        // Region sizes are stored as band counts, one less than actual.
        let region0_count = bs.get_n::<u32>(4)? as usize + 1;
        let region0_1_count = bs.get_n::<u32>(3)? as usize + region0_count + 1;

        channel.region1_start = SFB_LONG_BANDS[header.sample_rate_idx][region0_count];

        // The summed count may exceed the last long band; clamp to the end
        // of the spectrum.
        channel.region2_start = match region0_1_count {
            0..=22 => SFB_LONG_BANDS[header.sample_rate_idx][region0_1_count],
            _ => 576,
        };
    }

    // For MPEG-2 streams preflag is implied by scalefac_compress and set
    // while reading scale factors.
    channel.preflag = if header.is_mpeg1() { bs.get()? } else { false };

    channel.scalefac_scale = bs.get()?;
    channel.count1table_select = bs.get_n(1)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::header::FrameHeader;
    use crate::utils::bitstream_io::BitWriter;

    fn mpeg1_stereo_header() -> FrameHeader {
        // 128 kbps, 44.1 kHz, stereo, no CRC
        FrameHeader::read(0xfffb_9000).unwrap()
    }

    #[test]
    fn all_zero_side_info_decodes_to_long_blocks() {
        let header = mpeg1_stereo_header();
        let bytes = [0u8; 32];
        let mut bs = BsIoSliceReader::from_slice(&bytes);

        let si = SideInfo::read(&mut bs, &header).unwrap();

        assert_eq!(si.main_data_begin, 0);
        for gr in 0..2 {
            for ch in 0..2 {
                let channel = &si.granules[gr].channels[ch];
                assert_eq!(channel.block_type, BlockType::Long);
                assert_eq!(channel.part2_3_length, 0);
                // region0_count 0 -> one band, region0_1_count -> two bands
                assert_eq!(channel.region1_start, 4);
                assert_eq!(channel.region2_start, 8);
            }
        }

        // all 256 side info bits consumed
        assert_eq!(bs.position().unwrap(), 256);
    }

    #[test]
    fn window_switching_granule() {
        let header = mpeg1_stereo_header();

        let mut bw = BitWriter::new();
        bw.push(5, 9); // main_data_begin
        bw.push(0, 3); // private bits
        bw.push(0, 8); // scfsi, both channels

        // granule 0 channel 0: short block, not mixed
        bw.push(1000, 12); // part2_3_length
        bw.push(100, 9); // big_values
        bw.push(210, 8); // global_gain
        bw.push(7, 4); // scalefac_compress
        bw.push(1, 1); // window switching
        bw.push(0b10, 2); // block_type: short
        bw.push(0, 1); // not mixed
        bw.push(13, 5); // table_select[0]
        bw.push(2, 5); // table_select[1]
        bw.push(1, 3); // subblock_gain[0]
        bw.push(2, 3);
        bw.push(3, 3);
        bw.push(0, 1); // preflag
        bw.push(1, 1); // scalefac_scale
        bw.push(1, 1); // count1table_select

        // remaining three granule-channels zeroed
        let mut bytes = bw.finish();
        bytes.resize(32, 0);

        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let si = SideInfo::read(&mut bs, &header).unwrap();

        assert_eq!(si.main_data_begin, 5);

        let channel = &si.granules[0].channels[0];
        assert_eq!(channel.part2_3_length, 1000);
        assert_eq!(channel.big_values, 100);
        assert_eq!(channel.block_type, BlockType::Short { is_mixed: false });
        assert_eq!(channel.table_select, [13, 2, 0]);
        assert_eq!(channel.subblock_gain, [1, 2, 3]);
        assert_eq!(channel.region1_start, 36);
        assert_eq!(channel.region2_start, 576);
        assert!(channel.scalefac_scale);
        assert_eq!(channel.count1table_select, 1);
    }

    #[test]
    fn oversized_big_values_is_rejected() {
        let header = mpeg1_stereo_header();

        let mut bw = BitWriter::new();
        bw.push(0, 9 + 3 + 8); // main_data_begin, private, scfsi
        bw.push(0, 12); // part2_3_length
        bw.push(289, 9); // big_values over the 288 limit

        let mut bytes = bw.finish();
        bytes.resize(32, 0);

        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let err = SideInfo::read(&mut bs, &header).unwrap_err();
        assert_eq!(err, DecodeError::BadBigValues);
    }

    #[test]
    fn reserved_block_type_is_rejected() {
        let header = mpeg1_stereo_header();

        let mut bw = BitWriter::new();
        bw.push(0, 9 + 3 + 8);
        bw.push(0, 12 + 9 + 8 + 4); // zeroed fields up to the switch flag
        bw.push(1, 1); // window switching
        bw.push(0b00, 2); // reserved block_type

        let mut bytes = bw.finish();
        bytes.resize(32, 0);

        let mut bs = BsIoSliceReader::from_slice(&bytes);
        let err = SideInfo::read(&mut bs, &header).unwrap_err();
        assert_eq!(err, DecodeError::BadBlockType);
    }
}
