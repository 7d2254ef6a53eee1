//! Frame header parsing and sync location.
//!
//! An MPEG audio frame starts on a byte boundary with an 11-bit sync word
//! (12 consecutive ones for MPEG 1/2 streams, 11 for 2.5). The remaining 21
//! header bits select version, layer, bitrate, sample rate, channel mode and
//! emphasis; every field with a reserved encoding invalidates the frame.
//!
//! ```text
//! 0b1111_1111 0b111v_vlly 0brrrr_hhpx 0bmmmm_coee
//!     vv   = version, ll = layer      , y = crc
//!     rrrr = bitrate, hh = sample rate, p = padding , x  = private bit
//!     mmmm = mode   , c  = copyright  , o = original, ee = emphasis
//! ```

use crate::utils::errors::DecodeError;

/// Length in bytes of the frame header word.
pub const HEADER_LEN: usize = 4;

const BIT_RATES_MPEG1_L1: [u32; 15] = [
    0, 32_000, 64_000, 96_000, 128_000, 160_000, 192_000, 224_000, 256_000, 288_000, 320_000,
    352_000, 384_000, 416_000, 448_000,
];

const BIT_RATES_MPEG1_L2: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000, 224_000,
    256_000, 320_000, 384_000,
];

const BIT_RATES_MPEG1_L3: [u32; 15] = [
    0, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000,
    224_000, 256_000, 320_000,
];

const BIT_RATES_MPEG2_L1: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 144_000, 160_000, 176_000,
    192_000, 224_000, 256_000,
];

const BIT_RATES_MPEG2_L23: [u32; 15] = [
    0, 8_000, 16_000, 24_000, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000,
    128_000, 144_000, 160_000,
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg2p5,
    Mpeg2,
    Mpeg1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MpegLayer {
    Layer1,
    Layer2,
    Layer3,
}

/// Joint stereo parameters carried in the mode extension bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JointStereoMode {
    /// Layer III joint stereo combines mid-side and intensity coding.
    Layer3 { mid_side: bool, intensity: bool },
    /// Layers I and II apply intensity coding to subbands `bound..32`.
    Intensity { bound: u32 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    Mono,
    DualMono,
    Stereo,
    JointStereo(JointStereoMode),
}

impl ChannelMode {
    #[inline(always)]
    pub fn count(&self) -> usize {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Emphasis {
    None,
    Fifty15,
    CcitJ17,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: MpegLayer,
    pub bitrate: u32,
    pub sample_rate: u32,
    pub sample_rate_idx: usize,
    pub channel_mode: ChannelMode,
    pub emphasis: Emphasis,
    pub is_copyrighted: bool,
    pub is_original: bool,
    pub has_padding: bool,
    pub has_crc: bool,
    /// Frame length in bytes after the 4-byte header word.
    pub frame_size: usize,
}

/// Returns true if the word starts with the 11-bit sync pattern.
#[inline(always)]
pub fn is_sync_word(word: u32) -> bool {
    (word & 0xffe0_0000) == 0xffe0_0000
}

/// Quick plausibility check used during sync scanning. Rejects words whose
/// version, layer, bitrate or sample rate field holds a reserved encoding so
/// random data that happens to contain a sync pattern is skipped silently.
#[inline]
pub fn check_header_word(word: u32) -> bool {
    if !is_sync_word(word) {
        return false;
    }
    // Version 0b01 is reserved.
    if (word >> 19) & 0x3 == 0x1 {
        return false;
    }
    // Layer 0b00 is reserved.
    if (word >> 17) & 0x3 == 0x0 {
        return false;
    }
    // Bitrate index 0b1111 is forbidden, 0b0000 is free format (unsupported).
    if (word >> 12) & 0xf == 0xf || (word >> 12) & 0xf == 0x0 {
        return false;
    }
    // Sample rate index 0b11 is reserved.
    if (word >> 10) & 0x3 == 0x3 {
        return false;
    }
    true
}

/// Scans `buf` from `from` for the next plausible frame header word.
///
/// Returns the byte offset of the header, or `None` when no further sync
/// exists in the buffer.
pub fn locate_sync(buf: &[u8], from: usize) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }

    (from..=buf.len() - HEADER_LEN).find(|&i| {
        check_header_word(u32::from_be_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]))
    })
}

impl FrameHeader {
    /// Parses a header word into its fields, validating every table index.
    pub fn read(word: u32) -> Result<Self, DecodeError> {
        let version = match (word & 0x18_0000) >> 19 {
            0b00 => MpegVersion::Mpeg2p5,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return Err(DecodeError::LostSync),
        };

        let layer = match (word & 0x6_0000) >> 17 {
            0b01 => MpegLayer::Layer3,
            0b10 => MpegLayer::Layer2,
            0b11 => MpegLayer::Layer1,
            _ => return Err(DecodeError::BadLayer),
        };

        let bitrate = match ((word & 0xf000) >> 12, version, layer) {
            // Free format is not a mandatory decoder feature and is not
            // supported here.
            (0b0000, _, _) => return Err(DecodeError::BadBitRate),
            (0b1111, _, _) => return Err(DecodeError::BadBitRate),
            (i, MpegVersion::Mpeg1, MpegLayer::Layer1) => BIT_RATES_MPEG1_L1[i as usize],
            (i, MpegVersion::Mpeg1, MpegLayer::Layer2) => BIT_RATES_MPEG1_L2[i as usize],
            (i, MpegVersion::Mpeg1, MpegLayer::Layer3) => BIT_RATES_MPEG1_L3[i as usize],
            (i, _, MpegLayer::Layer1) => BIT_RATES_MPEG2_L1[i as usize],
            (i, _, _) => BIT_RATES_MPEG2_L23[i as usize],
        };

        let (sample_rate, sample_rate_idx) = match ((word & 0xc00) >> 10, version) {
            (0b00, MpegVersion::Mpeg1) => (44_100, 0),
            (0b01, MpegVersion::Mpeg1) => (48_000, 1),
            (0b10, MpegVersion::Mpeg1) => (32_000, 2),
            (0b00, MpegVersion::Mpeg2) => (22_050, 3),
            (0b01, MpegVersion::Mpeg2) => (24_000, 4),
            (0b10, MpegVersion::Mpeg2) => (16_000, 5),
            (0b00, MpegVersion::Mpeg2p5) => (11_025, 6),
            (0b01, MpegVersion::Mpeg2p5) => (12_000, 7),
            (0b10, MpegVersion::Mpeg2p5) => (8_000, 8),
            _ => return Err(DecodeError::BadSampleRate),
        };

        let channel_mode = match ((word & 0xc0) >> 6, layer) {
            (0b00, _) => ChannelMode::Stereo,
            (0b10, _) => ChannelMode::DualMono,
            (0b11, _) => ChannelMode::Mono,
            (0b01, MpegLayer::Layer3) => ChannelMode::JointStereo(JointStereoMode::Layer3 {
                mid_side: word & 0x20 != 0x0,
                intensity: word & 0x10 != 0x0,
            }),
            (0b01, _) => ChannelMode::JointStereo(JointStereoMode::Intensity {
                bound: (1 + ((word & 0x30) >> 4)) << 2,
            }),
            _ => unreachable!(),
        };

        // Layer II forbids some bitrate/mode pairings.
        if layer == MpegLayer::Layer2 {
            if channel_mode == ChannelMode::Mono {
                if bitrate >= 224_000 {
                    return Err(DecodeError::BadMode);
                }
            } else if bitrate == 32_000
                || bitrate == 48_000
                || bitrate == 56_000
                || bitrate == 80_000
            {
                return Err(DecodeError::BadMode);
            }
        }

        let emphasis = match word & 0x3 {
            0b00 => Emphasis::None,
            0b01 => Emphasis::Fifty15,
            0b11 => Emphasis::CcitJ17,
            _ => return Err(DecodeError::BadEmphasis),
        };

        let is_copyrighted = word & 0x8 != 0x0;
        let is_original = word & 0x4 != 0x0;
        let has_padding = word & 0x200 != 0;
        let has_crc = word & 0x1_0000 == 0;

        // Slot counts per ISO/IEC 11172-3 2.4.3.1. Layer I slots are 4 bytes
        // wide, layers II and III use single bytes.
        let factor = match layer {
            MpegLayer::Layer1 => 12,
            MpegLayer::Layer2 => 144,
            MpegLayer::Layer3 if version == MpegVersion::Mpeg1 => 144,
            MpegLayer::Layer3 => 72,
        };

        let slot_size = match layer {
            MpegLayer::Layer1 => 4,
            _ => 1,
        };

        let frame_size_slots = (factor * bitrate / sample_rate) as usize + usize::from(has_padding);
        let frame_size = (frame_size_slots * slot_size) - HEADER_LEN;

        Ok(FrameHeader {
            version,
            layer,
            bitrate,
            sample_rate,
            sample_rate_idx,
            channel_mode,
            emphasis,
            is_copyrighted,
            is_original,
            has_padding,
            has_crc,
            frame_size,
        })
    }

    #[inline(always)]
    pub fn is_mpeg1(&self) -> bool {
        self.version == MpegVersion::Mpeg1
    }

    /// Number of granules in the frame.
    #[inline(always)]
    pub fn n_granules(&self) -> usize {
        match self.version {
            MpegVersion::Mpeg1 => 2,
            _ => 1,
        }
    }

    #[inline(always)]
    pub fn n_channels(&self) -> usize {
        self.channel_mode.count()
    }

    #[inline(always)]
    pub fn is_intensity_stereo(&self) -> bool {
        match self.channel_mode {
            ChannelMode::JointStereo(JointStereoMode::Intensity { .. }) => true,
            ChannelMode::JointStereo(JointStereoMode::Layer3 { intensity, .. }) => intensity,
            _ => false,
        }
    }

    #[inline(always)]
    pub fn is_mid_side_stereo(&self) -> bool {
        match self.channel_mode {
            ChannelMode::JointStereo(JointStereoMode::Layer3 { mid_side, .. }) => mid_side,
            _ => false,
        }
    }

    /// Side information length in bytes.
    #[inline(always)]
    pub fn side_info_len(&self) -> usize {
        match (self.version, self.channel_mode) {
            (MpegVersion::Mpeg1, ChannelMode::Mono) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, ChannelMode::Mono) => 9,
            (_, _) => 17,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0xfffb9000: MPEG-1 Layer III, no CRC, 128 kbps, 44.1 kHz, stereo.
    const HDR_128K_44100_STEREO: u32 = 0xfffb_9000;

    #[test]
    fn parse_typical_header() {
        let hdr = FrameHeader::read(HDR_128K_44100_STEREO).unwrap();

        assert_eq!(hdr.version, MpegVersion::Mpeg1);
        assert_eq!(hdr.layer, MpegLayer::Layer3);
        assert_eq!(hdr.bitrate, 128_000);
        assert_eq!(hdr.sample_rate, 44_100);
        assert_eq!(hdr.channel_mode, ChannelMode::Stereo);
        assert!(!hdr.has_crc);
        assert!(!hdr.has_padding);
        // 144 * 128000 / 44100 = 417 slots, minus the header word
        assert_eq!(hdr.frame_size, 413);
        assert_eq!(hdr.side_info_len(), 32);
        assert_eq!(hdr.n_granules(), 2);
    }

    #[test]
    fn reserved_fields_are_rejected() {
        // Bitrate index 15
        assert_eq!(
            FrameHeader::read(0xfffb_f000),
            Err(DecodeError::BadBitRate)
        );
        // Sample rate index 3
        assert_eq!(
            FrameHeader::read(0xfffb_9c00),
            Err(DecodeError::BadSampleRate)
        );
        // Layer 00
        assert_eq!(FrameHeader::read(0xfff9_9000), Err(DecodeError::BadLayer));
        // Emphasis 10
        assert_eq!(
            FrameHeader::read(0xfffb_9002),
            Err(DecodeError::BadEmphasis)
        );
    }

    #[test]
    fn sync_scan_skips_garbage() {
        let mut buf = vec![0x12, 0x34, 0xff, 0x56, 0x00];
        buf.extend_from_slice(&HDR_128K_44100_STEREO.to_be_bytes());

        assert_eq!(locate_sync(&buf, 0), Some(5));
        assert_eq!(locate_sync(&buf, 6), None);
        assert_eq!(locate_sync(&[0u8; 3], 0), None);
    }

    #[test]
    fn false_sync_is_rejected() {
        // Sync pattern followed by a reserved layer
        assert!(!check_header_word(0xfff9_9000));
        // Free-format bitrate
        assert!(!check_header_word(0xfffb_0000));
        assert!(check_header_word(HDR_128K_44100_STEREO));
    }
}
