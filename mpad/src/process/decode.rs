//! Frame-by-frame decoding session.
//!
//! [`Decoder`] owns everything that outlives a single frame: the input
//! cursor, the bit reservoir, the IMDCT overlap and polyphase filterbank
//! history, and the PCM output of the last synthesized frame. A session
//! alternates [`decode_frame`](Decoder::decode_frame) and
//! [`synth_frame`](Decoder::synth_frame); recoverable stream errors leave
//! the session usable and [`next_frame`](Decoder::next_frame) pointing at
//! the resynchronization position.

use crate::log_or_err;
use crate::process::huffman::read_huffman_samples;
use crate::process::hybrid::{antialias, frequency_inversion, hybrid_synthesis, reorder};
use crate::process::requantize::requantize;
use crate::process::stereo::stereo;
use crate::process::synth::{SynthesisState, synthesis};
use crate::structs::header::{FrameHeader, HEADER_LEN, MpegLayer, locate_sync};
use crate::structs::scale_factors::{read_scale_factors_mpeg1, read_scale_factors_mpeg2};
use crate::structs::side_info::SideInfo;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::{CRC_PROTECTION_ALG, Crc16};
use crate::utils::errors::DecodeError;
use crate::utils::reservoir::BitReservoir;

/// PCM samples per channel produced by one full MPEG-1 frame. LSF frames
/// carry a single granule and produce half as many.
pub const FRAME_SAMPLE_COUNT: usize = 1152;

const MAX_CHANNELS: usize = 2;
const MAX_GRANULES: usize = 2;
const SAMPLES_PER_GRANULE: usize = 576;

const FRAME_CRC: Crc16 = Crc16::new(&CRC_PROTECTION_ALG);

/// Reclassifies bit exhaustion during part2/part3 unpacking. `BufferLength`
/// is reserved for "no complete frame fits in the remaining input"; running
/// dry inside a frame's main data is a stream-content error.
fn main_data_error(e: DecodeError) -> DecodeError {
    match e {
        DecodeError::BufferLength => DecodeError::BadAudioLength,
        other => other,
    }
}

/// A Layer III decoding session over one caller-owned input buffer.
pub struct Decoder<'a> {
    input: &'a [u8],
    current_frame: usize,
    next_frame: usize,

    pub fail_level: log::Level,
    ignore_crc: bool,

    error: Option<DecodeError>,

    header: Option<FrameHeader>,
    reservoir: BitReservoir,
    samples: [[[f32; SAMPLES_PER_GRANULE]; MAX_CHANNELS]; MAX_GRANULES],
    overlap: [[[f32; 18]; 32]; MAX_CHANNELS],

    filterbank: [SynthesisState; MAX_CHANNELS],
    pcm: [[f32; FRAME_SAMPLE_COUNT]; MAX_CHANNELS],
    pcm_len: usize,
    sample_rate: u32,
    channels: usize,
    synth_pending: bool,
}

impl Default for Decoder<'_> {
    fn default() -> Self {
        Self {
            input: &[],
            current_frame: 0,
            next_frame: 0,
            fail_level: log::Level::Error,
            ignore_crc: false,
            error: None,
            header: None,
            reservoir: BitReservoir::default(),
            samples: [[[0f32; SAMPLES_PER_GRANULE]; MAX_CHANNELS]; MAX_GRANULES],
            overlap: [[[0f32; 18]; 32]; MAX_CHANNELS],
            filterbank: [SynthesisState::default(), SynthesisState::default()],
            pcm: [[0f32; FRAME_SAMPLE_COUNT]; MAX_CHANNELS],
            pcm_len: 0,
            sample_rate: 0,
            channels: 0,
            synth_pending: false,
        }
    }
}

impl<'a> Decoder<'a> {
    /// Installs a new input buffer and rewinds the stream cursor.
    ///
    /// The reservoir and filterbank history survive, so a stream may be fed
    /// in pieces: copy the bytes from [`next_frame`](Self::next_frame)
    /// onward into the new buffer and continue decoding.
    pub fn set_input(&mut self, input: &'a [u8]) {
        self.input = input;
        self.current_frame = 0;
        self.next_frame = 0;
        self.error = None;
    }

    /// Decodes the next frame in the buffer up to the subband samples.
    ///
    /// Returns `true` on success. On failure the error is retained for the
    /// [`error`](Self::error) accessors and the cursor advances past the
    /// offending data when the stream content was at fault, or stays at the
    /// frame start when the buffer simply ended short.
    pub fn decode_frame(&mut self) -> bool {
        self.error = None;

        match self.decode_frame_inner() {
            Ok(()) => true,
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }

    fn decode_frame_inner(&mut self) -> Result<(), DecodeError> {
        let input = self.input;

        let Some(start) = locate_sync(input, self.next_frame) else {
            // No sync in the remainder. Keep the unscanned tail bytes
            // available for the caller's next buffer, a sync word may
            // straddle the boundary.
            self.next_frame = self.next_frame.max(input.len().saturating_sub(HEADER_LEN - 1));
            return Err(DecodeError::BufferLength);
        };

        self.current_frame = start;

        let word = u32::from_be_bytes([
            input[start],
            input[start + 1],
            input[start + 2],
            input[start + 3],
        ]);

        let header = match FrameHeader::read(word) {
            Ok(header) => header,
            Err(e) => {
                // A false sync that slipped past the scan filter; resume
                // scanning one byte further.
                self.next_frame = start + 1;
                return Err(e);
            }
        };

        let frame_end = start + HEADER_LEN + header.frame_size;

        if frame_end > input.len() {
            // The frame is cut off. Leave the cursor at the frame start so
            // the caller can re-supply it whole.
            self.next_frame = start;
            return Err(DecodeError::BufferLength);
        }

        self.next_frame = frame_end;

        // Layers I and II are recognized but not decoded.
        if header.layer != MpegLayer::Layer3 {
            return Err(DecodeError::BadLayer);
        }

        let payload = &input[start + HEADER_LEN..frame_end];
        let side_info_len = header.side_info_len();
        let crc_len = if header.has_crc { 2 } else { 0 };

        if payload.len() < crc_len + side_info_len {
            return Err(DecodeError::BadFrameLength);
        }

        if header.has_crc {
            // The checksum covers the last two header bytes and the side
            // information.
            let expected = u16::from_be_bytes([payload[0], payload[1]]);

            let crc = FRAME_CRC.update(FRAME_CRC.init, &input[start + 2..start + 4]);
            let crc = FRAME_CRC.update(crc, &payload[2..2 + side_info_len]);

            if crc != expected {
                if self.ignore_crc {
                    log_or_err!(self, log::Level::Warn, DecodeError::BadCrc);
                } else {
                    return Err(DecodeError::BadCrc);
                }
            }
        }

        let mut si = {
            let mut bs = BsIoSliceReader::from_slice(&payload[crc_len..crc_len + side_info_len]);
            SideInfo::read(&mut bs, &header)?
        };

        let main_data = &payload[crc_len + side_info_len..];
        let reservoir_start =
            self.reservoir.fill(main_data, usize::from(si.main_data_begin))?;

        self.read_main_data(&header, &mut si, reservoir_start)?;

        for gr in 0..header.n_granules() {
            let granule = &mut si.granules[gr];
            let samples = &mut self.samples[gr];

            for ch in 0..header.n_channels() {
                requantize(&header, &granule.channels[ch], &mut samples[ch]);
            }

            stereo(&header, granule, samples)?;

            for ch in 0..header.n_channels() {
                let channel = &granule.channels[ch];

                reorder(&header, channel, &mut samples[ch]);
                antialias(channel, &mut samples[ch]);
                hybrid_synthesis(channel, &mut self.overlap[ch], &mut samples[ch]);
                frequency_inversion(&mut samples[ch]);
            }
        }

        self.header = Some(header);
        self.synth_pending = true;

        Ok(())
    }

    /// Unpacks part2 (scale factors) and part3 (Huffman data) of every
    /// granule-channel from the bit reservoir.
    ///
    /// Bit exhaustion inside a granule-channel means the side info lengths
    /// contradict the main data actually present, so it surfaces as the
    /// recoverable [`DecodeError::BadAudioLength`] rather than an input
    /// buffer error; the recovery cursor already points at the next frame.
    fn read_main_data(
        &mut self,
        header: &FrameHeader,
        si: &mut SideInfo,
        reservoir_start: usize,
    ) -> Result<(), DecodeError> {
        let bytes = self.reservoir.bytes_ref();

        // Bit cursor over the reservoir. Each granule-channel starts exactly
        // part2_3_length bits after the previous one regardless of how many
        // bits its decode actually consumed; trailing slack is ancillary
        // data.
        let mut part2_3_begin = reservoir_start << 3;

        for gr in 0..header.n_granules() {
            for ch in 0..header.n_channels() {
                let tail =
                    bytes.get(part2_3_begin >> 3..).ok_or(DecodeError::BadHuffmanData)?;

                let mut bs = BsIoSliceReader::from_slice(tail);
                bs.skip_n((part2_3_begin & 7) as u32)
                    .map_err(|_| DecodeError::BadHuffmanData)?;

                let part2_3_length = u32::from(si.granules[gr].channels[ch].part2_3_length);

                let part2_len = if header.is_mpeg1() {
                    read_scale_factors_mpeg1(&mut bs, gr, ch, si).map_err(main_data_error)?
                } else {
                    let is_intensity = header.is_intensity_stereo() && ch > 0;
                    read_scale_factors_mpeg2(
                        &mut bs,
                        is_intensity,
                        &mut si.granules[gr].channels[ch],
                    )
                    .map_err(main_data_error)?
                };

                if part2_len > part2_3_length {
                    return Err(DecodeError::BadAudioLength);
                }

                let part3_bits = part2_3_length - part2_len;

                let channel = &mut si.granules[gr].channels[ch];
                channel.rzero = read_huffman_samples(
                    &mut bs,
                    channel,
                    part3_bits,
                    &mut self.samples[gr][ch],
                )
                .map_err(main_data_error)?;

                part2_3_begin += part2_3_length as usize;
            }
        }

        Ok(())
    }

    /// Runs the polyphase filterbank over the last decoded frame.
    ///
    /// Updates the PCM buffers and the [`sample_rate`](Self::sample_rate)
    /// and [`channels`](Self::channels) accessors. Calling this again
    /// without an intervening successful decode is a no-op: the PCM output
    /// and the filterbank history are left untouched.
    pub fn synth_frame(&mut self) {
        if !self.synth_pending {
            return;
        }

        let Some(header) = &self.header else {
            return;
        };

        let n_granules = header.n_granules();
        let n_channels = header.n_channels();

        for ch in 0..n_channels {
            for gr in 0..n_granules {
                synthesis(
                    &mut self.filterbank[ch],
                    18,
                    &self.samples[gr][ch],
                    &mut self.pcm[ch][gr * SAMPLES_PER_GRANULE..],
                );
            }
        }

        self.sample_rate = header.sample_rate;
        self.channels = n_channels;
        self.pcm_len = n_granules * SAMPLES_PER_GRANULE;
        self.synth_pending = false;
    }

    /// Byte offset of the most recently decoded (or attempted) frame.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Byte offset where the next decode will resume. After a short-buffer
    /// failure this is the start of the incomplete frame, for re-supply.
    pub fn next_frame(&self) -> usize {
        self.next_frame
    }

    /// Sample rate of the last synthesized frame. Zero before the first
    /// successful decode+synth pass.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the last synthesized frame. Zero before the first
    /// successful decode+synth pass.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// PCM samples of one channel from the last synthesized frame, in the
    /// range [-1.0, 1.0]. Valid until the next [`synth_frame`] call.
    ///
    /// [`synth_frame`]: Self::synth_frame
    pub fn pcm(&self, channel: usize) -> &[f32] {
        &self.pcm[channel][..self.pcm_len]
    }

    /// The error of the last failed [`decode_frame`](Self::decode_frame),
    /// cleared by the next call.
    pub fn error(&self) -> Option<DecodeError> {
        self.error
    }

    /// Whether the session remains usable: true when there is no error or
    /// the last error was a stream-content error.
    pub fn error_recoverable(&self) -> bool {
        self.error.is_none_or(|e| e.is_recoverable())
    }

    /// Human-readable message for the last error.
    pub fn error_message(&self) -> Option<String> {
        self.error.map(|e| e.to_string())
    }

    /// Decode frames whose CRC check fails, logging a warning instead.
    pub fn set_ignore_crc(&mut self, ignore: bool) {
        self.ignore_crc = ignore;
    }

    /// Sets the failure level for tolerated stream anomalies.
    ///
    /// - `log::Level::Error`: only fail on hard errors (default)
    /// - `log::Level::Warn`: fail on warnings too (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    /// Drops all cross-frame state: stream cursor, reservoir, IMDCT overlap,
    /// filterbank history and PCM output. The input buffer stays installed.
    pub fn reset(&mut self) {
        let input = self.input;
        let fail_level = self.fail_level;
        let ignore_crc = self.ignore_crc;

        *self = Decoder { input, fail_level, ignore_crc, ..Decoder::default() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // MPEG-1 Layer III, 128 kbps, 44.1 kHz, stereo, no CRC. 413 payload
    // bytes: 32 of side information, 381 of main data.
    const HDR_PLAIN: [u8; 4] = [0xff, 0xfb, 0x90, 0x00];
    // Same frame parameters with the protection bit set: payload starts
    // with a 2-byte CRC word.
    const HDR_CRC: [u8; 4] = [0xff, 0xfa, 0x90, 0x00];

    const PLAIN_FRAME_LEN: usize = 4 + 413;

    fn silent_frame() -> Vec<u8> {
        let mut frame = HDR_PLAIN.to_vec();
        frame.resize(PLAIN_FRAME_LEN, 0);
        frame
    }

    fn silent_crc_frame(checksum_offset: u16) -> Vec<u8> {
        let mut frame = HDR_CRC.to_vec();
        frame.resize(PLAIN_FRAME_LEN, 0);

        let crc = FRAME_CRC.update(FRAME_CRC.init, &frame[2..4]);
        let crc = FRAME_CRC.update(crc, &[0u8; 32]);

        frame[4..6].copy_from_slice(&(crc.wrapping_add(checksum_offset)).to_be_bytes());
        frame
    }

    #[test]
    fn silent_frame_decodes_to_silence() {
        let frame = silent_frame();

        let mut decoder = Decoder::default();
        decoder.set_input(&frame);

        assert!(decoder.decode_frame());
        assert_eq!(decoder.error(), None);
        assert_eq!(decoder.current_frame(), 0);
        assert_eq!(decoder.next_frame(), PLAIN_FRAME_LEN);

        decoder.synth_frame();

        assert_eq!(decoder.sample_rate(), 44_100);
        assert_eq!(decoder.channels(), 2);
        assert_eq!(decoder.pcm(0).len(), FRAME_SAMPLE_COUNT);
        assert_eq!(decoder.pcm(1).len(), FRAME_SAMPLE_COUNT);
        assert!(decoder.pcm(0).iter().all(|&s| s == 0.0));
        assert!(decoder.pcm(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn sync_is_located_past_garbage() {
        let mut buf = vec![0x00, 0x12, 0xff];
        buf.extend_from_slice(&silent_frame());

        let mut decoder = Decoder::default();
        decoder.set_input(&buf);

        assert!(decoder.decode_frame());
        assert_eq!(decoder.current_frame(), 3);
        assert_eq!(decoder.next_frame(), 3 + PLAIN_FRAME_LEN);
    }

    #[test]
    fn truncated_frame_waits_for_more_data() {
        let frame = silent_frame();

        let mut decoder = Decoder::default();
        decoder.set_input(&frame[..100]);

        assert!(!decoder.decode_frame());
        assert_eq!(decoder.error(), Some(DecodeError::BufferLength));
        assert!(!decoder.error_recoverable());
        // cursor stays at the frame start for re-supply
        assert_eq!(decoder.next_frame(), 0);

        decoder.set_input(&frame);
        assert!(decoder.decode_frame());
    }

    #[test]
    fn reserved_emphasis_resumes_one_byte_later() {
        // passes the sync scan filter but fails full header validation
        let mut buf = vec![0xff, 0xfb, 0x90, 0x02];
        buf.extend_from_slice(&[0u8; 16]);

        let mut decoder = Decoder::default();
        decoder.set_input(&buf);

        assert!(!decoder.decode_frame());
        assert_eq!(decoder.error(), Some(DecodeError::BadEmphasis));
        assert!(decoder.error_recoverable());
        assert_eq!(decoder.error_message().as_deref(), Some("reserved emphasis value"));
        assert_eq!(decoder.next_frame(), 1);
    }

    #[test]
    fn layer2_frames_are_skipped() {
        // Layer II header, otherwise plausible
        let mut buf = vec![0xff, 0xfd, 0x90, 0x00];
        buf.resize(4 + 518, 0);

        let mut decoder = Decoder::default();
        decoder.set_input(&buf);

        assert!(!decoder.decode_frame());
        assert_eq!(decoder.error(), Some(DecodeError::BadLayer));
        assert!(decoder.error_recoverable());
        // the whole frame is skipped
        assert_eq!(decoder.next_frame(), 4 + 518);
    }

    #[test]
    fn crc_protected_frame() {
        let frame = silent_crc_frame(0);

        let mut decoder = Decoder::default();
        decoder.set_input(&frame);

        assert!(decoder.decode_frame());
    }

    #[test]
    fn crc_mismatch_fails_unless_ignored() {
        let frame = silent_crc_frame(1);

        let mut decoder = Decoder::default();
        decoder.set_input(&frame);

        assert!(!decoder.decode_frame());
        assert_eq!(decoder.error(), Some(DecodeError::BadCrc));
        assert!(decoder.error_recoverable());

        let mut decoder = Decoder::default();
        decoder.set_ignore_crc(true);
        decoder.set_input(&frame);

        assert!(decoder.decode_frame());
    }

    #[test]
    fn strict_mode_rejects_ignored_crc_mismatch() {
        let frame = silent_crc_frame(1);

        let mut decoder = Decoder::default();
        decoder.set_ignore_crc(true);
        decoder.set_fail_level(log::Level::Warn);
        decoder.set_input(&frame);

        assert!(!decoder.decode_frame());
        assert_eq!(decoder.error(), Some(DecodeError::BadCrc));
    }

    #[test]
    fn overstated_part2_3_length_is_recoverable() {
        use crate::utils::bitstream_io::BitWriter;

        // 32 kbps stereo: 104-slot frame, 100-byte payload, so 68 bytes
        // (544 bits) of main data. Granule 0 channel 0 claims 2000 bits of
        // part2/part3 with a full 288 big_values against table 1, which
        // exhausts the reservoir mid-read.
        let mut bw = BitWriter::new();
        bw.push(0, 9); // main_data_begin
        bw.push(0, 3); // private bits
        bw.push(0, 8); // scfsi
        bw.push(2000, 12); // part2_3_length
        bw.push(288, 9); // big_values
        bw.push(210, 8); // global_gain
        bw.push(0, 4); // scalefac_compress
        bw.push(0, 1); // no window switching
        bw.push(1, 5); // table_select[0]
        bw.push(1, 5); // table_select[1]
        bw.push(1, 5); // table_select[2]
        bw.push(0, 4 + 3); // region counts
        bw.push(0, 3); // preflag, scalefac_scale, count1table_select

        let mut frame = vec![0xff, 0xfb, 0x10, 0x00];
        frame.extend_from_slice(&bw.finish());
        frame.resize(4 + 100, 0);

        let mut decoder = Decoder::default();
        decoder.set_input(&frame);

        assert!(!decoder.decode_frame());
        assert_eq!(decoder.error(), Some(DecodeError::BadAudioLength));
        assert!(decoder.error_recoverable());
        // the session resumes at the next frame boundary
        assert_eq!(decoder.next_frame(), frame.len());
    }

    #[test]
    fn synth_without_decode_is_idempotent() {
        let frame = silent_frame();

        let mut decoder = Decoder::default();
        decoder.set_input(&frame);

        assert!(decoder.decode_frame());
        decoder.synth_frame();

        let first: Vec<f32> = decoder.pcm(0).to_vec();

        decoder.synth_frame();
        decoder.synth_frame();

        assert_eq!(decoder.pcm(0), &first[..]);
        assert_eq!(decoder.pcm(0).len(), FRAME_SAMPLE_COUNT);
    }

    #[test]
    fn consecutive_frames_decode_from_one_buffer() {
        let mut buf = silent_frame();
        buf.extend_from_slice(&silent_frame());

        let mut decoder = Decoder::default();
        decoder.set_input(&buf);

        assert!(decoder.decode_frame());
        assert_eq!(decoder.current_frame(), 0);

        assert!(decoder.decode_frame());
        assert_eq!(decoder.current_frame(), PLAIN_FRAME_LEN);
        assert_eq!(decoder.next_frame(), 2 * PLAIN_FRAME_LEN);

        // no further sync in the buffer
        assert!(!decoder.decode_frame());
        assert_eq!(decoder.error(), Some(DecodeError::BufferLength));
    }

    #[test]
    fn reset_clears_cross_frame_state() {
        let frame = silent_frame();

        let mut decoder = Decoder::default();
        decoder.set_input(&frame);
        assert!(decoder.decode_frame());
        decoder.synth_frame();

        decoder.reset();

        assert_eq!(decoder.next_frame(), 0);
        assert_eq!(decoder.pcm(0).len(), 0);
        assert_eq!(decoder.sample_rate(), 0);
        assert_eq!(decoder.channels(), 0);

        // decoding restarts cleanly from the same buffer
        assert!(decoder.decode_frame());
    }
}
