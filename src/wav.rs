use std::io::{BufWriter, Seek, SeekFrom, Write};

use anyhow::{Result, bail};

const RIFF_HEADER_LEN: u32 = 44;

/// Streaming RIFF/WAVE writer for 16-bit integer PCM.
///
/// The RIFF and data chunk sizes are written as placeholders and patched on
/// [`WavWriter::finish`], so the output target must be seekable.
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    sample_rate: u32,
    channels: u16,
    data_bytes: u32,
    header_written: bool,
    finished: bool,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(inner: W, sample_rate: u32, channels: u16) -> Self {
        Self {
            writer: BufWriter::new(inner),
            sample_rate,
            channels,
            data_bytes: 0,
            header_written: false,
            finished: false,
        }
    }

    /// Write the RIFF header with zeroed chunk sizes.
    pub fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            bail!("WAV header already written");
        }
        if self.channels == 0 || self.sample_rate == 0 {
            bail!(
                "invalid WAV format: {} channels at {} Hz",
                self.channels,
                self.sample_rate
            );
        }

        let block_align = self.channels * 2;
        let byte_rate = self.sample_rate * u32::from(block_align);

        self.writer.write_all(b"RIFF")?;
        self.writer.write_all(&0u32.to_le_bytes())?; // patched in finish()
        self.writer.write_all(b"WAVE")?;

        self.writer.write_all(b"fmt ")?;
        self.writer.write_all(&16u32.to_le_bytes())?;
        self.writer.write_all(&1u16.to_le_bytes())?; // integer PCM
        self.writer.write_all(&self.channels.to_le_bytes())?;
        self.writer.write_all(&self.sample_rate.to_le_bytes())?;
        self.writer.write_all(&byte_rate.to_le_bytes())?;
        self.writer.write_all(&block_align.to_le_bytes())?;
        self.writer.write_all(&16u16.to_le_bytes())?;

        self.writer.write_all(b"data")?;
        self.writer.write_all(&0u32.to_le_bytes())?; // patched in finish()

        self.header_written = true;
        Ok(())
    }

    /// Append interleaved 16-bit samples to the data chunk.
    pub fn write_pcm_16bit(&mut self, samples: &[i16]) -> Result<()> {
        if !self.header_written {
            bail!("WAV header must be written before sample data");
        }

        for sample in samples {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.data_bytes += (samples.len() * 2) as u32;
        Ok(())
    }

    /// Patch the chunk sizes and flush the stream.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if !self.header_written {
            bail!("cannot finish a WAV file without a header");
        }

        self.writer.flush()?;

        let riff_size = RIFF_HEADER_LEN - 8 + self.data_bytes;
        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_all(&riff_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(40))?;
        self.writer.write_all(&self.data_bytes.to_le_bytes())?;

        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Total sample frames written so far.
    pub fn frames_written(&self) -> u64 {
        u64::from(self.data_bytes) / (u64::from(self.channels) * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_fields_are_patched_on_finish() {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()), 44_100, 2);
        writer.write_header().unwrap();
        writer.write_pcm_16bit(&[0, 1, -1, i16::MAX, i16::MIN, 2]).unwrap();
        writer.finish().unwrap();

        let buf = writer.writer.into_inner().unwrap().into_inner();
        assert_eq!(buf.len(), 44 + 12);

        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 36 + 12);
        assert_eq!(&buf[8..12], b"WAVE");

        // fmt chunk: PCM, stereo, 44.1 kHz, 176400 B/s, block align 4, 16 bit
        assert_eq!(u16::from_le_bytes(buf[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(buf[22..24].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(buf[24..28].try_into().unwrap()), 44_100);
        assert_eq!(u32::from_le_bytes(buf[28..32].try_into().unwrap()), 176_400);
        assert_eq!(u16::from_le_bytes(buf[32..34].try_into().unwrap()), 4);
        assert_eq!(u16::from_le_bytes(buf[34..36].try_into().unwrap()), 16);

        assert_eq!(&buf[36..40], b"data");
        assert_eq!(u32::from_le_bytes(buf[40..44].try_into().unwrap()), 12);

        // Samples are little-endian in write order.
        assert_eq!(&buf[44..48], &[0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn samples_before_header_are_rejected() {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()), 48_000, 1);
        assert!(writer.write_pcm_16bit(&[0]).is_err());

        writer.write_header().unwrap();
        writer.write_pcm_16bit(&[0; 6]).unwrap();
        assert_eq!(writer.frames_written(), 6);
    }
}
