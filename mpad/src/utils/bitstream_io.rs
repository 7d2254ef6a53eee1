//! Bitstream reading utilities.
//!
//! MSB-first big-endian bit cursor over the frame bytes, with the
//! non-consuming peek the Huffman codebook walk relies on.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    /// Returns the next `n` bits without consuming them.
    ///
    /// Bits past the end of the buffer read as zero, so a peek near the end
    /// of the stream never fails; only an actual consume can run short.
    #[inline(always)]
    pub fn peek_n(&mut self, n: u32) -> io::Result<u32> {
        let position = self.bs.position_in_bits()?;
        let take = (n as u64).min(self.len - position) as u32;
        if take == 0 {
            return Ok(0);
        }

        let value: u32 = self.bs.read_unsigned_var(take)?;
        self.bs.seek_bits(SeekFrom::Start(position))?;

        Ok(value << (n - take))
    }

    #[inline(always)]
    pub fn seek(&mut self, offset: i64) -> io::Result<u64> {
        if (offset < 0 && self.position()? as i64 + offset >= 0)
            || (offset >= 0 && self.available()? as i64 >= offset)
        {
            return self.bs.seek_bits(SeekFrom::Current(offset));
        }

        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "seek({}): out of bounds bits at {}",
                offset,
                self.position()?
            ),
        ))
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        // bitstream_io reports EOF on overruns itself
        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

/// Packs MSB-first bit fields into bytes for building test streams.
#[cfg(test)]
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    bit: usize,
}

#[cfg(test)]
impl BitWriter {
    pub(crate) fn new() -> Self {
        BitWriter { bytes: Vec::new(), bit: 0 }
    }

    pub(crate) fn push(&mut self, value: u32, n: usize) {
        for i in (0..n).rev() {
            if self.bit % 8 == 0 {
                self.bytes.push(0);
            }
            let byte = self.bytes.last_mut().unwrap();
            *byte |= ((((value as u64) >> i) & 1) as u8) << (7 - self.bit % 8);
            self.bit += 1;
        }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

#[test]
fn read_and_peek() -> io::Result<()> {
    let mut bs = BsIoSliceReader::from_slice(&[0b1011_0010, 0xff]);

    assert_eq!(bs.peek_n(4)?, 0b1011);
    assert_eq!(bs.get_n::<u32>(4)?, 0b1011);
    assert_eq!(bs.position()?, 4);
    assert_eq!(bs.available()?, 12);

    // peek does not move the cursor
    assert_eq!(bs.peek_n(8)?, 0b0010_1111);
    assert_eq!(bs.position()?, 4);

    bs.skip_n(8)?;
    assert_eq!(bs.get_n::<u32>(4)?, 0b1111);
    assert!(bs.get_n::<u32>(1).is_err());

    Ok(())
}

#[test]
fn peek_past_end_pads_with_zeros() -> io::Result<()> {
    let mut bs = BsIoSliceReader::from_slice(&[0xf0]);

    bs.skip_n(4)?;
    assert_eq!(bs.peek_n(8)?, 0b0000_0000);

    let mut bs = BsIoSliceReader::from_slice(&[0xff]);
    bs.skip_n(4)?;
    assert_eq!(bs.peek_n(8)?, 0b1111_0000);

    Ok(())
}
