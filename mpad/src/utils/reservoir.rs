//! Main data bit reservoir.
//!
//! Layer III main data does not have to start right after the side
//! information: `main_data_begin` points up to 511 bytes back into the main
//! data of previous frames. The reservoir concatenates main data across
//! frames and hands out the byte offset where the current frame's granule
//! data begins.

use crate::utils::errors::DecodeError;

/// Maximum reach of the 9-bit main_data_begin pointer.
const MAX_HISTORY: usize = 511;

/// History plus the largest possible frame payload.
const RESERVOIR_LEN: usize = 2048;

pub struct BitReservoir {
    buf: Box<[u8; RESERVOIR_LEN]>,
    len: usize,
}

impl Default for BitReservoir {
    fn default() -> Self {
        Self {
            buf: Box::new([0u8; RESERVOIR_LEN]),
            len: 0,
        }
    }
}

impl BitReservoir {
    /// Appends one frame's main data, retaining up to [`MAX_HISTORY`] bytes
    /// of previous main data in front of it.
    ///
    /// Returns the byte offset into [`bytes_ref`](Self::bytes_ref) where the
    /// new frame's granule data starts. A `main_data_begin` reaching back
    /// past the buffered history (a mid-stream start, or a stream that lied
    /// about its reservoir) clears the reservoir and fails with
    /// [`DecodeError::BadData`].
    pub fn fill(
        &mut self,
        main_data: &[u8],
        main_data_begin: usize,
    ) -> Result<usize, DecodeError> {
        let keep = self.len.min(MAX_HISTORY);

        if main_data_begin > keep {
            self.clear();
            return Err(DecodeError::BadData);
        }

        if keep + main_data.len() > RESERVOIR_LEN {
            self.clear();
            return Err(DecodeError::BadFrameLength);
        }

        self.buf.copy_within(self.len - keep..self.len, 0);
        self.buf[keep..keep + main_data.len()].copy_from_slice(main_data);
        self.len = keep + main_data.len();

        Ok(keep - main_data_begin)
    }

    /// All buffered main data bytes.
    pub fn bytes_ref(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_keeps_history() {
        let mut res = BitReservoir::default();

        let start = res.fill(&[1, 2, 3, 4], 0).unwrap();
        assert_eq!(start, 0);
        assert_eq!(res.bytes_ref(), &[1, 2, 3, 4]);

        // reach 3 bytes back into the previous frame
        let start = res.fill(&[5, 6], 3).unwrap();
        assert_eq!(start, 1);
        assert_eq!(res.bytes_ref(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn fill_trims_old_history() {
        let mut res = BitReservoir::default();

        res.fill(&[0xaa; 600], 0).unwrap();
        let start = res.fill(&[0xbb; 4], MAX_HISTORY).unwrap();

        assert_eq!(start, 0);
        assert_eq!(res.bytes_ref().len(), MAX_HISTORY + 4);
    }

    #[test]
    fn begin_past_history_is_bad_data() {
        let mut res = BitReservoir::default();

        res.fill(&[1, 2, 3], 0).unwrap();
        assert_eq!(res.fill(&[4], 4), Err(DecodeError::BadData));

        // the reservoir resets so the stream can resynchronize
        assert!(res.bytes_ref().is_empty());
        assert_eq!(res.fill(&[5, 6], 0), Ok(0));
    }
}
