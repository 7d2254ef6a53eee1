use std::io;

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Decoder error taxonomy.
///
/// Each variant carries a fixed numeric code compatible with the historical
/// mad_error values. Codes with a nonzero high byte are stream-content
/// errors: the session stays usable and decoding may resume at the next
/// frame boundary. Codes below 0x0100 mean the input buffer itself cannot
/// be decoded any further.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input buffer too small (or EOF)")]
    BufferLength,

    #[error("invalid (null) buffer pointer")]
    BufferData,

    #[error("not enough memory")]
    Memory,

    #[error("lost synchronization")]
    LostSync,

    #[error("reserved header layer value")]
    BadLayer,

    #[error("forbidden bitrate value")]
    BadBitRate,

    #[error("reserved sample frequency value")]
    BadSampleRate,

    #[error("reserved emphasis value")]
    BadEmphasis,

    #[error("CRC check failed")]
    BadCrc,

    #[error("forbidden bit allocation value")]
    BadBitAlloc,

    #[error("bad scalefactor index")]
    BadScaleFactor,

    #[error("bad bitrate/mode combination")]
    BadMode,

    #[error("bad frame length")]
    BadFrameLength,

    #[error("bad big_values count")]
    BadBigValues,

    #[error("reserved block_type")]
    BadBlockType,

    #[error("bad scalefactor selection info")]
    BadScfsi,

    #[error("bad main_data_begin pointer")]
    BadData,

    #[error("bad audio data length")]
    BadAudioLength,

    #[error("bad Huffman table select")]
    BadHuffmanTable,

    #[error("Huffman data overrun")]
    BadHuffmanData,

    #[error("incompatible block_type for JS")]
    BadStereo,
}

impl DecodeError {
    /// Numeric error code.
    pub const fn code(self) -> u16 {
        match self {
            DecodeError::BufferLength => 0x0001,
            DecodeError::BufferData => 0x0002,
            DecodeError::Memory => 0x0031,
            DecodeError::LostSync => 0x0101,
            DecodeError::BadLayer => 0x0102,
            DecodeError::BadBitRate => 0x0103,
            DecodeError::BadSampleRate => 0x0104,
            DecodeError::BadEmphasis => 0x0105,
            DecodeError::BadCrc => 0x0201,
            DecodeError::BadBitAlloc => 0x0211,
            DecodeError::BadScaleFactor => 0x0221,
            DecodeError::BadMode => 0x0222,
            DecodeError::BadFrameLength => 0x0231,
            DecodeError::BadBigValues => 0x0232,
            DecodeError::BadBlockType => 0x0233,
            DecodeError::BadScfsi => 0x0234,
            DecodeError::BadData => 0x0235,
            DecodeError::BadAudioLength => 0x0236,
            DecodeError::BadHuffmanTable => 0x0237,
            DecodeError::BadHuffmanData => 0x0238,
            DecodeError::BadStereo => 0x0239,
        }
    }

    /// Whether decoding may continue at the next frame after this error.
    pub const fn is_recoverable(self) -> bool {
        self.code() & 0xff00 != 0
    }
}

impl From<io::Error> for DecodeError {
    /// Bit reads past the end of the input surface as EOF; everything the
    /// decoder reads comes from the caller's buffer, so running out of bits
    /// always means the buffer ended short.
    fn from(_: io::Error) -> Self {
        DecodeError::BufferLength
    }
}

#[test]
fn error_codes_and_recoverability() {
    assert_eq!(DecodeError::BufferLength.code(), 0x0001);
    assert_eq!(DecodeError::LostSync.code(), 0x0101);
    assert_eq!(DecodeError::BadStereo.code(), 0x0239);

    assert!(!DecodeError::BufferLength.is_recoverable());
    assert!(!DecodeError::BufferData.is_recoverable());
    assert!(!DecodeError::Memory.is_recoverable());
    assert!(DecodeError::LostSync.is_recoverable());
    assert!(DecodeError::BadCrc.is_recoverable());
    assert!(DecodeError::BadHuffmanData.is_recoverable());
}

#[test]
fn error_messages() {
    assert_eq!(
        DecodeError::LostSync.to_string(),
        "lost synchronization"
    );
    assert_eq!(
        DecodeError::BadData.to_string(),
        "bad main_data_begin pointer"
    );
    assert_eq!(
        DecodeError::BadStereo.to_string(),
        "incompatible block_type for JS"
    );
}
