/// Frame-by-frame decoding session.
///
/// Provides the [`Decoder`](decode::Decoder) that drives the full pipeline
/// from sync location to reconstructed subband samples and PCM synthesis.
pub mod decode;

/// Huffman decoding of the spectral samples.
pub mod huffman;

/// Hybrid filterbank: reordering, alias reduction, IMDCT, frequency
/// inversion.
pub mod hybrid;

/// Requantization of Huffman-decoded magnitudes.
pub mod requantize;

/// Joint stereo reconstruction (mid-side and intensity).
pub mod stereo;

/// Polyphase synthesis filterbank.
pub mod synth;
