#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Layer III frames interleave fixed-position side information with main
//! data that may start up to 511 bytes earlier, inside previous frames
//! (the bit reservoir). The decoder therefore keeps three kinds of state
//! across frames: the reservoir, the per-subband IMDCT overlap, and the
//! polyphase filterbank history.
//!
//! ## Quick Start
//!
//! Feed a buffer to a [`process::decode::Decoder`] and alternate decode and
//! synthesis:
//!
//! ```rust,no_run
//! use mpad::process::decode::Decoder;
//!
//! let data = std::fs::read("input.mp3")?;
//!
//! let mut decoder = Decoder::default();
//! decoder.set_input(&data);
//!
//! loop {
//!     if !decoder.decode_frame() {
//!         match decoder.error() {
//!             Some(e) if e.is_recoverable() => continue,
//!             _ => break,
//!         }
//!     }
//!
//!     decoder.synth_frame();
//!
//!     for ch in 0..decoder.channels() {
//!         let pcm = decoder.pcm(ch);
//!         // ...
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Decoding pipeline stages.
///
/// 1. **Session** ([`process::decode`]): sync scan, header and CRC checks,
///    reservoir management, and the per-frame pipeline.
/// 2. **Huffman** ([`process::huffman`]): spectral sample decoding.
/// 3. **Reconstruction** ([`process::requantize`], [`process::stereo`],
///    [`process::hybrid`]): gains, joint stereo, IMDCT.
/// 4. **Synthesis** ([`process::synth`]): subbands to PCM.
pub mod process;

/// Data structures of the frame syntax.
///
/// - **Headers** ([`structs::header`]): sync and header field validation
/// - **Side Information** ([`structs::side_info`]): granule parameters
/// - **Scale Factors** ([`structs::scale_factors`]): part2 decoding
/// - **Band Tables** ([`structs::sfb`]): scale factor band boundaries
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): bit-level reading
/// - **CRC Validation** ([`utils::crc`]): frame protection checksum
/// - **Error Handling** ([`utils::errors`]): the decode error taxonomy
/// - **Huffman Tables** ([`utils::huffman_tables`]): flattened codebooks
/// - **Bit Reservoir** ([`utils::reservoir`]): cross-frame main data
pub mod utils;
