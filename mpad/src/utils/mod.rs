/// Bitstream reading utilities.
pub mod bitstream_io;

/// CRC validation for protected frames.
pub mod crc;

/// Error types.
pub mod errors;

/// Huffman codebook tables.
pub mod huffman_tables;

/// Main data bit reservoir.
pub mod reservoir;
