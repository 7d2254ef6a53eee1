/// Frame header parsing and sync location.
pub mod header;

/// Scale factor decoding (part2 of the main data).
pub mod scale_factors;

/// Scale factor band boundary tables.
pub mod sfb;

/// Layer III side information.
pub mod side_info;
