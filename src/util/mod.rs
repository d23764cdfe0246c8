//! Low level utilities shared across the decoding pipeline: hex codecs,
//! the EN 13757 CRC, SLIP framing and status string helpers.

pub mod crc;
pub mod hex;
pub mod slip;
pub mod status;

pub use crc::{crc16_en13757, crc16_en13757_raw};
pub use hex::{bin2hex, bin2hex_upper, hex2bin, hex2bin_lenient};
pub use slip::{add_slip_framing, remove_slip_framing};
pub use status::{is_likely_ascii, join_status_ok_strings, sort_status_string};
