//! SLIP framing (RFC 1055 byte stuffing) as used by serial wM-Bus dongles:
//! end byte 0xC0, escape 0xDB, with 0xC0 -> 0xDB 0xDC and 0xDB -> 0xDB 0xDD.

pub const SLIP_END: u8 = 0xC0;
pub const SLIP_ESC: u8 = 0xDB;
pub const SLIP_ESC_END: u8 = 0xDC;
pub const SLIP_ESC_ESC: u8 = 0xDD;

/// Wrap `payload` in SLIP framing and append it to `out`.
pub fn add_slip_framing(payload: &[u8], out: &mut Vec<u8>) {
    out.push(SLIP_END);
    for &b in payload {
        match b {
            SLIP_END => {
                out.push(SLIP_ESC);
                out.push(SLIP_ESC_END);
            }
            SLIP_ESC => {
                out.push(SLIP_ESC);
                out.push(SLIP_ESC_ESC);
            }
            _ => out.push(b),
        }
    }
    out.push(SLIP_END);
}

/// Extract the first complete SLIP frame from `data`.
///
/// Leading runs of stray 0xC0 bytes are skipped. On success `frame_length`
/// is the number of input bytes consumed including the trailing end byte,
/// and `out` holds the unescaped payload. An incomplete frame leaves
/// `frame_length` at 0 and `out` untouched.
pub fn remove_slip_framing(data: &[u8], frame_length: &mut usize, out: &mut Vec<u8>) {
    *frame_length = 0;

    // Skip garbage up to and including the run of frame delimiters.
    let mut i = 0;
    while i < data.len() && data[i] != SLIP_END {
        i += 1;
    }
    while i < data.len() && data[i] == SLIP_END {
        i += 1;
    }
    if i >= data.len() {
        return;
    }
    // i now points at the first payload byte. The run we just skipped ends
    // with the opening delimiter of this frame.
    let mut payload = Vec::new();
    let mut j = i;
    while j < data.len() {
        match data[j] {
            SLIP_END => {
                *frame_length = j + 1;
                *out = payload;
                return;
            }
            SLIP_ESC if j + 1 < data.len() => {
                match data[j + 1] {
                    SLIP_ESC_END => payload.push(SLIP_END),
                    SLIP_ESC_ESC => payload.push(SLIP_ESC),
                    other => payload.push(other),
                }
                j += 2;
            }
            SLIP_ESC => {
                // Escape byte at the end of the buffer: frame incomplete.
                return;
            }
            b => {
                payload.push(b);
                j += 1;
            }
        }
    }
    // No closing delimiter seen yet.
}
