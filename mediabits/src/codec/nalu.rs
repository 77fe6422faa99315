//! NAL unit payload helpers shared by H.264 and H.265.

use anyhow::{Result, bail};
use log::trace;

use crate::bitstream::{Bitstream, ByteSource};
use crate::utils::errors::NaluError;

/// Removes emulation prevention bytes from the buffered window, starting at
/// the cursor.
///
/// A `0x03` that follows two or more zero bytes is dropped and the zero run
/// restarts. The scan is a single pass over the current window only; an
/// escape split across a refill boundary is not seen. Returns the number of
/// bytes removed.
pub fn clean_emulation_prevention<S: ByteSource>(bs: &mut Bitstream<S>) -> usize {
    let mut index = bs.byte_cursor();
    let mut zeros = 0;
    let mut removed = 0;

    while index < bs.buffer_length() {
        let byte = bs.window()[index];

        if byte == 0x03 && zeros >= 2 {
            bs.discard_buffered_byte(index);
            removed += 1;
            zeros = 0;
            continue;
        }

        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        index += 1;
    }

    if removed > 0 {
        trace!(
            "removed {removed} emulation prevention bytes at offset {}",
            bs.source_offset()
        );
    }

    removed
}

/// Window bit position of the rbsp_stop_one_bit, if any.
fn stop_bit_position(window: &[u8]) -> Option<usize> {
    let (index, &byte) = window.iter().enumerate().rev().find(|(_, b)| **b != 0)?;

    Some(index * 8 + 7 - byte.trailing_zeros() as usize)
}

/// more_rbsp_data(): whether syntax precedes the rbsp_trailing_bits of the
/// buffered NAL unit.
pub fn more_rbsp_data<S: ByteSource>(bs: &Bitstream<S>) -> bool {
    stop_bit_position(bs.window()).is_some_and(|stop| bs.bit_cursor() < stop)
}

/// rbsp_trailing_bits()
pub fn rbsp_trailing_bits<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<()> {
    if !bs.read_bit()? {
        bail!(NaluError::MissingStopBit);
    }

    bs.byte_align();

    Ok(())
}
