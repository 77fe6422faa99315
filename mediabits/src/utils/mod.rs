pub mod array2d;
pub mod bitstream_io;
pub mod crc;
pub mod errors;
pub mod trace;

#[cfg(test)]
pub(crate) mod bit_writer;
