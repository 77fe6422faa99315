use anyhow::Result;
use log::debug;

use crate::bitstream::{BitstreamMap, ByteSource, CodecId, Sample, SampleType, StreamType};
use crate::codec::h264::H264NalUnitType;
use crate::codec::h265::H265NalUnitType;
use crate::container::SourceReader;

const START_CODE: [u8; 3] = [0, 0, 1];

/// Classifies a NAL unit from its first header byte.
pub fn nal_sample_type(codec: CodecId, header: u8) -> SampleType {
    match codec {
        CodecId::H264 => {
            let nal_type = H264NalUnitType::from(header & 0x1F);
            if nal_type.is_idr() {
                SampleType::VideoSync
            } else if nal_type.is_vcl() {
                SampleType::Video
            } else if nal_type.is_parameter_set() {
                SampleType::VideoParameter
            } else {
                SampleType::Other
            }
        }
        CodecId::H265 => {
            let nal_type = H265NalUnitType::from((header >> 1) & 0x3F);
            if nal_type.is_irap() {
                SampleType::VideoSync
            } else if nal_type.is_vcl() {
                SampleType::Video
            } else if nal_type.is_parameter_set() {
                SampleType::VideoParameter
            } else {
                SampleType::Other
            }
        }
        _ => SampleType::Unknown,
    }
}

/// Maps every NAL unit of an Annex B byte stream to one sample.
///
/// A sample starts after its `00 00 01` prefix and ends before the next one.
/// Zero bytes before the next prefix (the leading zero of a four byte start
/// code and trailing_zero_8bits) are not part of the NAL unit.
pub fn build_map<S: ByteSource>(reader: &mut SourceReader<S>, codec: CodecId) -> Result<BitstreamMap> {
    let size = reader.size();
    let mut map = BitstreamMap::new(StreamType::Video, codec);

    let Some(first) = reader.find(0, &START_CODE)? else {
        debug!("No start code in {size} bytes");
        return Ok(map);
    };
    if first > 0 {
        let leading = reader.bytes(0, first as usize)?;
        if leading.iter().any(|&b| b != 0) {
            debug!("Skipping {first} bytes before the first start code");
        }
    }

    let mut start = first + START_CODE.len() as u64;
    loop {
        let next = reader.find(start, &START_CODE)?;
        let end = trim_trailing_zeros(reader, start, next.unwrap_or(size))?;

        if end > start {
            let header = reader.bytes(start, 1)?[0];
            map.push(Sample {
                sample_type: nal_sample_type(codec, header),
                size: (end - start) as u32,
                offset: start,
                pts: None,
                dts: None,
            });
        }

        match next {
            Some(next) => start = next + START_CODE.len() as u64,
            None => break,
        }
    }

    debug!("Mapped {} NAL units", map.sample_count());

    Ok(map)
}

fn trim_trailing_zeros<S: ByteSource>(reader: &mut SourceReader<S>, start: u64, mut end: u64) -> Result<u64> {
    while end > start {
        let chunk = (end - start).min(256);
        let bytes = reader.bytes(end - chunk, chunk as usize)?;
        match bytes.iter().rposition(|&b| b != 0) {
            Some(index) => return Ok(end - chunk + index as u64 + 1),
            None => end -= chunk,
        }
    }

    Ok(end)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn maps_nal_units() {
        let stream = vec![
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E, // SPS
            0, 0, 1, 0x68, 0xCE, 0x38, 0x80, 0x00, // PPS + trailing_zero_8bits
            0, 0, 0, 1, 0x65, 0x88, 0x84, // IDR
            0, 0, 1, 0x41, 0x9A, // non-IDR
        ];
        let mut reader = SourceReader::new(Cursor::new(stream));
        let map = build_map(&mut reader, CodecId::H264).unwrap();

        assert_eq!(map.sample_count(), 4);
        let sizes: Vec<u32> = map.samples().iter().map(|s| s.size).collect();
        assert_eq!(sizes, vec![4, 4, 3, 2]);
        assert_eq!(map.sample(1).unwrap().offset, 11);
        assert_eq!(map.sample(0).unwrap().sample_type, SampleType::VideoParameter);
        assert_eq!(map.sample(2).unwrap().sample_type, SampleType::VideoSync);
        assert_eq!(map.sample(3).unwrap().sample_type, SampleType::Video);
    }

    #[test]
    fn h265_types_and_empty_units() {
        let stream = vec![0, 0, 1, 0x40, 0x01, 0x0C, 0, 0, 1, 0, 0, 1, 0x26, 0x01, 0xAF, 0, 0, 1, 0x02, 0x01, 0xD0];
        let mut reader = SourceReader::new(Cursor::new(stream));
        let map = build_map(&mut reader, CodecId::H265).unwrap();

        let types: Vec<SampleType> = map.samples().iter().map(|s| s.sample_type).collect();
        assert_eq!(types, vec![SampleType::VideoParameter, SampleType::VideoSync, SampleType::Video]);
    }

    #[test]
    fn no_start_code() {
        let mut reader = SourceReader::new(Cursor::new(vec![0x12; 32]));
        assert!(build_map(&mut reader, CodecId::H264).unwrap().is_empty());
    }
}
