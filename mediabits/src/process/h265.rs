use anyhow::{Result, anyhow};
use log::Level::Warn;
use log::{debug, info};

use crate::bitstream::{Bitstream, BitstreamMap, ByteSource, CodecId};
use crate::codec::h265::{
    H265NalUnit, H265NalUnitType, H265Pps, H265SliceHeader, H265SliceType, H265Sps, H265Vps, MAX_PPS, MAX_SPS,
    MAX_VPS, nal_type_description,
};
use crate::codec::nalu::clean_emulation_prevention;
use crate::log_or_err;
use crate::process::{NalRecord, ParseOptions, VideoInfo, chroma_format_name};

#[derive(Debug, Clone, PartialEq)]
pub enum H265Payload {
    Vps(u8),
    Sps(u32),
    Pps(u32),
    SliceSegment(H265SliceHeader),
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct H265Stats {
    pub nal_units: usize,
    pub errors: usize,
    pub emulation_prevention_bytes: usize,
    pub pictures: usize,
    pub irap_pictures: usize,
    pub slice_segments: usize,
    pub dependent_slice_segments: usize,
    pub i_slices: usize,
    pub p_slices: usize,
    pub b_slices: usize,
}

#[derive(Debug)]
pub struct H265Parser {
    options: ParseOptions,
    vps_list: Vec<Option<H265Vps>>,
    sps_list: Vec<Option<H265Sps>>,
    pps_list: Vec<Option<H265Pps>>,
    active_sps: Option<u32>,
    stats: H265Stats,
}

impl Default for H265Parser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl H265Parser {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            vps_list: vec![None; MAX_VPS],
            sps_list: vec![None; MAX_SPS],
            pps_list: vec![None; MAX_PPS],
            active_sps: None,
            stats: H265Stats::default(),
        }
    }

    pub fn stats(&self) -> &H265Stats {
        &self.stats
    }

    pub fn vps(&self, id: u8) -> Option<&H265Vps> {
        self.vps_list.get(id as usize).and_then(Option::as_ref)
    }

    pub fn sps(&self, id: u32) -> Option<&H265Sps> {
        self.sps_list.get(id as usize).and_then(Option::as_ref)
    }

    pub fn pps(&self, id: u32) -> Option<&H265Pps> {
        self.pps_list.get(id as usize).and_then(Option::as_ref)
    }

    pub fn active_sps(&self) -> Option<&H265Sps> {
        match self.active_sps {
            Some(id) => self.sps(id),
            None => self.sps_list.iter().flatten().next(),
        }
    }

    pub fn video_info(&self) -> Option<VideoInfo> {
        let sps = self.active_sps()?;
        let ptl = &sps.profile_tier_level;

        Some(VideoInfo {
            codec: CodecId::H265,
            width: sps.width(),
            height: sps.height(),
            profile: format!("{} ({} tier)", ptl.profile_name(), ptl.tier_name()),
            level: ptl.level_name(),
            chroma_format: chroma_format_name(sps.chroma_format_idc),
            bit_depth: sps.bit_depth_luma(),
            frame_rate: sps.frame_rate(),
        })
    }

    /// Parses one buffered NAL unit. Only base layer parameter sets and
    /// slice segments are interpreted.
    pub fn parse_nal<S: ByteSource>(&mut self, bs: &mut Bitstream<S>) -> Result<(H265NalUnit, H265Payload)> {
        let nal = H265NalUnit::read(bs)?;
        self.stats.nal_units += 1;
        self.stats.emulation_prevention_bytes += clean_emulation_prevention(bs);

        if nal.nuh_layer_id > 0 {
            debug!("Skipping NAL unit of layer {}", nal.nuh_layer_id);
            return Ok((nal, H265Payload::Other));
        }

        let unit_type = nal.unit_type();
        let payload = match unit_type {
            H265NalUnitType::Vps => {
                let vps = H265Vps::read(&self.options, bs)?;
                let id = vps.vps_video_parameter_set_id;
                self.vps_list[id as usize] = Some(vps);
                H265Payload::Vps(id)
            }
            H265NalUnitType::Sps => {
                let sps = H265Sps::read(bs)?;
                let id = sps.sps_seq_parameter_set_id;
                debug!(
                    "SPS {id}: {} {}x{}",
                    sps.profile_tier_level.profile_name(),
                    sps.width(),
                    sps.height()
                );
                self.sps_list[id as usize] = Some(sps);
                H265Payload::Sps(id)
            }
            H265NalUnitType::Pps => {
                let pps = H265Pps::read(&self.options, bs, &self.sps_list)?;
                let id = pps.pps_pic_parameter_set_id;
                self.pps_list[id as usize] = Some(pps);
                H265Payload::Pps(id)
            }
            t if t.is_vcl() => {
                let sh = H265SliceHeader::read(bs, &nal, &self.sps_list, &self.pps_list)?;
                self.count_slice(unit_type, &sh);
                H265Payload::SliceSegment(sh)
            }
            _ => H265Payload::Other,
        };

        Ok((nal, payload))
    }

    fn count_slice(&mut self, unit_type: H265NalUnitType, sh: &H265SliceHeader) {
        self.stats.slice_segments += 1;

        if sh.first_slice_segment_in_pic_flag {
            self.stats.pictures += 1;
            if unit_type.is_irap() {
                self.stats.irap_pictures += 1;
            }
        }

        if sh.dependent_slice_segment_flag {
            self.stats.dependent_slice_segments += 1;
        }

        match sh.slice_type {
            Some(H265SliceType::I) => self.stats.i_slices += 1,
            Some(H265SliceType::P) => self.stats.p_slices += 1,
            Some(H265SliceType::B) => self.stats.b_slices += 1,
            None => {}
        }

        if let Some(pps) = self.pps(sh.slice_pic_parameter_set_id) {
            self.active_sps = Some(pps.pps_seq_parameter_set_id);
        }
    }

    pub fn parse_map<S, F>(&mut self, source: S, map: &BitstreamMap, mut visit: F) -> Result<()>
    where
        S: ByteSource,
        F: FnMut(NalRecord),
    {
        if map.is_empty() {
            return Ok(());
        }

        let mut bs = Bitstream::open_mapped(source, map)?;

        for (index, sample) in map.samples().iter().enumerate() {
            bs.load_sample(index)?;
            let nal_unit_type = bs.window().first().map_or(0, |b| (b >> 1) & 0x3F);

            let mut record = NalRecord {
                index,
                offset: sample.offset,
                size: sample.size,
                nal_unit_type,
                description: nal_type_description(nal_unit_type),
                detail: None,
                error: false,
            };

            match self.parse_nal(&mut bs) {
                Ok((nal, payload)) => record.detail = describe(&nal, &payload),
                Err(e) => {
                    self.stats.errors += 1;
                    record.detail = Some(e.to_string());
                    record.error = true;
                    log_or_err!(
                        self.options,
                        Warn,
                        anyhow!("NAL unit {index} at offset {}: {e}", sample.offset)
                    );
                }
            }

            visit(record);
        }

        info!(
            "H.265: {} NAL units, {} pictures ({} IRAP), {} errors",
            self.stats.nal_units, self.stats.pictures, self.stats.irap_pictures, self.stats.errors
        );

        Ok(())
    }
}

fn describe(nal: &H265NalUnit, payload: &H265Payload) -> Option<String> {
    match payload {
        H265Payload::Vps(id) => Some(format!("vps_video_parameter_set_id {id}")),
        H265Payload::Sps(id) => Some(format!("sps_seq_parameter_set_id {id}")),
        H265Payload::Pps(id) => Some(format!("pps_pic_parameter_set_id {id}")),
        H265Payload::SliceSegment(sh) => Some(match sh.slice_type {
            _ if sh.dependent_slice_segment_flag => format!("dependent segment, address {}", sh.slice_segment_address),
            Some(kind) => format!(
                "{kind} slice, address {}, poc lsb {}, tid {}",
                sh.slice_segment_address,
                sh.slice_pic_order_cnt_lsb,
                nal.temporal_id()
            ),
            None => format!("address {}", sh.slice_segment_address),
        }),
        H265Payload::Other if nal.nuh_layer_id > 0 => Some(format!("layer {}", nal.nuh_layer_id)),
        H265Payload::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::h265::sps::tests::main_1080p_sps;
    use crate::codec::h265::vps::tests::main_vps;
    use crate::container::SourceReader;
    use crate::process::annexb::build_map;
    use crate::utils::bit_writer::{BitBuilder, escape};

    fn nal(header: [u8; 2], rbsp: &[u8]) -> Vec<u8> {
        let mut unit = vec![0, 0, 0, 1, header[0], header[1]];
        unit.extend(escape(rbsp));
        unit
    }

    fn minimal_pps() -> Vec<u8> {
        BitBuilder::new()
            .ue(0)
            .ue(0)
            .flag(false)
            .flag(false)
            .bits(3, 0)
            .flag(false)
            .flag(false)
            .ue(0)
            .ue(0)
            .se(0)
            .flag(false)
            .flag(false)
            .flag(false) // cu_qp_delta_enabled_flag
            .se(0)
            .se(0)
            .flag(false)
            .flag(false)
            .flag(false)
            .flag(false)
            .flag(false) // tiles_enabled_flag
            .flag(false)
            .flag(true)
            .flag(false) // deblocking_filter_control_present_flag
            .flag(false)
            .flag(false)
            .ue(0)
            .flag(false)
            .flag(false) // pps_extension_present_flag
            .trailing()
            .finish()
    }

    /// VPS, SPS, PPS, an IDR picture and a P picture split in two slice
    /// segments, then a slice pointing at an unknown PPS.
    fn main_stream() -> Vec<u8> {
        let idr = BitBuilder::new()
            .flag(true)
            .flag(false) // no_output_of_prior_pics_flag
            .ue(0)
            .ue(2) // I
            .bits(8, 0xC3)
            .trailing()
            .finish();

        let first = BitBuilder::new()
            .flag(true)
            .ue(0)
            .ue(1) // P
            .bits(8, 1) // slice_pic_order_cnt_lsb
            .bits(8, 0x9C)
            .trailing()
            .finish();

        let second = BitBuilder::new()
            .flag(false)
            .ue(0)
            .bits(9, 255) // slice_segment_address
            .ue(1)
            .bits(8, 1)
            .bits(8, 0x9C)
            .trailing()
            .finish();

        let broken = BitBuilder::new().flag(true).ue(7).bits(8, 0xFF).trailing().finish();

        [
            nal([0x40, 0x01], &main_vps(0xFFFF)),
            nal([0x42, 0x01], &main_1080p_sps()),
            nal([0x44, 0x01], &minimal_pps()),
            nal([0x26, 0x01], &idr),
            nal([0x02, 0x01], &first),
            nal([0x02, 0x01], &second),
            nal([0x02, 0x01], &broken),
        ]
        .concat()
    }

    #[test]
    fn parses_stream() {
        let stream = main_stream();
        let mut reader = SourceReader::new(Cursor::new(stream.clone()));
        let map = build_map(&mut reader, CodecId::H265).unwrap();
        assert_eq!(map.sample_count(), 7);

        let mut parser = H265Parser::default();
        let mut records = Vec::new();
        parser
            .parse_map(Cursor::new(stream), &map, |record| records.push(record))
            .unwrap();

        let stats = parser.stats();
        assert_eq!(stats.nal_units, 7);
        assert_eq!(stats.slice_segments, 3);
        assert_eq!(stats.pictures, 2);
        assert_eq!(stats.irap_pictures, 1);
        assert_eq!((stats.i_slices, stats.p_slices), (1, 2));
        assert_eq!(stats.errors, 1);
        assert!(stats.emulation_prevention_bytes > 0);

        assert_eq!(records[0].description, "Video parameter set");
        assert_eq!(records[0].detail.as_deref(), Some("vps_video_parameter_set_id 0"));
        assert_eq!(records[3].nal_unit_type, 19);
        assert_eq!(
            records[5].detail.as_deref(),
            Some("P slice, address 255, poc lsb 1, tid 0")
        );
        assert!(records[6].error);
        assert!(parser.vps(0).is_some());

        let info = parser.video_info().unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.profile, "Main (Main tier)");
        assert_eq!(info.level, "4.0");
        assert_eq!(info.chroma_format, "4:2:0");
        assert_eq!(info.bit_depth, 8);
    }

    #[test]
    fn strict_mode_stops_at_broken_unit() {
        let stream = main_stream();
        let mut reader = SourceReader::new(Cursor::new(stream.clone()));
        let map = build_map(&mut reader, CodecId::H265).unwrap();

        let mut parser = H265Parser::new(ParseOptions::strict());
        let mut count = 0;
        assert!(parser.parse_map(Cursor::new(stream), &map, |_| count += 1).is_err());
        assert_eq!(count, 6);
    }
}
