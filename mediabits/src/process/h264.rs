use anyhow::{Result, anyhow};
use log::Level::Warn;
use log::{debug, info};

use crate::bitstream::{Bitstream, BitstreamMap, ByteSource, CodecId};
use crate::codec::h264::slice::read_access_unit_delimiter;
use crate::codec::h264::{H264NalUnit, H264NalUnitType, H264Pps, H264SliceHeader, H264Sps, MAX_PPS, MAX_SPS, SliceType};
use crate::codec::nalu::clean_emulation_prevention;
use crate::log_or_err;
use crate::process::{NalRecord, ParseOptions, VideoInfo, chroma_format_name};

#[derive(Debug, Clone, PartialEq)]
pub enum H264Payload {
    Sps(u32),
    Pps(u32),
    Slice(Box<H264SliceHeader>),
    AccessUnitDelimiter(u8),
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct H264Stats {
    pub nal_units: usize,
    pub errors: usize,
    pub emulation_prevention_bytes: usize,
    /// Slices with first_mb_in_slice == 0.
    pub pictures: usize,
    pub idr_pictures: usize,
    pub i_slices: usize,
    pub p_slices: usize,
    pub b_slices: usize,
    pub switching_slices: usize,
}

/// H.264 decoding context: parameter sets by id plus per-stream counters.
#[derive(Debug)]
pub struct H264Parser {
    options: ParseOptions,
    sps_list: Vec<Option<H264Sps>>,
    pps_list: Vec<Option<H264Pps>>,
    active_sps: Option<u32>,
    stats: H264Stats,
}

impl Default for H264Parser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl H264Parser {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            sps_list: vec![None; MAX_SPS],
            pps_list: vec![None; MAX_PPS],
            active_sps: None,
            stats: H264Stats::default(),
        }
    }

    pub fn stats(&self) -> &H264Stats {
        &self.stats
    }

    pub fn sps(&self, id: u32) -> Option<&H264Sps> {
        self.sps_list.get(id as usize).and_then(Option::as_ref)
    }

    pub fn pps(&self, id: u32) -> Option<&H264Pps> {
        self.pps_list.get(id as usize).and_then(Option::as_ref)
    }

    /// The SPS referenced by the latest slice, or the first one received.
    pub fn active_sps(&self) -> Option<&H264Sps> {
        match self.active_sps {
            Some(id) => self.sps(id),
            None => self.sps_list.iter().flatten().next(),
        }
    }

    pub fn video_info(&self) -> Option<VideoInfo> {
        let sps = self.active_sps()?;

        Some(VideoInfo {
            codec: CodecId::H264,
            width: sps.width(),
            height: sps.height(),
            profile: sps.profile_name().to_string(),
            level: sps.level_name(),
            chroma_format: chroma_format_name(sps.chroma_format_idc),
            bit_depth: sps.bit_depth_luma(),
            frame_rate: sps.frame_rate(),
        })
    }

    /// Parses one buffered NAL unit: header, emulation prevention removal
    /// and the payload syntax for the types this context tracks.
    pub fn parse_nal<S: ByteSource>(&mut self, bs: &mut Bitstream<S>) -> Result<(H264NalUnit, H264Payload)> {
        let nal = H264NalUnit::read(&self.options, bs)?;
        self.stats.nal_units += 1;
        self.stats.emulation_prevention_bytes += clean_emulation_prevention(bs);

        let payload = match nal.unit_type() {
            H264NalUnitType::Sps => {
                let sps = H264Sps::read(bs)?;
                let id = sps.seq_parameter_set_id;
                debug!(
                    "SPS {id}: {} {} {}x{}",
                    sps.profile_name(),
                    sps.level_name(),
                    sps.width(),
                    sps.height()
                );
                self.sps_list[id as usize] = Some(sps);
                H264Payload::Sps(id)
            }
            H264NalUnitType::Pps => {
                let pps = H264Pps::read(&self.options, bs, &self.sps_list)?;
                let id = pps.pic_parameter_set_id;
                debug!("PPS {id} -> SPS {}", pps.seq_parameter_set_id);
                self.pps_list[id as usize] = Some(pps);
                H264Payload::Pps(id)
            }
            H264NalUnitType::Slice | H264NalUnitType::IdrSlice => {
                let sh = H264SliceHeader::read(bs, &nal, &self.sps_list, &self.pps_list)?;
                self.count_slice(&nal, &sh);
                H264Payload::Slice(Box::new(sh))
            }
            H264NalUnitType::AccessUnitDelimiter => H264Payload::AccessUnitDelimiter(read_access_unit_delimiter(bs)?),
            _ => H264Payload::Other,
        };

        Ok((nal, payload))
    }

    fn count_slice(&mut self, nal: &H264NalUnit, sh: &H264SliceHeader) {
        if sh.first_mb_in_slice == 0 {
            self.stats.pictures += 1;
            if nal.unit_type().is_idr() {
                self.stats.idr_pictures += 1;
            }
        }

        match sh.kind() {
            SliceType::I => self.stats.i_slices += 1,
            SliceType::P => self.stats.p_slices += 1,
            SliceType::B => self.stats.b_slices += 1,
            SliceType::Sp | SliceType::Si => self.stats.switching_slices += 1,
        }

        if let Some(pps) = self.pps(sh.pic_parameter_set_id) {
            self.active_sps = Some(pps.seq_parameter_set_id);
        }
    }

    /// Walks every NAL unit of `map`. A malformed unit is counted and
    /// skipped unless the fail level turns it into an error.
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
            let nal_unit_type = bs.window().first().map_or(0, |b| b & 0x1F);

            let mut record = NalRecord {
                index,
                offset: sample.offset,
                size: sample.size,
                nal_unit_type,
                description: crate::codec::h264::nal_type_description(nal_unit_type),
                detail: None,
                error: false,
            };

            match self.parse_nal(&mut bs) {
                Ok((_, payload)) => record.detail = describe(&payload),
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
            "H.264: {} NAL units, {} pictures ({} IDR), {} errors",
            self.stats.nal_units, self.stats.pictures, self.stats.idr_pictures, self.stats.errors
        );

        Ok(())
    }
}

fn describe(payload: &H264Payload) -> Option<String> {
    match payload {
        H264Payload::Sps(id) => Some(format!("seq_parameter_set_id {id}")),
        H264Payload::Pps(id) => Some(format!("pic_parameter_set_id {id}")),
        H264Payload::Slice(sh) => Some(format!(
            "{} slice, frame_num {}, first_mb {}",
            sh.kind(),
            sh.frame_num,
            sh.first_mb_in_slice
        )),
        H264Payload::AccessUnitDelimiter(primary_pic_type) => Some(format!("primary_pic_type {primary_pic_type}")),
        H264Payload::Other => None,
    }
}
