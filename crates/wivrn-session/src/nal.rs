//! Annex-B NAL unit splitting and classification (spec.md §6: "The server
//! classifies each NAL into `{csd, data, garbage}`").
//!
//! CSD (codec-specific data: VPS/SPS/PPS) is forwarded unconditionally and
//! re-sent on every IDR so a headset that joins mid-stream can still
//! initialize its decoder; `data` is the regular coded frame payload;
//! `garbage` (access unit delimiters, filler, SEI) is stripped before the
//! shard accumulator ever sees it, since the headset never needs those.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalClass {
    Csd,
    Data,
    Garbage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
}

/// One NAL unit, sliced from an Annex-B bitstream without its start code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nal<'a> {
    pub class: NalClass,
    pub payload: &'a [u8],
}

/// Splits an Annex-B bitstream (`00 00 01` or `00 00 00 01` start codes)
/// into classified NAL units, skipping anything before the first start
/// code.
pub fn split_and_classify(bitstream: &[u8], codec: Codec) -> Vec<Nal<'_>> {
    let starts = find_start_codes(bitstream);
    let mut nals = Vec::with_capacity(starts.len());
    for (i, &(start, header_len)) in starts.iter().enumerate() {
        let body_start = start + header_len;
        let body_end = starts.get(i + 1).map(|&(next, _)| next).unwrap_or(bitstream.len());
        if body_start >= body_end {
            continue;
        }
        let payload = &bitstream[body_start..body_end];
        let class = match codec {
            Codec::H264 => classify_h264(payload[0]),
            Codec::H265 => classify_h265(payload),
        };
        nals.push(Nal { class, payload });
    }
    nals
}

/// Returns `(offset, start_code_len)` for every Annex-B start code found.
fn find_start_codes(bitstream: &[u8]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut i = 0;
    while i + 3 <= bitstream.len() {
        if bitstream[i] == 0 && bitstream[i + 1] == 0 {
            if bitstream[i + 2] == 1 {
                found.push((i, 3));
                i += 3;
                continue;
            }
            if i + 4 <= bitstream.len() && bitstream[i + 2] == 0 && bitstream[i + 3] == 1 {
                found.push((i, 4));
                i += 4;
                continue;
            }
        }
        i += 1;
    }
    found
}

fn classify_h264(first_byte: u8) -> NalClass {
    match first_byte & 0x1F {
        7 | 8 => NalClass::Csd,       // SPS, PPS
        9 | 12 => NalClass::Garbage,  // AUD, filler
        _ => NalClass::Data,
    }
}

fn classify_h265(payload: &[u8]) -> NalClass {
    if payload.is_empty() {
        return NalClass::Garbage;
    }
    let nal_type = (payload[0] >> 1) & 0x3F;
    match nal_type {
        32 | 33 | 34 => NalClass::Csd,      // VPS, SPS, PPS
        35 | 36 | 38 => NalClass::Garbage,  // AUD, EOS, filler
        _ => NalClass::Data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_code(len: usize) -> Vec<u8> {
        if len == 3 {
            vec![0, 0, 1]
        } else {
            vec![0, 0, 0, 1]
        }
    }

    #[test]
    fn h264_sps_is_classified_as_csd() {
        let mut bitstream = start_code(4);
        bitstream.push(0x67); // forbidden_zero=0, nal_ref_idc=3, type=7 (SPS)
        bitstream.extend_from_slice(&[1, 2, 3]);
        let nals = split_and_classify(&bitstream, Codec::H264);
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].class, NalClass::Csd);
    }

    #[test]
    fn h264_aud_is_stripped_as_garbage() {
        let mut bitstream = start_code(3);
        bitstream.push(0x09); // type=9 (AUD)
        bitstream.push(0xF0);
        let nals = split_and_classify(&bitstream, Codec::H264);
        assert_eq!(nals[0].class, NalClass::Garbage);
    }

    #[test]
    fn h264_idr_slice_is_data() {
        let mut bitstream = start_code(3);
        bitstream.push(0x65); // type=5 (IDR slice)
        bitstream.extend_from_slice(&[9, 9, 9]);
        let nals = split_and_classify(&bitstream, Codec::H264);
        assert_eq!(nals[0].class, NalClass::Data);
    }

    #[test]
    fn h265_vps_sps_pps_are_csd() {
        for nal_type in [32u8, 33, 34] {
            let mut bitstream = start_code(4);
            bitstream.push(nal_type << 1);
            bitstream.push(0x01);
            bitstream.extend_from_slice(&[1, 2]);
            let nals = split_and_classify(&bitstream, Codec::H265);
            assert_eq!(nals[0].class, NalClass::Csd, "nal_type={nal_type}");
        }
    }

    #[test]
    fn multiple_nals_in_one_bitstream_are_all_found() {
        let mut bitstream = start_code(4);
        bitstream.push(32 << 1); // VPS
        bitstream.push(0x01);
        bitstream.extend_from_slice(&start_code(3));
        bitstream.push(1 << 1); // regular slice (type 1)
        bitstream.push(0x01);
        bitstream.extend_from_slice(&[7, 7, 7]);

        let nals = split_and_classify(&bitstream, Codec::H265);
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0].class, NalClass::Csd);
        assert_eq!(nals[1].class, NalClass::Data);
    }

    #[test]
    fn bitstream_without_start_code_yields_no_nals() {
        let bitstream = vec![1, 2, 3, 4];
        assert!(split_and_classify(&bitstream, Codec::H264).is_empty());
    }
}
