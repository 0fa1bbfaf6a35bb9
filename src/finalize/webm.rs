//! WebM / Matroska duration repair
//!
//! Incremental encoders write the Segment before they know how long the
//! recording is, so `Info/Duration` is either zero or missing. This rewrites
//! the value in place, or inserts an 8-byte float Duration at the end of Info
//! and shifts every size and seek position that covers the insertion point.

use crate::error::{CaptureError, Result};

const SEGMENT: u32 = 0x1853_8067;
const SEEK_HEAD: u32 = 0x114D_9B74;
const SEEK: u32 = 0x4DBB;
const SEEK_POSITION: u32 = 0x53AC;
const INFO: u32 = 0x1549_A966;
const TIMECODE_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;
const CUES: u32 = 0x1C53_BB6B;
const CUE_POINT: u32 = 0xBB;
const CUE_TRACK_POSITIONS: u32 = 0xB7;
const CUE_CLUSTER_POSITION: u32 = 0xF1;

/// Matroska default: timestamps in milliseconds
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

fn malformed(reason: impl Into<String>) -> CaptureError {
    CaptureError::encoding("video/webm", reason)
}

/// Header of one EBML element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Element {
    id: u32,
    start: usize,
    size_pos: usize,
    size_len: usize,
    data_start: usize,
    /// `None` when the size is "unknown" (all value bits set)
    size: Option<u64>,
}

impl Element {
    /// End of the payload, clamped to `limit` for truncated or live-written files
    fn data_end(&self, limit: usize) -> usize {
        match self.size {
            Some(size) => self
                .data_start
                .saturating_add(usize::try_from(size).unwrap_or(usize::MAX))
                .min(limit),
            None => limit,
        }
    }
}

fn parse_element(buf: &[u8], pos: usize) -> Result<Element> {
    let first = *buf.get(pos).ok_or_else(|| malformed("truncated element id"))?;
    let id_len = first.leading_zeros() as usize + 1;
    if id_len > 4 {
        return Err(malformed(format!("invalid element id at {pos}")));
    }
    let id_bytes = buf
        .get(pos..pos + id_len)
        .ok_or_else(|| malformed("truncated element id"))?;
    let id = id_bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);

    let size_pos = pos + id_len;
    let first = *buf.get(size_pos).ok_or_else(|| malformed("truncated element size"))?;
    let size_len = first.leading_zeros() as usize + 1;
    if size_len > 8 {
        return Err(malformed(format!("invalid element size at {size_pos}")));
    }
    let size_bytes = buf
        .get(size_pos..size_pos + size_len)
        .ok_or_else(|| malformed("truncated element size"))?;
    // An 8-byte field has no value bits in its first byte
    let mut value = u64::from(first) & (0xFFu64 >> size_len);
    for &b in &size_bytes[1..] {
        value = (value << 8) | b as u64;
    }
    let unknown = value == (1u64 << (7 * size_len)) - 1;

    Ok(Element {
        id,
        start: pos,
        size_pos,
        size_len,
        data_start: size_pos + size_len,
        size: (!unknown).then_some(value),
    })
}

/// Direct children in `start..end`. Stops after an unknown-size child, since
/// nothing behind it can be located without parsing its contents.
fn children(buf: &[u8], start: usize, end: usize) -> Result<Vec<Element>> {
    let mut out = Vec::new();
    let mut pos = start;
    while pos < end {
        let element = parse_element(buf, pos)?;
        out.push(element);
        if element.size.is_none() {
            break;
        }
        pos = element.data_end(end);
    }
    Ok(out)
}

/// All elements reached from `parent` by following `path`
fn descendants(buf: &[u8], parent: &Element, limit: usize, path: &[u32]) -> Result<Vec<Element>> {
    let Some((&id, rest)) = path.split_first() else {
        return Ok(vec![*parent]);
    };
    let end = parent.data_end(limit);
    let mut found = Vec::new();
    for child in children(buf, parent.data_start, end)? {
        if child.id == id {
            found.extend(descendants(buf, &child, end, rest)?);
        }
    }
    Ok(found)
}

fn payload<'a>(buf: &'a [u8], element: &Element) -> Result<&'a [u8]> {
    let size = element
        .size
        .ok_or_else(|| malformed("unknown-size value element"))? as usize;
    element
        .data_start
        .checked_add(size)
        .and_then(|end| buf.get(element.data_start..end))
        .ok_or_else(|| malformed("truncated value element"))
}

fn read_uint(buf: &[u8], element: &Element) -> Result<u64> {
    let bytes = payload(buf, element)?;
    if bytes.len() > 8 {
        return Err(malformed("unsigned integer wider than 8 bytes"));
    }
    Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

fn read_float(buf: &[u8], element: &Element) -> Result<f64> {
    let bytes = payload(buf, element)?;
    match bytes.len() {
        4 => Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Ok(f64::from_be_bytes(raw))
        }
        0 => Ok(0.0),
        n => Err(malformed(format!("float of {n} bytes"))),
    }
}

/// Overwrite a size field keeping its width
fn write_size(buf: &mut [u8], element: &Element, value: u64) -> Result<()> {
    let len = element.size_len;
    // All-ones is reserved for "unknown"
    if value >= (1u64 << (7 * len)) - 1 {
        return Err(malformed(format!("size {value} does not fit in {len} bytes")));
    }
    let encoded = value | (1u64 << (7 * len));
    let bytes = encoded.to_be_bytes();
    buf[element.size_pos..element.size_pos + len].copy_from_slice(&bytes[8 - len..]);
    Ok(())
}

/// Overwrite an unsigned integer payload keeping its width
fn write_uint(buf: &mut [u8], element: &Element, value: u64) -> Result<()> {
    let len = payload(buf, element)?.len();
    if len < 8 && value >> (8 * len) != 0 {
        return Err(malformed(format!("position {value} does not fit in {len} bytes")));
    }
    let bytes = value.to_be_bytes();
    buf[element.data_start..element.data_start + len].copy_from_slice(&bytes[8 - len..]);
    Ok(())
}

struct Layout {
    segment: Element,
    info: Element,
    info_fields: Vec<Element>,
}

fn locate(buf: &[u8]) -> Result<Layout> {
    let segment = children(buf, 0, buf.len())?
        .into_iter()
        .find(|e| e.id == SEGMENT)
        .ok_or_else(|| malformed("no Segment element"))?;
    let segment_end = segment.data_end(buf.len());
    let info = children(buf, segment.data_start, segment_end)?
        .into_iter()
        .find(|e| e.id == INFO)
        .ok_or_else(|| malformed("no Info element before the first cluster"))?;
    let info_size = info.size.ok_or_else(|| malformed("Info has unknown size"))?;
    let info_complete = usize::try_from(info_size)
        .ok()
        .and_then(|size| info.data_start.checked_add(size))
        .is_some_and(|end| end <= segment_end);
    if !info_complete {
        return Err(malformed("truncated Info element"));
    }
    let info_fields = children(buf, info.data_start, info.data_end(segment_end))?;
    Ok(Layout {
        segment,
        info,
        info_fields,
    })
}

fn timecode_scale(buf: &[u8], layout: &Layout) -> Result<u64> {
    let scale = match layout.info_fields.iter().find(|e| e.id == TIMECODE_SCALE) {
        Some(e) => read_uint(buf, e)?,
        None => DEFAULT_TIMECODE_SCALE,
    };
    if scale == 0 {
        return Err(malformed("TimecodeScale is zero"));
    }
    Ok(scale)
}

/// Duration stored in the file, in milliseconds, if there is one
pub fn read_duration_ms(buf: &[u8]) -> Result<Option<f64>> {
    let layout = locate(buf)?;
    let scale = timecode_scale(buf, &layout)?;
    match layout.info_fields.iter().find(|e| e.id == DURATION) {
        Some(e) => Ok(Some(read_float(buf, e)? * scale as f64 / 1_000_000.0)),
        None => Ok(None),
    }
}

/// Return a copy of `buf` with `Info/Duration` set to `duration_ms`
pub fn set_duration(buf: &[u8], duration_ms: u64) -> Result<Vec<u8>> {
    if duration_ms == 0 {
        return Err(malformed("no duration measured"));
    }
    let layout = locate(buf)?;
    let scale = timecode_scale(buf, &layout)?;
    let ticks = duration_ms as f64 * 1_000_000.0 / scale as f64;
    let mut out = buf.to_vec();

    if let Some(existing) = layout.info_fields.iter().find(|e| e.id == DURATION) {
        read_float(buf, existing)?;
        let at = existing.data_start;
        match existing.size {
            Some(4) => out[at..at + 4].copy_from_slice(&(ticks as f32).to_be_bytes()),
            Some(8) => out[at..at + 8].copy_from_slice(&ticks.to_be_bytes()),
            other => return Err(malformed(format!("Duration of {other:?} bytes"))),
        }
        log::debug!("Rewrote WebM duration to {} ms", duration_ms);
        return Ok(out);
    }

    let mut element = vec![0x44, 0x89, 0x88];
    element.extend_from_slice(&ticks.to_be_bytes());
    let grow = element.len() as u64;

    let segment = layout.segment;
    let info = layout.info;
    let segment_end = segment.data_end(buf.len());
    let insert_at = info.data_end(segment_end);

    // Fixed-width fields first, while offsets in `out` still match `buf`
    write_size(&mut out, &info, info.size.unwrap_or_default() + grow)?;
    if let Some(size) = segment.size {
        write_size(&mut out, &segment, size + grow)?;
    }

    let info_offset = (info.start - segment.data_start) as u64;
    let positions = descendants(buf, &segment, buf.len(), &[SEEK_HEAD, SEEK, SEEK_POSITION])?
        .into_iter()
        .chain(descendants(
            buf,
            &segment,
            buf.len(),
            &[CUES, CUE_POINT, CUE_TRACK_POSITIONS, CUE_CLUSTER_POSITION],
        )?);
    for position in positions {
        let value = read_uint(buf, &position)?;
        if value > info_offset {
            let shifted = value
                .checked_add(grow)
                .ok_or_else(|| malformed(format!("position {value} overflows")))?;
            write_uint(&mut out, &position, shifted)?;
        }
    }

    out.splice(insert_at..insert_at, element);
    log::debug!("Inserted WebM duration of {} ms", duration_ms);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACKS: [u8; 4] = [0x16, 0x54, 0xAE, 0x6B];
    const CLUSTER: [u8; 4] = [0x1F, 0x43, 0xB6, 0x75];

    fn id_bytes(id: u32) -> Vec<u8> {
        let bytes = id.to_be_bytes();
        let skip = bytes.iter().position(|&b| b != 0).unwrap_or(3);
        bytes[skip..].to_vec()
    }

    /// Element with an 8-byte size field
    fn el(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut v = id_bytes(id);
        let size = (payload.len() as u64) | (1u64 << 56);
        v.extend_from_slice(&size.to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    /// Element with a 1-byte size field
    fn el1(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut v = id_bytes(id);
        v.push(0x80 | payload.len() as u8);
        v.extend_from_slice(payload);
        v
    }

    fn ebml_header() -> Vec<u8> {
        el(0x1A45_DFA3, &el1(0x4282, b"webm"))
    }

    fn seek(id: &[u8], position: u32) -> Vec<u8> {
        let mut body = el1(0x53AB, id);
        body.extend(el1(SEEK_POSITION, &position.to_be_bytes()));
        el1(SEEK, &body)
    }

    fn info(fields: &[Vec<u8>]) -> Vec<u8> {
        el(INFO, &fields.concat())
    }

    fn file(segment_payload: &[u8], unknown_size: bool) -> Vec<u8> {
        let mut out = ebml_header();
        if unknown_size {
            out.extend(id_bytes(SEGMENT));
            out.extend([0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
            out.extend_from_slice(segment_payload);
        } else {
            out.extend(el(SEGMENT, segment_payload));
        }
        out
    }

    fn cluster() -> Vec<u8> {
        let mut v = CLUSTER.to_vec();
        v.extend([0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        v.extend(el1(0xE7, &[0]));
        v.extend([0xA3, 0x84, 1, 2, 3, 4]);
        v
    }

    fn segment_of(buf: &[u8]) -> Element {
        children(buf, 0, buf.len())
            .unwrap()
            .into_iter()
            .find(|e| e.id == SEGMENT)
            .unwrap()
    }

    #[test]
    fn test_rewrites_zero_duration_in_place() {
        let info = info(&[el1(TIMECODE_SCALE, &[0x0F, 0x42, 0x40]), el1(DURATION, &0f64.to_be_bytes())]);
        let mut payload = info;
        payload.extend(cluster());
        let input = file(&payload, true);

        let output = set_duration(&input, 3000).unwrap();
        assert_eq!(output.len(), input.len());
        assert_eq!(read_duration_ms(&output).unwrap(), Some(3000.0));
    }

    #[test]
    fn test_rewrites_four_byte_float() {
        let payload = info(&[el1(DURATION, &0f32.to_be_bytes())]);
        let output = set_duration(&file(&payload, false), 1500).unwrap();
        assert_eq!(read_duration_ms(&output).unwrap(), Some(1500.0));
    }

    #[test]
    fn test_honors_timecode_scale() {
        // Microsecond ticks
        let payload = info(&[el1(TIMECODE_SCALE, &[0x03, 0xE8]), el1(DURATION, &0f64.to_be_bytes())]);
        let output = set_duration(&file(&payload, false), 2500).unwrap();
        let layout = locate(&output).unwrap();
        let duration = layout.info_fields.iter().find(|e| e.id == DURATION).unwrap();
        assert_eq!(read_float(&output, duration).unwrap(), 2_500_000.0);
        assert_eq!(read_duration_ms(&output).unwrap(), Some(2500.0));
    }

    #[test]
    fn test_inserts_missing_duration_and_shifts_seeks() {
        let info = info(&[el1(TIMECODE_SCALE, &[0x0F, 0x42, 0x40])]);
        let tracks = el(u32::from_be_bytes(TRACKS), &[0xAE, 0x80]);
        let seek_head_len = el(SEEK_HEAD, &[seek(&INFO.to_be_bytes(), 0), seek(&TRACKS, 0)].concat()).len();
        let info_pos = seek_head_len as u32;
        let tracks_pos = info_pos + info.len() as u32;
        let seek_head = el(
            SEEK_HEAD,
            &[seek(&INFO.to_be_bytes(), info_pos), seek(&TRACKS, tracks_pos)].concat(),
        );
        let payload = [seek_head, info, tracks].concat();
        let input = file(&payload, false);

        let output = set_duration(&input, 4200).unwrap();
        assert_eq!(output.len(), input.len() + 11);
        assert_eq!(read_duration_ms(&output).unwrap(), Some(4200.0));

        let segment = segment_of(&output);
        assert_eq!(segment.size, Some(payload.len() as u64 + 11));
        assert_eq!(segment.data_end(output.len()), output.len());

        let positions: Vec<u64> =
            descendants(&output, &segment, output.len(), &[SEEK_HEAD, SEEK, SEEK_POSITION])
                .unwrap()
                .iter()
                .map(|p| read_uint(&output, p).unwrap())
                .collect();
        assert_eq!(positions, vec![info_pos as u64, tracks_pos as u64 + 11]);

        let kids = children(&output, segment.data_start, output.len()).unwrap();
        let tracks = kids.iter().find(|e| e.id == u32::from_be_bytes(TRACKS)).unwrap();
        assert_eq!((tracks.start - segment.data_start) as u64, tracks_pos as u64 + 11);
    }

    #[test]
    fn test_inserts_into_live_stream_with_unknown_segment_size() {
        let mut payload = info(&[]);
        payload.extend(cluster());
        let input = file(&payload, true);

        let output = set_duration(&input, 900).unwrap();
        assert_eq!(read_duration_ms(&output).unwrap(), Some(900.0));
        assert_eq!(segment_of(&output).size, None);
        // The cluster is still intact after the insertion
        assert!(output.ends_with(&cluster()));
    }

    #[test]
    fn test_full_size_field_is_rejected() {
        // Info claims the largest 1-byte size, so growing it cannot fit
        let mut info = id_bytes(INFO);
        info.push(0x80 | 0x7E);
        info.extend(el1(0xEC, &[0u8; 0x7C]));
        let input = [ebml_header(), el(SEGMENT, &info)].concat();
        assert!(set_duration(&input, 1000).is_err());
    }

    #[test]
    fn test_reads_eight_byte_size_fields() {
        let known = el(INFO, &[0u8; 3]);
        let element = parse_element(&known, 0).unwrap();
        assert_eq!(element.size_len, 8);
        assert_eq!(element.size, Some(3));
        assert_eq!(element.data_start, 12);

        let live = cluster();
        let element = parse_element(&live, 0).unwrap();
        assert_eq!(element.size_len, 8);
        assert_eq!(element.size, None);
    }

    #[test]
    fn test_truncated_info_is_rejected() {
        let payload = info(&[el1(TIMECODE_SCALE, &[0x0F, 0x42, 0x40]), el1(DURATION, &0f64.to_be_bytes())]);
        let input = file(&payload, true);
        assert!(set_duration(&input[..input.len() - 1], 1000).is_err());
        assert!(set_duration(&input, 1000).is_ok());
    }

    #[test]
    fn test_rejects_garbage_and_zero_duration() {
        assert!(set_duration(b"not a webm file", 1000).is_err());
        assert!(set_duration(&[], 1000).is_err());
        let payload = info(&[]);
        assert!(set_duration(&file(&payload, false), 0).is_err());
    }
}
