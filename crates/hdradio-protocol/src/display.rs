//! Display and annotation support for protocol frames
//!
//! Used for traffic logging: a hex dump of the wire bytes, and a breakdown of
//! an escaped frame into labelled segments with a one-line summary.

use std::fmt::Write;
use std::ops::Range;

use crate::codec::{checksum, decode_payload, ESCAPE, ESCAPED_HEADER, HEADER};
use crate::payload::Payload;

/// Format bytes as space-separated upper-case hex
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Type of segment within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    Header,
    Length,
    Command,
    Operation,
    Data,
    Checksum,
}

/// A labelled range of wire bytes
#[derive(Debug, Clone)]
pub struct FrameSegment {
    /// Byte range in the escaped frame
    pub range: Range<usize>,
    pub label: &'static str,
    pub value: String,
    pub segment_type: SegmentType,
}

/// An escaped frame broken into segments
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub segments: Vec<FrameSegment>,
    /// e.g. `REPLY VOLUME = 45`
    pub summary: String,
    pub checksum_ok: bool,
}

/// Break a single escaped frame into segments
///
/// Returns `None` if the bytes do not start with a header or end before the
/// checksum.
pub fn annotate_frame(frame: &[u8]) -> Option<AnnotatedFrame> {
    if frame.first() != Some(&HEADER) {
        return None;
    }

    // Unescape, remembering which wire range each logical byte came from
    let mut logical: Vec<(u8, Range<usize>)> = Vec::with_capacity(frame.len());
    let mut i = 1;
    while i < frame.len() {
        if frame[i] == ESCAPE {
            let next = *frame.get(i + 1)?;
            let value = if next == ESCAPED_HEADER { HEADER } else { next };
            logical.push((value, i..i + 2));
            i += 2;
        } else {
            logical.push((frame[i], i..i + 1));
            i += 1;
        }
    }

    let (length, length_range) = logical.first().cloned()?;
    let length = length as usize;
    let (check, check_range) = logical.get(1 + length).cloned()?;
    let payload: Vec<u8> = logical[1..1 + length].iter().map(|(b, _)| *b).collect();
    let span = |from: usize, to: usize| -> Range<usize> {
        logical[from].1.start..logical[to - 1].1.end
    };

    let mut segments = vec![
        FrameSegment {
            range: 0..1,
            label: "header",
            value: "A4".to_string(),
            segment_type: SegmentType::Header,
        },
        FrameSegment {
            range: length_range,
            label: "len",
            value: length.to_string(),
            segment_type: SegmentType::Length,
        },
    ];

    let decoded = decode_payload(&payload);
    if length >= 2 {
        segments.push(FrameSegment {
            range: span(1, 3),
            label: "cmd",
            value: decoded
                .as_ref()
                .map(|m| m.command.to_string())
                .unwrap_or_else(|_| hex_dump(&payload[..2])),
            segment_type: SegmentType::Command,
        });
    }
    if length >= 4 {
        segments.push(FrameSegment {
            range: span(3, 5),
            label: "op",
            value: decoded
                .as_ref()
                .map(|m| m.operation.to_string())
                .unwrap_or_else(|_| hex_dump(&payload[2..4])),
            segment_type: SegmentType::Operation,
        });
    }
    if length > 4 {
        segments.push(FrameSegment {
            range: span(5, 1 + length),
            label: "data",
            value: hex_dump(&payload[4..]),
            segment_type: SegmentType::Data,
        });
    }

    let checksum_ok = checksum(length as u8, &payload) == check;
    segments.push(FrameSegment {
        range: check_range,
        label: "sum",
        value: format!("{:02X}", check),
        segment_type: SegmentType::Checksum,
    });

    let summary = match decoded {
        Ok(msg) => match &msg.payload {
            Payload::None => format!("{} {}", msg.operation, msg.command),
            payload => format!("{} {} = {}", msg.operation, msg.command, describe(payload)),
        },
        Err(e) => format!("undecodable: {}", e),
    };

    Some(AnnotatedFrame {
        segments,
        summary,
        checksum_ok,
    })
}

fn describe(payload: &Payload) -> String {
    match payload {
        Payload::None => String::new(),
        Payload::Integer(v) => v.to_string(),
        Payload::Boolean(v) => v.to_string(),
        Payload::Text(t) => format!("{:?}", t),
        Payload::Tune(t) => t.to_string(),
        Payload::TuneStep(d) => format!("step {:?}", d),
        Payload::Seek(s) => format!(
            "seek {:?} {} ({})",
            s.direction,
            s.band,
            if s.seek_all { "all" } else { "HD only" }
        ),
        Payload::Song(s) => format!("[{}] {:?}", s.subchannel, s.text),
    }
}
