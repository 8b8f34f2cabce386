// Frame codec for the Pro hardware family
//
// Command frame:  [start, left, right, flipper, kind, arg, checksum]
// Response frame: [start, element, value_hi, value_lo, checksum]
//
// Marker, frame lengths and checksum algorithm come from the `FrameLayout`
// supplied at construction; the byte positions above are what the Pro board
// firmware speaks.

use tracing::trace;

/// Wire layout parameters for one hardware family
#[derive(Debug, Clone, Copy)]
pub struct FrameLayout {
    pub start_marker: u8,
    pub command_len: usize,
    pub response_len: usize,
    pub checksum: ChecksumKind,
}

/// Trailing integrity field variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// `255 - (sum of payload bytes % 255)`
    ComplementSum,
    /// Trailing byte carried but not validated
    None,
}

impl ChecksumKind {
    fn compute(self, payload: &[u8]) -> u8 {
        match self {
            ChecksumKind::ComplementSum => {
                let sum: u32 = payload.iter().map(|&b| u32::from(b)).sum();
                (255 - sum % 255) as u8
            }
            ChecksumKind::None => 0,
        }
    }

    fn validates(self, payload: &[u8], received: u8) -> bool {
        match self {
            ChecksumKind::ComplementSum => self.compute(payload) == received,
            ChecksumKind::None => true,
        }
    }
}

/// Command identifiers the Pro board accepts
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Drive the motors with the three speed bytes; arg unused
    Drive = 0,
    /// Request one telemetry element; arg selects the element
    DataRequest = 10,
}

/// Error types for frame encoding
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Parameter {value} does not fit the frame field")]
    ParameterOutOfRange { value: i32 },
}

/// One decoded telemetry record from the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseRecord {
    pub element: u8,
    pub value: u16,
}

/// A decoded command frame, used by diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCommand {
    pub motors: [u8; 3],
    pub kind: u8,
    pub arg: u8,
}

/// Encoder/decoder for the Pro wire format.
///
/// Inbound bytes are buffered internally; `feed` only emits records for
/// complete, checksum-valid frames and resynchronizes on the next start
/// marker after garbage.
pub struct ProFrameCodec {
    layout: FrameLayout,
    rx_buf: Vec<u8>,
}

impl ProFrameCodec {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            rx_buf: Vec::new(),
        }
    }

    /// Build one outbound command frame.
    ///
    /// `arg` must fit the single frame byte; out-of-range values are rejected
    /// rather than wrapped.
    pub fn encode_command(
        &self,
        motors: [u8; 3],
        kind: CommandKind,
        arg: i32,
    ) -> Result<Vec<u8>, CodecError> {
        let arg = u8::try_from(arg).map_err(|_| CodecError::ParameterOutOfRange { value: arg })?;

        let mut frame = Vec::with_capacity(self.layout.command_len);
        frame.push(self.layout.start_marker);
        frame.extend_from_slice(&motors);
        frame.push(kind as u8);
        frame.push(arg);
        frame.push(self.layout.checksum.compute(&frame[1..]));

        debug_assert_eq!(frame.len(), self.layout.command_len);
        Ok(frame)
    }

    /// Parse an outbound command frame back into its fields.
    pub fn decode_command(&self, frame: &[u8]) -> Option<DecodedCommand> {
        if frame.len() != self.layout.command_len || frame[0] != self.layout.start_marker {
            return None;
        }
        let body = &frame[1..self.layout.command_len - 1];
        if !self
            .layout
            .checksum
            .validates(body, frame[self.layout.command_len - 1])
        {
            return None;
        }
        Some(DecodedCommand {
            motors: [frame[1], frame[2], frame[3]],
            kind: frame[4],
            arg: frame[5],
        })
    }

    /// Build one telemetry frame as the robot would send it.
    pub fn encode_response(&self, element: u8, value: u16) -> Vec<u8> {
        let [hi, lo] = value.to_be_bytes();
        let mut frame = Vec::with_capacity(self.layout.response_len);
        frame.push(self.layout.start_marker);
        frame.push(element);
        frame.push(hi);
        frame.push(lo);
        frame.push(self.layout.checksum.compute(&frame[1..]));
        frame
    }

    /// Buffer inbound bytes and emit every complete valid record.
    ///
    /// Transport reads are not aligned to frame boundaries; partial frames
    /// stay buffered, unrecognizable bytes are discarded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ResponseRecord> {
        self.rx_buf.extend_from_slice(bytes);

        let mut records = Vec::new();
        loop {
            // Resynchronize on the next start marker
            match self.rx_buf.iter().position(|&b| b == self.layout.start_marker) {
                Some(0) => {}
                Some(pos) => {
                    trace!("Discarding {} unsynchronized bytes", pos);
                    self.rx_buf.drain(..pos);
                }
                None => {
                    if !self.rx_buf.is_empty() {
                        trace!("Discarding {} unsynchronized bytes", self.rx_buf.len());
                        self.rx_buf.clear();
                    }
                    break;
                }
            }

            if self.rx_buf.len() < self.layout.response_len {
                break;
            }

            let frame = &self.rx_buf[..self.layout.response_len];
            let body = &frame[1..self.layout.response_len - 1];
            if !self
                .layout
                .checksum
                .validates(body, frame[self.layout.response_len - 1])
            {
                // A marker byte that did not start a real frame; skip it and
                // hunt for the next one.
                trace!("Checksum mismatch, resynchronizing");
                self.rx_buf.drain(..1);
                continue;
            }

            records.push(ResponseRecord {
                element: frame[1],
                value: u16::from_be_bytes([frame[2], frame[3]]),
            });
            self.rx_buf.drain(..self.layout.response_len);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PRO_FRAME_LAYOUT;

    fn codec() -> ProFrameCodec {
        ProFrameCodec::new(PRO_FRAME_LAYOUT)
    }

    #[test]
    fn command_round_trip() {
        let codec = codec();
        for arg in [0, 1, 24, 255] {
            let frame = codec
                .encode_command([125, 200, 50], CommandKind::DataRequest, arg)
                .unwrap();
            assert_eq!(frame.len(), 7);
            assert_eq!(frame[0], 253);

            let decoded = codec.decode_command(&frame).unwrap();
            assert_eq!(decoded.motors, [125, 200, 50]);
            assert_eq!(decoded.kind, CommandKind::DataRequest as u8);
            assert_eq!(i32::from(decoded.arg), arg);
        }
    }

    #[test]
    fn out_of_range_arg_is_rejected_not_wrapped() {
        let codec = codec();
        assert!(
            codec
                .encode_command([125; 3], CommandKind::DataRequest, 256)
                .is_err()
        );
        assert!(
            codec
                .encode_command([125; 3], CommandKind::DataRequest, -1)
                .is_err()
        );
    }

    #[test]
    fn response_round_trip() {
        let mut codec = codec();
        let frame = codec.encode_response(24, 0x0102);
        let records = codec.feed(&frame);
        assert_eq!(
            records,
            vec![ResponseRecord {
                element: 24,
                value: 0x0102
            }]
        );
    }

    #[test]
    fn partial_frames_are_buffered_until_complete() {
        let mut codec = codec();
        let frame = codec.encode_response(2, 1200);

        assert!(codec.feed(&frame[..2]).is_empty());
        assert!(codec.feed(&frame[2..4]).is_empty());
        let records = codec.feed(&frame[4..]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].element, 2);
        assert_eq!(records[0].value, 1200);
    }

    #[test]
    fn garbage_is_discarded_and_decoder_resyncs() {
        let mut codec = codec();
        let frame = codec.encode_response(0, 77);

        let mut stream = vec![0x00, 0x42, 0x99];
        stream.extend_from_slice(&frame);
        let records = codec.feed(&stream);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 77);
    }

    #[test]
    fn corrupted_frame_is_dropped_next_frame_still_decodes() {
        let mut codec = codec();
        let mut bad = codec.encode_response(4, 500);
        bad[2] ^= 0xFF; // corrupt the value, checksum no longer matches
        let good = codec.encode_response(4, 500);

        let mut stream = bad;
        stream.extend_from_slice(&good);
        let records = codec.feed(&stream);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 500);
    }

    #[test]
    fn two_frames_in_one_read_both_decode() {
        let mut codec = codec();
        let mut stream = codec.encode_response(20, 311);
        stream.extend_from_slice(&codec.encode_response(22, 298));

        let records = codec.feed(&stream);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].element, 20);
        assert_eq!(records[1].element, 22);
    }
}
