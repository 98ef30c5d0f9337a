/// Raw MIDI byte decoding.
///
/// Only the event kind and the key number are extracted; everything that
/// is not a note message collapses to `EventKind::Other`.

use crate::event::EventKind;

/// Decode a buffer of raw MIDI bytes into `(kind, key)` pairs.
///
/// Handles running status for channel messages. A message cut short at the
/// end of the buffer is dropped.
pub fn decode_midi(data: &[u8]) -> Vec<(EventKind, u8)> {
    let mut decoder = MidiDecoder::default();
    let mut out = Vec::new();
    decoder.feed(data, |kind, key| out.push((kind, key)));
    out
}

/// Stateful decoder fed one read at a time.
///
/// A message split across reads is completed by the next `feed`. Realtime
/// bytes may appear anywhere, including between the data bytes of another
/// message, and never disturb the message being collected.
#[derive(Debug, Default, Clone)]
pub struct MidiDecoder {
    /// Status of the message being collected; kept after a channel
    /// message completes (running status)
    status: Option<u8>,
    data: [u8; 2],
    received: usize,
    in_sysex: bool,
}

/// Data bytes following `status`.
fn data_len(status: u8) -> usize {
    match status {
        0xF1 | 0xF3 => 1,
        0xF2 => 2,
        0xF4..=0xF7 => 0,
        s if s & 0xF0 == 0xC0 || s & 0xF0 == 0xD0 => 1,
        _ => 2,
    }
}

impl MidiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `data`, calling `emit` once per complete message.
    pub fn feed(&mut self, data: &[u8], mut emit: impl FnMut(EventKind, u8)) {
        for &byte in data {
            self.push_byte(byte, &mut emit);
        }
    }

    fn push_byte(&mut self, byte: u8, emit: &mut impl FnMut(EventKind, u8)) {
        // System realtime: single byte, may interleave with anything
        if byte >= 0xF8 {
            emit(EventKind::Other, 0);
            return;
        }

        if byte & 0x80 != 0 {
            // Any other status byte ends a SysEx dump
            if self.in_sysex {
                self.in_sysex = false;
                emit(EventKind::Other, 0);
                if byte == 0xF7 {
                    return;
                }
            }
            self.received = 0;

            match byte {
                0xF0 => {
                    self.status = None;
                    self.in_sysex = true;
                }
                // Stray end-of-exclusive
                0xF7 => self.status = None,
                0xF1..=0xF6 if data_len(byte) == 0 => {
                    self.status = None;
                    emit(EventKind::Other, 0);
                }
                _ => self.status = Some(byte),
            }
            return;
        }

        if self.in_sysex {
            return;
        }
        // Stray data byte
        let Some(status) = self.status else {
            return;
        };

        self.data[self.received] = byte;
        self.received += 1;
        if self.received < data_len(status) {
            return;
        }
        self.received = 0;

        let key = self.data[0];
        match status & 0xF0 {
            0x80 => emit(EventKind::NoteOff, key),
            // Velocity 0 = Note Off
            0x90 if self.data[1] == 0 => emit(EventKind::NoteOff, key),
            0x90 => emit(EventKind::NoteOn, key),
            0xF0 => {
                // System common messages cancel running status
                self.status = None;
                emit(EventKind::Other, 0);
            }
            _ => emit(EventKind::Other, 0),
        }
    }
}
