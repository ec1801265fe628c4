//! Resumable decode position within a packet payload.
//!
//! The cursor is the suspension point of `decode_until`: it remembers where in
//! the current buffer decoding stopped, and it carries the bytes of a unit that
//! was cut off at the end of a buffer over to the next one.

use tracing::warn;

use crate::accumulator::EventAccumulator;
use crate::codec::Codec;
use crate::error::DecodeError;

#[derive(Debug, Clone, Default)]
pub(crate) struct StreamCursor {
    /// Next byte to decode in the in-progress buffer
    offset: usize,
    /// True while a buffer has been started but not fully consumed
    in_progress: bool,
    /// Leading bytes of a unit cut off at the end of the previous buffer
    carry: Vec<u8>,
}

impl StreamCursor {
    /// True if the next call continues a partially decoded buffer.
    pub(crate) fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Number of bytes waiting for the rest of their unit.
    pub(crate) fn carry_len(&self) -> usize {
        self.carry.len()
    }

    /// Forgets the buffer position and any carry bytes.
    pub(crate) fn reset(&mut self) {
        self.offset = 0;
        self.in_progress = false;
        self.carry.clear();
    }

    /// Decodes `buf` from the stored position.
    ///
    /// With `limit` set, stops right before the first unit whose events would
    /// carry a time at or past the limit and returns that time. The unit is
    /// left pending. Returns `None` once the buffer is exhausted.
    pub(crate) fn advance(
        &mut self,
        codec: &mut dyn Codec,
        buf: &[u8],
        limit: Option<i64>,
        out: &mut EventAccumulator,
    ) -> Result<Option<i64>, DecodeError> {
        let unit_size = codec.unit_size();

        if self.in_progress && self.offset > buf.len() {
            warn!(
                offset = self.offset,
                len = buf.len(),
                "resumed buffer is shorter than the stored position, restarting"
            );
            self.offset = 0;
        }
        self.in_progress = true;

        let mut pos = self.offset;
        if pos == 0 && !self.carry.is_empty() {
            let need = unit_size - self.carry.len();
            if buf.len() < need {
                self.carry.extend_from_slice(buf);
                self.in_progress = false;
                return Ok(None);
            }
            let mut unit = Vec::with_capacity(unit_size);
            unit.extend_from_slice(&self.carry);
            unit.extend_from_slice(&buf[..need]);
            if let Some(t) = limit_hit(codec, &unit, limit) {
                return Ok(Some(t));
            }
            if let Err(fault) = codec.decode_unit(&unit, out) {
                self.reset();
                return Err(DecodeError::CorruptStream { offset: 0, fault });
            }
            self.carry.clear();
            pos = need;
        }

        while pos + unit_size <= buf.len() {
            let unit = &buf[pos..pos + unit_size];
            if let Some(t) = limit_hit(codec, unit, limit) {
                self.offset = pos;
                return Ok(Some(t));
            }
            if let Err(fault) = codec.decode_unit(unit, out) {
                self.reset();
                return Err(DecodeError::CorruptStream { offset: pos, fault });
            }
            pos += unit_size;
        }

        self.carry.extend_from_slice(&buf[pos..]);
        self.offset = 0;
        self.in_progress = false;
        Ok(None)
    }
}

#[inline]
fn limit_hit(codec: &dyn Codec, unit: &[u8], limit: Option<i64>) -> Option<i64> {
    let limit = limit?;
    codec.event_time(unit).filter(|&t| t >= limit)
}
