//! Byte cursor and per-call seek bookkeeping
//!
//! A [`ByteCursor`] walks a fully materialized byte buffer. Group nodes carve
//! sub-views over the remaining bytes with [`ByteCursor::view`] and later
//! advance the parent by exactly the bytes the view consumed. Positions are
//! always absolute within the backing buffer, so seek-map entries recorded at
//! any nesting level agree with each other.

use std::collections::HashMap;

use crate::error::DecodeError;
use crate::schema::NodeId;

/// Read cursor over a byte buffer.
///
/// Tracks two things independently: the current absolute `pos` (freely
/// movable by seek nodes) and the monotonic `consumed` count (bytes actually
/// taken), which is what a parent cursor advances by after a sub-view
/// finishes.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    start: usize,
    pos: usize,
    consumed: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor {
            data,
            start: 0,
            pos: 0,
            consumed: 0,
        }
    }

    /// Absolute position in the backing buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes between the current position and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Total bytes taken through this cursor (seeks do not count)
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Absolute position where this cursor's window begins
    pub fn window_start(&self) -> usize {
        self.start
    }

    /// Sub-cursor over the remaining bytes, starting at the current position
    pub fn view(&self) -> ByteCursor<'a> {
        ByteCursor {
            data: self.data,
            start: self.pos,
            pos: self.pos,
            consumed: 0,
        }
    }

    /// Take `n` bytes, advancing position and consumed count
    pub fn take(&mut self, n: usize, path: &str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::ShortRead {
                path: path.to_string(),
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        self.consumed += n;
        Ok(slice)
    }

    /// Skip `n` bytes; they still count as consumed
    pub fn skip(&mut self, n: usize, path: &str) -> Result<(), DecodeError> {
        self.take(n, path).map(|_| ())
    }

    /// Move to an absolute position without consuming anything
    pub fn seek_to(&mut self, target: i64, path: &str) -> Result<(), DecodeError> {
        if target < 0 || target as usize > self.data.len() {
            return Err(DecodeError::SeekOutOfBounds {
                path: path.to_string(),
                target,
                len: self.data.len(),
            });
        }
        self.pos = target as usize;
        Ok(())
    }

    /// Move relative to the current position without consuming anything
    pub fn seek_by(&mut self, delta: i64, path: &str) -> Result<(), DecodeError> {
        self.seek_to(self.pos as i64 + delta, path)
    }
}

/// Per-call table from node identity to a recorded byte position.
///
/// Decode and encode both record every node's start position as they visit
/// it; seek nodes consult the table to resolve anchors and locate the
/// placeholder bytes they must patch.
#[derive(Debug, Default)]
pub struct SeekMap {
    positions: HashMap<NodeId, usize>,
}

impl SeekMap {
    pub fn record(&mut self, id: NodeId, pos: usize) {
        self.positions.insert(id, pos);
    }

    pub fn lookup(&self, id: NodeId) -> Option<usize> {
        self.positions.get(&id).copied()
    }
}

/// Byte count a padding node occupies at `pos`.
///
/// Alignment is measured from the position after the pad: the pad is at
/// least `length` bytes and extends until `pos + pad` is a multiple of
/// `align` (when `align` is non-zero).
pub(crate) fn pad_len(pos: usize, length: usize, align: usize) -> usize {
    let mut end = pos + length;
    if align != 0 && end % align != 0 {
        end += align - end % align;
    }
    end - pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_and_consumed() {
        let data = [1u8, 2, 3, 4, 5];
        let mut cur = ByteCursor::new(&data);
        assert_eq!(cur.take(2, "f").unwrap(), &[1, 2]);
        assert_eq!(cur.position(), 2);
        assert_eq!(cur.consumed(), 2);
        assert_eq!(cur.remaining(), 3);
    }

    #[test]
    fn test_short_read() {
        let data = [1u8, 2];
        let mut cur = ByteCursor::new(&data);
        let err = cur.take(4, "f").unwrap_err();
        match err {
            DecodeError::ShortRead {
                needed, remaining, ..
            } => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_view_is_absolute() {
        let data = [0u8; 8];
        let mut cur = ByteCursor::new(&data);
        cur.take(3, "f").unwrap();
        let mut sub = cur.view();
        assert_eq!(sub.position(), 3);
        assert_eq!(sub.window_start(), 3);
        sub.take(2, "f").unwrap();
        assert_eq!(sub.consumed(), 2);
        // parent is untouched until explicitly advanced
        assert_eq!(cur.position(), 3);
    }

    #[test]
    fn test_seek_does_not_consume() {
        let data = [0u8; 8];
        let mut cur = ByteCursor::new(&data);
        cur.seek_to(6, "f").unwrap();
        assert_eq!(cur.position(), 6);
        assert_eq!(cur.consumed(), 0);
        cur.seek_by(-4, "f").unwrap();
        assert_eq!(cur.position(), 2);
        assert!(cur.seek_by(-3, "f").is_err());
        assert!(cur.seek_to(9, "f").is_err());
    }

    #[test]
    fn test_pad_len() {
        // end lands on 8, already a multiple of 4
        assert_eq!(pad_len(5, 3, 4), 3);
        // end lands on 7, rounded up to 8
        assert_eq!(pad_len(5, 2, 4), 3);
        assert_eq!(pad_len(0, 0, 4), 0);
        assert_eq!(pad_len(1, 0, 4), 3);
        assert_eq!(pad_len(3, 2, 0), 2);
    }
}
