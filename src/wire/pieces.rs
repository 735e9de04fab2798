/// Tracks which metadata pieces have arrived.
///
/// Bits are numbered from the high bit of the first byte, like a BEP-3
/// bitfield. The set count is maintained incrementally so completion is
/// checked in constant time after every piece.
#[derive(Debug, Clone)]
pub struct PieceSet {
    bits: Vec<u8>,
    piece_count: usize,
    received: usize,
}

impl PieceSet {
    pub fn new(piece_count: usize) -> Self {
        Self {
            bits: vec![0; piece_count.div_ceil(8)],
            piece_count,
            received: 0,
        }
    }

    pub fn has(&self, index: usize) -> bool {
        if index >= self.piece_count {
            return false;
        }
        (self.bits[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    /// Marks a piece as received. Returns `true` if it was not already set;
    /// out-of-range indices are never set.
    pub fn set(&mut self, index: usize) -> bool {
        if index >= self.piece_count || self.has(index) {
            return false;
        }
        self.bits[index / 8] |= 1 << (7 - index % 8);
        self.received += 1;
        true
    }

    pub fn count(&self) -> usize {
        self.received
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.piece_count
    }
}
