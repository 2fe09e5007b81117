//! Incremental (`INCR`) transfers of large selection contents.
//!
//! A selection owner which cannot store its data with a single property change announces an
//! incremental transfer by storing a property of type `INCR` holding a size hint. The data then
//! follows in chunks: the receiver deletes the property to ask for the next chunk and the owner
//! stores it, until a chunk of zero length marks the end.
//!
//! [`IncrReader`] assembles data we fetch from a desktop owner this way and [`IncrWriter`] serves
//! data to a desktop requestor.

use x11rb::protocol::xproto::{Atom, Window};

/// Capacity above which the incremental read buffer is released after a transfer.
pub const HIGH_WATER_MARK: usize = 512 * 1024;

/// Upper bound for the data stored with a single property change.
pub const MAX_PROPERTY_SIZE: usize = 256 * 1024;

/// Room left in a request for everything besides the property data.
pub const PROPERTY_SIZE_MARGIN: usize = 100;

/// Returns how many bytes may be stored with one property change.
///
/// `max_request_bytes` is the maximum request length of the display connection.
pub fn max_property_size(max_request_bytes: usize) -> usize {
    max_request_bytes
        .saturating_sub(PROPERTY_SIZE_MARGIN)
        .min(MAX_PROPERTY_SIZE)
}

/// Assembles an incremental transfer from a selection owner.
///
/// The buffer is kept between transfers, unless it grew past [`HIGH_WATER_MARK`].
#[derive(Debug, Default)]
pub struct IncrReader {
    buffer: Vec<u8>,
    active: bool,
}

impl IncrReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transfer is in progress.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Starts a transfer. `size_hint` is the size announced by the owner, which is advisory.
    pub fn begin(&mut self, size_hint: usize) {
        self.buffer.clear();
        // Owners are free to announce any lower bound, don't trust it too much.
        self.buffer.reserve(size_hint.min(HIGH_WATER_MARK));
        self.active = true;
    }

    /// Appends a chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of bytes received so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Ends the transfer, returning the assembled data.
    pub fn finish(&mut self) -> Vec<u8> {
        self.active = false;
        if self.buffer.capacity() > HIGH_WATER_MARK {
            return std::mem::take(&mut self.buffer);
        }

        let data = self.buffer.clone();
        self.buffer.clear();
        data
    }

    /// Ends the transfer, dropping what was received.
    pub fn abort(&mut self) {
        self.reset();
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    fn reset(&mut self) {
        self.active = false;
        self.buffer.clear();
        if self.buffer.capacity() > HIGH_WATER_MARK {
            self.buffer = Vec::new();
        }
    }
}

/// Serves data to a requestor in chunks.
///
/// Created after the `INCR` announcement has been stored; every deletion of the property by the
/// requestor asks for the next chunk.
#[derive(Debug)]
pub struct IncrWriter {
    data: Vec<u8>,
    pos: usize,
    requestor: Window,
    property: Atom,
    target: Atom,
}

impl IncrWriter {
    pub fn new(data: Vec<u8>, requestor: Window, property: Atom, target: Atom) -> Self {
        Self {
            data,
            pos: 0,
            requestor,
            property,
            target,
        }
    }

    #[inline]
    pub fn requestor(&self) -> Window {
        self.requestor
    }

    #[inline]
    pub fn property(&self) -> Atom {
        self.property
    }

    /// The type the chunks are stored as.
    #[inline]
    pub fn target(&self) -> Atom {
        self.target
    }

    pub fn total_len(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes already handed out.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether a property event on `window` concerns this transfer.
    pub fn matches(&self, window: Window, property: Atom) -> bool {
        self.requestor == window && self.property == property
    }

    /// Returns the next chunk of at most `max_len` bytes.
    ///
    /// Once all data has been handed out, returns empty chunks; the first of them terminates the
    /// transfer on the wire.
    pub fn next_chunk(&mut self, max_len: usize) -> &[u8] {
        let start = self.pos;
        let end = start + (self.data.len() - start).min(max_len);
        self.pos = end;
        &self.data[start..end]
    }
}
