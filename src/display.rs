//! Abstraction over the display connection.
//!
//! The bridge never talks to the X server directly. Everything it needs goes through the
//! [`Display`] trait, and everything it hears comes back as an [`Event`]. The real implementation
//! lives in [`crate::x11`]; tests drive the bridge with an in-memory one.

use x11rb::protocol::xproto::{Atom, Timestamp, Window};

use crate::common::Error;

/// Size of a screen configuration, in pixels.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct ScreenSize {
    pub width: u16,
    pub height: u16,
}

/// Whether a property was changed or deleted.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PropertyState {
    NewValue,
    Deleted,
}

/// A request from an application for the contents of a selection we own.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SelectionRequest {
    pub time: Timestamp,
    pub requestor: Window,
    pub selection: Atom,
    pub target: Atom,
    /// The property to store the data in, or `NONE` for obsolete clients.
    pub property: Atom,
}

impl SelectionRequest {
    /// Returns the property the reply must be stored in.
    ///
    /// Obsolete clients leave the property unset; the target name is used instead then.
    #[inline]
    pub fn reply_property(&self) -> Atom {
        if self.property == x11rb::NONE {
            self.target
        } else {
            self.property
        }
    }
}

/// The answer of a selection owner to one of our conversion requests.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SelectionNotify {
    pub time: Timestamp,
    pub requestor: Window,
    pub selection: Atom,
    pub target: Atom,
    /// The property holding the data, or `NONE` if the conversion was refused.
    pub property: Atom,
}

/// Display events the bridge cares about.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Event {
    /// A selection changed hands.
    ///
    /// `owner` is `NONE` when the selection was cleared, including when the previous owner's
    /// window was destroyed or its client disconnected.
    SelectionOwnerChanged { selection: Atom, owner: Window },
    SelectionNotify(SelectionNotify),
    PropertyNotify {
        window: Window,
        atom: Atom,
        state: PropertyState,
    },
    SelectionRequest(SelectionRequest),
    SelectionClear { selection: Atom },
    /// The root window was resized.
    RootConfigured { width: u16, height: u16 },
    MappingNotify,
    /// An asynchronous protocol error.
    Error(String),
    /// Anything else, identified by its response type.
    Other(u8),
}

/// A window property, as read back from the server.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Property {
    pub type_: Atom,
    pub format: u8,
    pub value: Vec<u8>,
}

impl Property {
    /// Interprets the value as a list of 32-bit items, e.g. atoms.
    ///
    /// Returns `None` if the property is not in the 32-bit format.
    pub fn value32(&self) -> Option<Vec<u32>> {
        if self.format != 32 {
            return None;
        }

        Some(
            self.value
                .chunks_exact(4)
                .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }
}

/// Operations on the display connection used by the bridge.
///
/// Requests are allowed to be buffered; [`Display::flush`] sends them. Replies and errors for
/// requests without a return value arrive as events.
pub trait Display {
    /// The window used as the requestor of conversions and the owner of grabbed selections.
    fn proxy_window(&self) -> Window;

    /// Largest number of bytes that may be stored with a single property change.
    fn max_request_bytes(&self) -> usize;

    /// Whether screen configurations can be queried and changed.
    fn has_randr(&self) -> bool;

    fn intern_atom(&mut self, name: &str) -> Result<Atom, Error>;

    /// Returns the name of the atom, for diagnostics.
    fn atom_name(&mut self, atom: Atom) -> String;

    fn set_selection_owner(&mut self, selection: Atom, owner: Window) -> Result<(), Error>;

    /// Asks the owner of `selection` to store it converted to `target` in `property` of the
    /// proxy window.
    fn convert_selection(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
    ) -> Result<(), Error>;

    /// Reads a property of any type, optionally deleting it.
    ///
    /// Returns `None` if the property does not exist.
    fn get_property(
        &mut self,
        window: Window,
        property: Atom,
        delete: bool,
    ) -> Result<Option<Property>, Error>;

    fn delete_property(&mut self, window: Window, property: Atom) -> Result<(), Error>;

    fn change_property8(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        data: &[u8],
    ) -> Result<(), Error>;

    fn change_property32(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        data: &[u32],
    ) -> Result<(), Error>;

    /// Starts delivering property change events for `window`.
    fn watch_property_changes(&mut self, window: Window) -> Result<(), Error>;

    /// Tells the requestor its request was handled, storing the reply in `property` (or refused,
    /// if `property` is `NONE`).
    fn send_selection_notify(
        &mut self,
        request: &SelectionRequest,
        property: Atom,
    ) -> Result<(), Error>;

    fn root_size(&mut self) -> Result<ScreenSize, Error>;

    /// Returns the screen sizes RandR offers, in RandR order.
    fn screen_sizes(&mut self) -> Result<Vec<ScreenSize>, Error>;

    /// Switches to the screen size with the given index, keeping the current rotation.
    fn set_screen_size(&mut self, index: usize) -> Result<(), Error>;

    /// Returns the next already received event, without blocking.
    fn poll_event(&mut self) -> Result<Option<Event>, Error>;

    fn flush(&mut self) -> Result<(), Error>;

    /// Waits until the server has processed every request sent so far.
    fn sync(&mut self) -> Result<(), Error>;
}
