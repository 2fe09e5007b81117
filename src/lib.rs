//! A bridge between the X11 selections and a host-side agent.
//!
//! This crate is intended to be used by guest agents which need the clipboard of a remote client
//! and the clipboard of the local X11 desktop to behave as one. Copying in either environment
//! makes the data available for pasting in the other. Two selections are bridged: the regular
//! `CLIPBOARD` selection and the `PRIMARY` (mouse) selection.
//!
//! On the X11 side, the bridge owns a small proxy window. It watches selection ownership through
//! the XFIXES extension, asks new owners for their `TARGETS`, fetches data on request (including
//! `INCR` transfers of any size) and answers selection requests from local applications while it
//! owns a selection on the remote client's behalf.
//!
//! On the agent side, the bridge consumes [`agent::AgentRequest`]s and produces
//! [`agent::AgentMessage`]s. The transport which carries them is up to the caller; the [`agent`]
//! module provides a simple binary framing for them.
//!
//! Everything runs on a single thread. The caller waits for the X11 connection to become readable
//! and then calls [`Bridge::dispatch`]; every public entry point drains the event queue before
//! returning, so no event buffered by the connection is ever missed.
//!
//! # Examples
//!
//! ```no_run
//! # extern crate x11_selection_bridge;
//! # use x11_selection_bridge::common::Error;
//! # fn foo() -> Result<(), Error> {
//! use x11_selection_bridge::{common::initialize, Bridge, ContentType, Selection};
//!
//! let display = initialize(None)?;
//! let mut bridge = Bridge::new(display)?;
//!
//! // The remote client copied some text.
//! bridge.grab(Selection::Clipboard, vec![ContentType::Utf8Text])?;
//!
//! for message in bridge.take_messages() {
//!     // Hand the message over to the agent transport.
//!     println!("{:?}", message);
//! }
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/x11-selection-bridge/0.1.0")]
#![deny(unsafe_code)]

use std::fmt;

mod conversion;
mod ownership;
mod selection_request;

#[cfg(test)]
mod tests;

pub mod agent;
pub mod bridge;
pub mod common;
pub mod display;
pub mod formats;
pub mod resolution;
pub mod transfer;
pub mod x11;

pub use bridge::Bridge;
pub use ownership::Owner;

/// The selection to operate on.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, PartialOrd, Ord)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum Selection {
    /// The regular clipboard (`CLIPBOARD`).
    Clipboard,
    /// The "primary" selection (`PRIMARY`), set by selecting text with the mouse.
    Primary,
    /// The `SECONDARY` selection.
    ///
    /// It is part of the agent protocol, but not bridged: requests for it are always answered
    /// negatively.
    Secondary,
}

impl Selection {
    /// All selections, in slot order.
    pub const ALL: [Selection; 3] = [
        Selection::Clipboard,
        Selection::Primary,
        Selection::Secondary,
    ];

    /// Returns the slot index of this selection.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the value used for this selection in agent messages.
    #[inline]
    pub fn to_wire(self) -> u32 {
        self as u32
    }

    /// Parses a selection from its agent message value.
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(Selection::Clipboard),
            1 => Some(Selection::Primary),
            2 => Some(Selection::Secondary),
            _ => None,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Selection::Clipboard => "clipboard",
            Selection::Primary => "primary",
            Selection::Secondary => "secondary",
        })
    }
}

/// Kind of clipboard content, as known to the agent.
///
/// Each content type corresponds to one or more X11 targets, see [`formats`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ContentType {
    /// No content.
    ///
    /// Sent in place of a real content type when a request could not be satisfied.
    #[default]
    None,
    /// UTF-8 encoded text.
    Utf8Text,
    /// A PNG image.
    ImagePng,
    /// A BMP image.
    ImageBmp,
    /// A TIFF image.
    ImageTiff,
    /// A JPEG image.
    ImageJpg,
}

impl ContentType {
    /// Returns the value used for this content type in agent messages.
    #[inline]
    pub fn to_wire(self) -> u32 {
        self as u32
    }

    /// Parses a content type from its agent message value.
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(ContentType::None),
            1 => Some(ContentType::Utf8Text),
            2 => Some(ContentType::ImagePng),
            3 => Some(ContentType::ImageBmp),
            4 => Some(ContentType::ImageTiff),
            5 => Some(ContentType::ImageJpg),
            _ => None,
        }
    }
}
