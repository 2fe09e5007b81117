//! Connecting to the X server.

use log::{debug, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xfixes::{self, ConnectionExt as _, SelectionEventMask};
use x11rb::protocol::xproto::{
    ChangeWindowAttributesAux, ConnectionExt as _, CreateWindowAux, EventMask, WindowClass,
};
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT};

use crate::x11::X11Display;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Couldn't connect to the X server")]
    Connect(#[source] ConnectError),

    #[error("X server communication error")]
    Connection(#[source] ConnectionError),

    #[error("X server request failed")]
    Reply(#[source] ReplyError),

    #[error("Couldn't allocate an X resource id")]
    ReplyOrId(#[source] ReplyOrIdError),

    #[error("The X server has no screen number {0}")]
    NoScreen(usize),

    #[error("A required X extension ({name} version {version}) is not supported by the server")]
    MissingExtension { name: &'static str, version: u32 },
}

impl From<ConnectionError> for Error {
    fn from(x: ConnectionError) -> Self {
        Error::Connection(x)
    }
}

impl From<ReplyError> for Error {
    fn from(x: ReplyError) -> Self {
        Error::Reply(x)
    }
}

impl From<ReplyOrIdError> for Error {
    fn from(x: ReplyOrIdError) -> Self {
        Error::ReplyOrId(x)
    }
}

/// Connects to the X server and sets up the proxy window.
///
/// If `display_name` is `None`, the `DISPLAY` environment variable is used.
///
/// Selection ownership is tracked through XFIXES, which is therefore required. RandR is optional;
/// without it monitor configuration requests are ignored.
pub fn initialize(display_name: Option<&str>) -> Result<X11Display, Error> {
    let (conn, screen_num) = x11rb::connect(display_name).map_err(Error::Connect)?;

    let root = conn
        .setup()
        .roots
        .get(screen_num)
        .map(|screen| screen.root)
        .ok_or(Error::NoScreen(screen_num))?;

    // Selection properties should not be stored on the root window.
    let window = conn.generate_id()?;
    conn.create_window(
        COPY_DEPTH_FROM_PARENT,
        window,
        root,
        0,
        0,
        1,
        1,
        0,
        WindowClass::COPY_FROM_PARENT,
        COPY_FROM_PARENT,
        &CreateWindowAux::new(),
    )?;
    debug!("Selection window: {}", window);

    if conn
        .extension_information(xfixes::X11_EXTENSION_NAME)?
        .is_none()
    {
        return Err(Error::MissingExtension {
            name: xfixes::X11_EXTENSION_NAME,
            version: 1,
        });
    }
    let version = conn.xfixes_query_version(1, 0)?.reply()?;
    if version.major_version < 1 {
        return Err(Error::MissingExtension {
            name: xfixes::X11_EXTENSION_NAME,
            version: 1,
        });
    }

    let has_randr = match conn.extension_information(randr::X11_EXTENSION_NAME)? {
        Some(_) => {
            conn.randr_query_version(1, 1)?.reply()?;
            true
        }
        None => {
            warn!("No RandR, monitor configuration is not supported");
            false
        }
    };

    let mut display = X11Display::new(conn, root, window, has_randr);

    let mask = SelectionEventMask::SET_SELECTION_OWNER
        | SelectionEventMask::SELECTION_WINDOW_DESTROY
        | SelectionEventMask::SELECTION_CLIENT_CLOSE;
    for name in ["CLIPBOARD", "PRIMARY"] {
        let selection = display.intern_atom_checked(name)?;
        display
            .connection()
            .xfixes_select_selection_input(root, selection, mask)?;
    }

    // Catch resolution changes.
    display.connection().change_window_attributes(
        root,
        &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
    )?;
    display.connection().flush()?;

    Ok(display)
}
