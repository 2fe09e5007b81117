//! [`Display`] implementation over an X11 connection.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::os::fd::{AsFd, BorrowedFd};

use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::xfixes::SelectionEvent;
use x11rb::protocol::xproto::{
    self, Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, EventMask, PropMode,
    SelectionNotifyEvent, Time, Window, SELECTION_NOTIFY_EVENT,
};
use x11rb::protocol::Event as XEvent;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::NONE;

use crate::common::Error;
use crate::display::{
    Display, Event, Property, PropertyState, ScreenSize, SelectionNotify, SelectionRequest,
};

/// A connection to the X server, with the proxy window the bridge works through.
///
/// Created by [`crate::common::initialize`].
pub struct X11Display {
    conn: RustConnection,
    root: Window,
    window: Window,
    has_randr: bool,
    atom_names: HashMap<Atom, String>,
}

impl X11Display {
    pub(crate) fn new(conn: RustConnection, root: Window, window: Window, has_randr: bool) -> Self {
        Self {
            conn,
            root,
            window,
            has_randr,
            atom_names: HashMap::new(),
        }
    }

    pub(crate) fn connection(&self) -> &RustConnection {
        &self.conn
    }

    pub(crate) fn intern_atom_checked(&mut self, name: &str) -> Result<Atom, Error> {
        let atom = self.conn.intern_atom(false, name.as_bytes())?.reply()?.atom;
        self.atom_names.insert(atom, name.to_owned());
        Ok(atom)
    }

    fn translate(&self, event: XEvent) -> Event {
        match event {
            XEvent::XfixesSelectionNotify(ev) => {
                let owner = if ev.subtype == SelectionEvent::SET_SELECTION_OWNER {
                    ev.owner
                } else {
                    // Window destruction and client disconnection leave the selection unowned.
                    NONE
                };
                Event::SelectionOwnerChanged {
                    selection: ev.selection,
                    owner,
                }
            }
            XEvent::SelectionNotify(ev) => Event::SelectionNotify(SelectionNotify {
                time: ev.time,
                requestor: ev.requestor,
                selection: ev.selection,
                target: ev.target,
                property: ev.property,
            }),
            XEvent::PropertyNotify(ev) => Event::PropertyNotify {
                window: ev.window,
                atom: ev.atom,
                state: if ev.state == xproto::Property::NEW_VALUE {
                    PropertyState::NewValue
                } else {
                    PropertyState::Deleted
                },
            },
            XEvent::SelectionRequest(ev) => Event::SelectionRequest(SelectionRequest {
                time: ev.time,
                requestor: ev.requestor,
                selection: ev.selection,
                target: ev.target,
                property: ev.property,
            }),
            XEvent::SelectionClear(ev) => Event::SelectionClear {
                selection: ev.selection,
            },
            XEvent::ConfigureNotify(ev) if ev.window == self.root => Event::RootConfigured {
                width: ev.width,
                height: ev.height,
            },
            XEvent::MappingNotify(_) => Event::MappingNotify,
            XEvent::Error(err) => Event::Error(format!("{:?}", err)),
            other => Event::Other(other.raw_response_type() & 0x7f),
        }
    }
}

impl AsFd for X11Display {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.conn.stream().as_fd()
    }
}

impl Display for X11Display {
    fn proxy_window(&self) -> Window {
        self.window
    }

    fn max_request_bytes(&self) -> usize {
        self.conn.maximum_request_bytes()
    }

    fn has_randr(&self) -> bool {
        self.has_randr
    }

    fn intern_atom(&mut self, name: &str) -> Result<Atom, Error> {
        self.intern_atom_checked(name)
    }

    fn atom_name(&mut self, atom: Atom) -> String {
        if atom == NONE {
            return "None".to_owned();
        }

        match self.atom_names.entry(atom) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let name = self
                    .conn
                    .get_atom_name(atom)
                    .ok()
                    .and_then(|cookie| cookie.reply().ok())
                    .map(|reply| String::from_utf8_lossy(&reply.name).into_owned())
                    .unwrap_or_else(|| format!("<atom {}>", atom));
                entry.insert(name).clone()
            }
        }
    }

    fn set_selection_owner(&mut self, selection: Atom, owner: Window) -> Result<(), Error> {
        self.conn
            .set_selection_owner(owner, selection, Time::CURRENT_TIME)?;
        Ok(())
    }

    fn convert_selection(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
    ) -> Result<(), Error> {
        self.conn
            .convert_selection(self.window, selection, target, property, Time::CURRENT_TIME)?;
        Ok(())
    }

    fn get_property(
        &mut self,
        window: Window,
        property: Atom,
        delete: bool,
    ) -> Result<Option<Property>, Error> {
        let reply = self
            .conn
            .get_property(delete, window, property, AtomEnum::ANY, 0, u32::MAX / 4)?
            .reply()?;

        if reply.type_ == NONE {
            return Ok(None);
        }

        Ok(Some(Property {
            type_: reply.type_,
            format: reply.format,
            value: reply.value,
        }))
    }

    fn delete_property(&mut self, window: Window, property: Atom) -> Result<(), Error> {
        self.conn.delete_property(window, property)?;
        Ok(())
    }

    fn change_property8(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        data: &[u8],
    ) -> Result<(), Error> {
        self.conn
            .change_property8(PropMode::REPLACE, window, property, type_, data)?;
        Ok(())
    }

    fn change_property32(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        data: &[u32],
    ) -> Result<(), Error> {
        self.conn
            .change_property32(PropMode::REPLACE, window, property, type_, data)?;
        Ok(())
    }

    fn watch_property_changes(&mut self, window: Window) -> Result<(), Error> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;
        Ok(())
    }

    fn send_selection_notify(
        &mut self,
        request: &SelectionRequest,
        property: Atom,
    ) -> Result<(), Error> {
        let event = SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time: request.time,
            requestor: request.requestor,
            selection: request.selection,
            target: request.target,
            property,
        };
        self.conn
            .send_event(false, request.requestor, EventMask::NO_EVENT, event)?;
        Ok(())
    }

    fn root_size(&mut self) -> Result<ScreenSize, Error> {
        let geometry = self.conn.get_geometry(self.root)?.reply()?;
        Ok(ScreenSize {
            width: geometry.width,
            height: geometry.height,
        })
    }

    fn screen_sizes(&mut self) -> Result<Vec<ScreenSize>, Error> {
        let info = self.conn.randr_get_screen_info(self.root)?.reply()?;
        Ok(info
            .sizes
            .iter()
            .map(|size| ScreenSize {
                width: size.width,
                height: size.height,
            })
            .collect())
    }

    fn set_screen_size(&mut self, index: usize) -> Result<(), Error> {
        let info = self.conn.randr_get_screen_info(self.root)?.reply()?;
        // RandR limits the number of sizes to a u16.
        let size_id = u16::try_from(index).unwrap_or(u16::MAX);
        self.conn
            .randr_set_screen_config(
                self.root,
                Time::CURRENT_TIME.into(),
                info.config_timestamp,
                size_id,
                info.rotation,
                0,
            )?
            .reply()?;
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<Event>, Error> {
        let event = self.conn.poll_for_event()?;
        Ok(event.map(|event| self.translate(event)))
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.conn.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), Error> {
        self.conn.sync()?;
        Ok(())
    }
}
