//! Test display implementation.
//!
//! [`FakeDisplay`] is an in-memory stand-in for the X server, as far as the bridge can tell. It
//! stores window properties, hands out queued events, records every request with a visible
//! effect, and reports selection ownership changes the way XFIXES does. Desktop applications are
//! played by the tests themselves, through the helpers at the bottom of this module.

use std::collections::{HashMap, VecDeque};

use x11rb::protocol::xproto::{Atom, AtomEnum, Window};
use x11rb::NONE;

use crate::common::Error;
use crate::display::{
    Display, Event, Property, PropertyState, ScreenSize, SelectionNotify, SelectionRequest,
};
use crate::Bridge;

mod conversion;

/// The window the bridge works through.
pub const PROXY: Window = 1;

/// A display request with a visible effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    SetSelectionOwner {
        selection: Atom,
        owner: Window,
    },
    ConvertSelection {
        selection: Atom,
        target: Atom,
        property: Atom,
    },
    DeleteProperty {
        window: Window,
        property: Atom,
    },
    ChangeProperty {
        window: Window,
        property: Atom,
        type_: Atom,
        format: u8,
        data: Vec<u8>,
    },
    WatchProperties(Window),
    SelectionNotify {
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
    },
    SetScreenSize(usize),
    Sync,
}

pub struct FakeDisplay {
    atoms: HashMap<String, Atom>,
    names: HashMap<Atom, String>,
    next_atom: Atom,
    pub properties: HashMap<(Window, Atom), Property>,
    pub events: VecDeque<Event>,
    pub calls: Vec<Call>,
    pub max_request_bytes: usize,
    pub root_size: ScreenSize,
    /// Screen sizes offered by RandR, `None` if RandR is missing.
    pub screen_sizes: Option<Vec<ScreenSize>>,
    /// Whether selection owner changes are reported.
    pub report_owner_changes: bool,
}

impl Default for FakeDisplay {
    fn default() -> Self {
        Self {
            atoms: HashMap::new(),
            names: HashMap::new(),
            next_atom: 100,
            properties: HashMap::new(),
            events: VecDeque::new(),
            calls: Vec::new(),
            max_request_bytes: 16 * 1024 * 1024,
            root_size: ScreenSize {
                width: 1024,
                height: 768,
            },
            screen_sizes: None,
            report_owner_changes: true,
        }
    }
}

impl FakeDisplay {
    /// Returns the atom named `name`, interning it if needed.
    pub fn atom(&mut self, name: &str) -> Atom {
        if name == "ATOM" {
            return AtomEnum::ATOM.into();
        }

        if let Some(&atom) = self.atoms.get(name) {
            return atom;
        }

        let atom = self.next_atom;
        self.next_atom += 1;
        self.atoms.insert(name.to_owned(), atom);
        self.names.insert(atom, name.to_owned());
        atom
    }

    /// Returns the calls recorded so far, forgetting them.
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    /// Returns the selection notifications sent so far, as `(requestor, property)`.
    pub fn notifications(&self) -> Vec<(Window, Atom)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::SelectionNotify {
                    requestor,
                    property,
                    ..
                } => Some((*requestor, *property)),
                _ => None,
            })
            .collect()
    }

    /// Returns the data of every 8-bit property change on `window`, in order.
    pub fn stored_chunks(&self, window: Window, property: Atom) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::ChangeProperty {
                    window: w,
                    property: p,
                    format: 8,
                    data,
                    ..
                } if *w == window && *p == property => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn conversions(&self) -> Vec<(Atom, Atom)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::ConvertSelection {
                    selection, target, ..
                } => Some((*selection, *target)),
                _ => None,
            })
            .collect()
    }

    fn store(&mut self, window: Window, property: Atom, type_: Atom, format: u8, value: Vec<u8>) {
        self.calls.push(Call::ChangeProperty {
            window,
            property,
            type_,
            format,
            data: value.clone(),
        });
        self.properties.insert(
            (window, property),
            Property {
                type_,
                format,
                value,
            },
        );
    }
}

impl Display for FakeDisplay {
    fn proxy_window(&self) -> Window {
        PROXY
    }

    fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    fn has_randr(&self) -> bool {
        self.screen_sizes.is_some()
    }

    fn intern_atom(&mut self, name: &str) -> Result<Atom, Error> {
        Ok(self.atom(name))
    }

    fn atom_name(&mut self, atom: Atom) -> String {
        self.names
            .get(&atom)
            .cloned()
            .unwrap_or_else(|| format!("<atom {}>", atom))
    }

    fn set_selection_owner(&mut self, selection: Atom, owner: Window) -> Result<(), Error> {
        self.calls
            .push(Call::SetSelectionOwner { selection, owner });
        if self.report_owner_changes {
            self.events
                .push_back(Event::SelectionOwnerChanged { selection, owner });
        }
        Ok(())
    }

    fn convert_selection(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
    ) -> Result<(), Error> {
        self.calls.push(Call::ConvertSelection {
            selection,
            target,
            property,
        });
        Ok(())
    }

    fn get_property(
        &mut self,
        window: Window,
        property: Atom,
        delete: bool,
    ) -> Result<Option<Property>, Error> {
        if delete {
            Ok(self.properties.remove(&(window, property)))
        } else {
            Ok(self.properties.get(&(window, property)).cloned())
        }
    }

    fn delete_property(&mut self, window: Window, property: Atom) -> Result<(), Error> {
        self.calls.push(Call::DeleteProperty { window, property });
        self.properties.remove(&(window, property));
        Ok(())
    }

    fn change_property8(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        data: &[u8],
    ) -> Result<(), Error> {
        self.store(window, property, type_, 8, data.to_vec());
        Ok(())
    }

    fn change_property32(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        data: &[u32],
    ) -> Result<(), Error> {
        let value = data.iter().flat_map(|item| item.to_ne_bytes()).collect();
        self.store(window, property, type_, 32, value);
        Ok(())
    }

    fn watch_property_changes(&mut self, window: Window) -> Result<(), Error> {
        self.calls.push(Call::WatchProperties(window));
        Ok(())
    }

    fn send_selection_notify(
        &mut self,
        request: &SelectionRequest,
        property: Atom,
    ) -> Result<(), Error> {
        self.calls.push(Call::SelectionNotify {
            requestor: request.requestor,
            selection: request.selection,
            target: request.target,
            property,
        });
        Ok(())
    }

    fn root_size(&mut self) -> Result<ScreenSize, Error> {
        Ok(self.root_size)
    }

    fn screen_sizes(&mut self) -> Result<Vec<ScreenSize>, Error> {
        Ok(self.screen_sizes.clone().unwrap_or_default())
    }

    fn set_screen_size(&mut self, index: usize) -> Result<(), Error> {
        self.calls.push(Call::SetScreenSize(index));
        if let Some(size) = self.screen_sizes.as_ref().and_then(|sizes| sizes.get(index)) {
            self.root_size = *size;
            self.events.push_back(Event::RootConfigured {
                width: size.width,
                height: size.height,
            });
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<Event>, Error> {
        Ok(self.events.pop_front())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn sync(&mut self) -> Result<(), Error> {
        self.calls.push(Call::Sync);
        Ok(())
    }
}

/// Creates a bridge over a default [`FakeDisplay`], dropping the startup messages.
pub fn new_bridge() -> Bridge<FakeDisplay> {
    bridge_with(FakeDisplay::default())
}

pub fn bridge_with(display: FakeDisplay) -> Bridge<FakeDisplay> {
    let mut bridge = Bridge::new(display).unwrap();
    bridge.take_messages();
    bridge
}

pub fn atom(bridge: &mut Bridge<FakeDisplay>, name: &str) -> Atom {
    bridge.display_mut().atom(name)
}

/// Queues `event` and lets the bridge handle it.
pub fn deliver(bridge: &mut Bridge<FakeDisplay>, event: Event) {
    bridge.display_mut().events.push_back(event);
    bridge.dispatch().unwrap();
}

/// Makes `owner` the owner of `selection`, as reported by XFIXES.
pub fn announce_owner(bridge: &mut Bridge<FakeDisplay>, selection: &str, owner: Window) {
    let selection = atom(bridge, selection);
    deliver(bridge, Event::SelectionOwnerChanged { selection, owner });
}

/// Answers the bridge's `TARGETS` request for `selection`.
pub fn answer_targets(bridge: &mut Bridge<FakeDisplay>, selection: &str, targets: &[&str]) {
    let selection = atom(bridge, selection);
    let targets_atom = atom(bridge, "TARGETS");
    let value = targets
        .iter()
        .flat_map(|name| atom(bridge, name).to_ne_bytes())
        .collect();

    bridge.display_mut().properties.insert(
        (PROXY, targets_atom),
        Property {
            type_: AtomEnum::ATOM.into(),
            format: 32,
            value,
        },
    );
    deliver(
        bridge,
        Event::SelectionNotify(SelectionNotify {
            time: 0,
            requestor: PROXY,
            selection,
            target: targets_atom,
            property: targets_atom,
        }),
    );
}

/// Makes a desktop application own `selection`, offering `targets`.
pub fn desktop_grab(
    bridge: &mut Bridge<FakeDisplay>,
    selection: &str,
    owner: Window,
    targets: &[&str],
) {
    announce_owner(bridge, selection, owner);
    answer_targets(bridge, selection, targets);
}

/// Stores a property on the proxy window and reports the conversion of `selection` to `target`.
pub fn answer_conversion(
    bridge: &mut Bridge<FakeDisplay>,
    selection: &str,
    target: &str,
    type_: &str,
    format: u8,
    value: Vec<u8>,
) {
    let selection = atom(bridge, selection);
    let target = atom(bridge, target);
    let type_ = atom(bridge, type_);

    bridge.display_mut().properties.insert(
        (PROXY, selection),
        Property {
            type_,
            format,
            value,
        },
    );
    deliver(
        bridge,
        Event::SelectionNotify(SelectionNotify {
            time: 0,
            requestor: PROXY,
            selection,
            target,
            property: selection,
        }),
    );
}

/// Reports that the owner of `selection` refused a conversion.
pub fn refuse_conversion(bridge: &mut Bridge<FakeDisplay>, selection: &str, target: &str) {
    let selection = atom(bridge, selection);
    let target = atom(bridge, target);
    deliver(
        bridge,
        Event::SelectionNotify(SelectionNotify {
            time: 0,
            requestor: PROXY,
            selection,
            target,
            property: NONE,
        }),
    );
}

/// Stores the next chunk of an incremental transfer on the proxy window.
pub fn send_chunk(bridge: &mut Bridge<FakeDisplay>, selection: &str, type_: &str, chunk: &[u8]) {
    let selection = atom(bridge, selection);
    let type_ = atom(bridge, type_);

    bridge.display_mut().properties.insert(
        (PROXY, selection),
        Property {
            type_,
            format: 8,
            value: chunk.to_vec(),
        },
    );
    deliver(
        bridge,
        Event::PropertyNotify {
            window: PROXY,
            atom: selection,
            state: PropertyState::NewValue,
        },
    );
}

/// Sends a selection request from `requestor`.
pub fn request_selection(
    bridge: &mut Bridge<FakeDisplay>,
    requestor: Window,
    selection: &str,
    target: &str,
    property: &str,
) {
    let selection = atom(bridge, selection);
    let target = atom(bridge, target);
    let property = atom(bridge, property);
    deliver(
        bridge,
        Event::SelectionRequest(SelectionRequest {
            time: 0,
            requestor,
            selection,
            target,
            property,
        }),
    );
}

/// Deletes a property of `requestor`, as the requestor of an incremental transfer does.
pub fn take_property(bridge: &mut Bridge<FakeDisplay>, requestor: Window, property: &str) {
    let property = atom(bridge, property);
    bridge
        .display_mut()
        .properties
        .remove(&(requestor, property));
    deliver(
        bridge,
        Event::PropertyNotify {
            window: requestor,
            atom: property,
            state: PropertyState::Deleted,
        },
    );
}
