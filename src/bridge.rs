//! The bridge state machine.

use std::collections::VecDeque;

use log::{debug, log_enabled, trace, warn, Level};
use x11rb::protocol::xproto::{Atom, AtomEnum, Window};
use x11rb::NONE;

use crate::agent::{AgentMessage, AgentRequest};
use crate::common::Error;
use crate::conversion::ConversionRequest;
use crate::display::{Display, Event, PropertyState, ScreenSize, SelectionNotify};
use crate::formats::Registry;
use crate::ownership::{Offer, Owner, Slots, TargetsReply};
use crate::resolution::{self, MonitorsConfig};
use crate::selection_request::PendingRequest;
use crate::transfer::{self, IncrReader, IncrWriter};
use crate::{ContentType, Selection};

/// Atoms the bridge uses all the time.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) struct Atoms {
    pub clipboard: Atom,
    pub primary: Atom,
    pub targets: Atom,
    pub incr: Atom,
    pub multiple: Atom,
    pub atom: Atom,
}

impl Atoms {
    fn intern<D: Display>(display: &mut D) -> Result<Self, Error> {
        Ok(Self {
            clipboard: display.intern_atom("CLIPBOARD")?,
            primary: display.intern_atom("PRIMARY")?,
            targets: display.intern_atom("TARGETS")?,
            incr: display.intern_atom("INCR")?,
            multiple: display.intern_atom("MULTIPLE")?,
            atom: AtomEnum::ATOM.into(),
        })
    }

    /// Returns the selection slot bridged through `atom`.
    pub fn selection(&self, atom: Atom) -> Option<Selection> {
        if atom == self.clipboard {
            Some(Selection::Clipboard)
        } else if atom == self.primary {
            Some(Selection::Primary)
        } else {
            None
        }
    }

    /// Returns the atom of `selection`, or `None` if the selection is not bridged.
    pub fn for_selection(&self, selection: Selection) -> Option<Atom> {
        match selection {
            Selection::Clipboard => Some(self.clipboard),
            Selection::Primary => Some(self.primary),
            Selection::Secondary => None,
        }
    }
}

/// Keeps the X11 selections and the agent in sync.
///
/// The bridge is driven from the outside: call [`Bridge::dispatch`] whenever the display
/// connection is readable, and hand agent requests to [`Bridge::handle_agent_request`] (or the
/// individual entry points). Messages for the agent pile up until collected with
/// [`Bridge::take_messages`].
///
/// Requests in either direction are served one at a time, in the order they arrived. There are no
/// timeouts: a desktop application or agent which never answers holds up all later requests in
/// its direction, until ownership of the selection involved changes.
///
/// Only failures of the display connection are returned as errors. Misbehaving peers are logged
/// and answered negatively.
pub struct Bridge<D: Display> {
    pub(crate) display: D,
    pub(crate) atoms: Atoms,
    pub(crate) registry: Registry,
    pub(crate) slots: Slots,
    /// Requests for desktop data from the agent. The front one is active.
    pub(crate) conversions: VecDeque<ConversionRequest>,
    /// Conversions dropped while waiting for the owner's reply.
    pub(crate) abandoned_conversions: Vec<ConversionRequest>,
    pub(crate) incr_reader: IncrReader,
    /// Requests for agent data from desktop applications. The front one is active.
    pub(crate) selection_requests: VecDeque<PendingRequest>,
    pub(crate) incr_writer: Option<IncrWriter>,
    pub(crate) max_property_size: usize,
    size: ScreenSize,
    pub(crate) outbox: Vec<AgentMessage>,
}

impl<D: Display> Bridge<D> {
    /// Creates a bridge over `display`.
    ///
    /// The current resolution is queued for the agent right away.
    pub fn new(mut display: D) -> Result<Self, Error> {
        let atoms = Atoms::intern(&mut display)?;
        let registry = Registry::resolve(&mut display)?;
        let max_property_size = transfer::max_property_size(display.max_request_bytes());
        let size = display.root_size()?;
        debug!(
            "Max property size: {}, screen size: {}x{}",
            max_property_size, size.width, size.height
        );

        let mut bridge = Self {
            display,
            atoms,
            registry,
            slots: Slots::default(),
            conversions: VecDeque::new(),
            abandoned_conversions: Vec::new(),
            incr_reader: IncrReader::new(),
            selection_requests: VecDeque::new(),
            incr_writer: None,
            max_property_size,
            size,
            outbox: Vec::new(),
        };

        bridge.report_resolution();
        bridge.dispatch()?;
        Ok(bridge)
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub(crate) fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Returns the current owner of `selection`.
    pub fn owner(&self, selection: Selection) -> Owner {
        self.slots.owner(selection)
    }

    /// Returns the content types currently available from `selection`.
    ///
    /// Empty if and only if the selection is owned by nobody.
    pub fn offered_types(&self, selection: Selection) -> Vec<ContentType> {
        self.slots.content_types(selection)
    }

    /// Returns the last reported screen size.
    pub fn resolution(&self) -> ScreenSize {
        self.size
    }

    /// Removes and returns the messages queued for the agent, oldest first.
    pub fn take_messages(&mut self) -> Vec<AgentMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Handles every event already received from the display.
    pub fn dispatch(&mut self) -> Result<(), Error> {
        loop {
            self.display.flush()?;
            match self.display.poll_event()? {
                Some(event) => self.handle_event(event)?,
                None => return Ok(()),
            }
        }
    }

    /// Routes a request from the agent to the matching entry point.
    pub fn handle_agent_request(&mut self, request: AgentRequest) -> Result<(), Error> {
        match request {
            AgentRequest::MonitorsConfig(config) => self.apply_monitor_config(&config),
            AgentRequest::ClipboardGrab { selection, types } => self.grab(selection, types),
            AgentRequest::ClipboardRequest {
                selection,
                content_type,
            } => self.request_data(selection, content_type),
            AgentRequest::ClipboardData {
                selection,
                content_type,
                data,
            } => self.supply_data(selection, content_type, data),
            AgentRequest::ClipboardRelease { selection } => self.release(selection),
        }
    }

    /// Takes ownership of `selection` on behalf of the remote client, which offers `types`.
    pub fn grab(&mut self, selection: Selection, types: Vec<ContentType>) -> Result<(), Error> {
        let Some(selection_atom) = self.atoms.for_selection(selection) else {
            warn!("{}: grab of an unsupported selection, ignoring", selection);
            return Ok(());
        };

        let mut offers: Vec<Offer> = Vec::with_capacity(types.len());
        for content_type in types {
            if content_type != ContentType::None
                && !offers.iter().any(|offer| offer.content_type == content_type)
            {
                offers.push(Offer::from_agent(content_type));
            }
        }
        if offers.is_empty() {
            warn!("{}: grab without any content types, ignoring", selection);
            return Ok(());
        }

        let window = self.display.proxy_window();
        self.display.set_selection_owner(selection_atom, window)?;
        self.set_owner(selection, Owner::Agent, offers)?;

        self.dispatch()
    }

    /// Gives up ownership of `selection` taken with [`Bridge::grab`].
    ///
    /// Does nothing if the bridge does not own the selection.
    pub fn release(&mut self, selection: Selection) -> Result<(), Error> {
        let Some(selection_atom) = self.atoms.for_selection(selection) else {
            warn!("{}: release of an unsupported selection, ignoring", selection);
            return Ok(());
        };

        if self.slots.owner(selection) != Owner::Agent {
            warn!("{}: release while not owning the selection", selection);
            return Ok(());
        }

        self.display.set_selection_owner(selection_atom, NONE)?;
        // Handle the owner change caused by this before returning. Otherwise a pending
        // notification could reset the slot after somebody else took the selection in the
        // meantime.
        self.display.sync()?;
        self.dispatch()?;

        if self.slots.owner(selection) == Owner::Agent {
            debug!("{}: no owner change seen after release", selection);
            self.set_owner(selection, Owner::None, Vec::new())?;
        }

        self.dispatch()
    }

    /// Resizes the screen to best match the first monitor in `config`.
    pub fn apply_monitor_config(&mut self, config: &MonitorsConfig) -> Result<(), Error> {
        if !self.display.has_randr() {
            debug!("No RandR, ignoring monitor configuration");
            return Ok(());
        }

        let Some(monitor) = config.monitors.first() else {
            warn!("Monitor configuration without monitors, ignoring");
            return Ok(());
        };
        if config.monitors.len() != 1 {
            warn!("Only 1 monitor supported, ignoring additional monitors");
        }

        let sizes = self.display.screen_sizes()?;
        if sizes.is_empty() {
            warn!("RandR offers no screen sizes");
            return Ok(());
        }

        let Some(best) = resolution::best_fit(&sizes, monitor.width, monitor.height) else {
            warn!(
                "No suitable resolution found for a {}x{} monitor",
                monitor.width, monitor.height
            );
            return Ok(());
        };

        self.display.set_screen_size(best)?;
        self.size = sizes[best];
        self.report_resolution();

        self.dispatch()
    }

    /// Resets both bridged selections, answering everything still queued.
    pub fn shutdown(&mut self) -> Result<(), Error> {
        for selection in [Selection::Clipboard, Selection::Primary] {
            if self.slots.owner(selection) == Owner::Agent {
                if let Some(selection_atom) = self.atoms.for_selection(selection) {
                    self.display.set_selection_owner(selection_atom, NONE)?;
                }
            }
            self.set_owner(selection, Owner::None, Vec::new())?;
        }

        self.dispatch()
    }

    /// Moves `selection` to `owner`.
    ///
    /// Queued requests for the selection are answered negatively. The agent is told when a
    /// desktop owner is lost.
    pub(crate) fn set_owner(
        &mut self,
        selection: Selection,
        owner: Owner,
        offers: Vec<Offer>,
    ) -> Result<(), Error> {
        self.drop_selection_requests(selection)?;
        self.drop_conversions(selection)?;

        let previous = self.slots.set_owner(selection, owner, offers);
        if owner == Owner::None && previous == Owner::Desktop {
            self.outbox
                .push(AgentMessage::ClipboardRelease { selection });
        }

        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Result<(), Error> {
        match event {
            Event::SelectionOwnerChanged { selection, owner } => {
                self.handle_owner_change(selection, owner)
            }
            Event::SelectionNotify(notify) if notify.target == self.atoms.targets => {
                self.handle_targets_notify(&notify)
            }
            Event::SelectionNotify(notify) => self.handle_conversion_notify(&notify),
            Event::PropertyNotify {
                window,
                atom,
                state: PropertyState::NewValue,
            } => self.handle_incr_chunk(window, atom),
            Event::PropertyNotify {
                window,
                atom,
                state: PropertyState::Deleted,
            } => self.handle_property_deleted(window, atom),
            Event::SelectionRequest(request) => self.queue_selection_request(request),
            // Ownership is tracked through XFIXES.
            Event::SelectionClear { .. } => Ok(()),
            Event::RootConfigured { width, height } => {
                self.handle_root_configured(ScreenSize { width, height });
                Ok(())
            }
            Event::MappingNotify => Ok(()),
            Event::Error(error) => {
                warn!("X11 error: {}", error);
                Ok(())
            }
            Event::Other(kind) => {
                trace!("Unhandled event, type {}", kind);
                Ok(())
            }
        }
    }

    fn handle_owner_change(&mut self, selection_atom: Atom, owner: Window) -> Result<(), Error> {
        let Some(selection) = self.atoms.selection(selection_atom) else {
            return Ok(());
        };
        debug!("{}: new selection owner {}", selection, owner);

        if owner == self.display.proxy_window() {
            return Ok(());
        }

        self.set_owner(selection, Owner::None, Vec::new())?;
        if owner == NONE {
            return Ok(());
        }

        // Ask the new owner what it has to offer.
        let targets = self.atoms.targets;
        self.display
            .convert_selection(selection_atom, targets, targets)?;
        self.slots.expect_targets(selection);
        Ok(())
    }

    fn handle_targets_notify(&mut self, notify: &SelectionNotify) -> Result<(), Error> {
        let Some(selection) = self.atoms.selection(notify.selection) else {
            warn!("TARGETS reply for an unknown selection");
            return self.discard_targets_reply(notify);
        };

        match self.slots.targets_reply(selection) {
            TargetsReply::Unexpected => {
                warn!("{}: unexpected TARGETS reply", selection);
                return self.discard_targets_reply(notify);
            }
            TargetsReply::Stale => {
                debug!("{}: discarding TARGETS reply of a previous owner", selection);
                return self.discard_targets_reply(notify);
            }
            TargetsReply::Current => {}
        }

        if self.slots.owner(selection) == Owner::Agent {
            debug!("{}: discarding TARGETS reply, the agent owns the selection", selection);
            return self.discard_targets_reply(notify);
        }

        let Some(offered) = self.read_targets(selection, notify)? else {
            return Ok(());
        };

        if log_enabled!(Level::Debug) {
            debug!("{}: received {} targets", selection, offered.len());
            for &target in &offered {
                debug!("{}:     {}", selection, self.display.atom_name(target));
            }
        }

        let negotiated = self.registry.negotiate(&offered);
        if negotiated.is_empty() {
            debug!("{}: no supported targets", selection);
            return Ok(());
        }

        let types = negotiated
            .iter()
            .map(|&(content_type, _)| content_type)
            .collect();
        self.outbox
            .push(AgentMessage::ClipboardGrab { selection, types });

        let offers = negotiated
            .into_iter()
            .map(|(content_type, target)| Offer::from_desktop(content_type, target))
            .collect();
        self.set_owner(selection, Owner::Desktop, offers)
    }

    /// Deletes the property of a `TARGETS` reply which won't be read.
    ///
    /// All discovery requests share the property, so it is kept while another reply is expected.
    fn discard_targets_reply(&mut self, notify: &SelectionNotify) -> Result<(), Error> {
        let window = self.display.proxy_window();
        if notify.property == NONE || notify.requestor != window || self.slots.targets_pending() {
            return Ok(());
        }

        self.display.delete_property(window, notify.property)
    }

    fn read_targets(
        &mut self,
        selection: Selection,
        notify: &SelectionNotify,
    ) -> Result<Option<Vec<Atom>>, Error> {
        let window = self.display.proxy_window();
        let targets = self.atoms.targets;

        if notify.property == NONE {
            debug!("{}: TARGETS request refused by the owner", selection);
            return Ok(None);
        }
        if notify.requestor != window || notify.property != targets {
            warn!("{}: TARGETS reply parameters mismatch", selection);
            return Ok(None);
        }

        let Some(property) = self.display.get_property(window, targets, true)? else {
            warn!("{}: TARGETS reply without a property", selection);
            return Ok(None);
        };

        if property.type_ != self.atoms.atom {
            warn!(
                "{}: expected property type ATOM, got {}",
                selection,
                self.display.atom_name(property.type_)
            );
            return Ok(None);
        }

        match property.value32() {
            Some(atoms) if !atoms.is_empty() => Ok(Some(atoms)),
            Some(_) => {
                warn!("{}: TARGETS property contains no data", selection);
                Ok(None)
            }
            None => {
                warn!(
                    "{}: expected 32 bit format, got {} bits",
                    selection, property.format
                );
                Ok(None)
            }
        }
    }

    fn handle_root_configured(&mut self, size: ScreenSize) {
        if size == self.size {
            return;
        }

        self.size = size;
        self.report_resolution();
    }

    fn report_resolution(&mut self) {
        self.outbox.push(AgentMessage::GuestResolution {
            width: u32::from(self.size.width),
            height: u32::from(self.size.height),
        });
    }
}
