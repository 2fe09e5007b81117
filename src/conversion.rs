//! Fetching selection contents from desktop owners for the agent.

use log::{debug, trace, warn};
use x11rb::protocol::xproto::{Atom, Window};
use x11rb::NONE;

use crate::agent::AgentMessage;
use crate::bridge::Bridge;
use crate::common::Error;
use crate::display::{Display, Property, SelectionNotify};
use crate::formats;
use crate::ownership::Owner;
use crate::{ContentType, Selection};

/// A request of the agent for the contents of a desktop-owned selection.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub(crate) struct ConversionRequest {
    pub selection: Selection,
    pub target: Atom,
}

/// What became of a conversion reply.
enum Reply {
    /// An incremental transfer started, more data will follow.
    Pending,
    Data(Vec<u8>),
    Failed,
}

impl<D: Display> Bridge<D> {
    /// Asks the desktop owner of `selection` for its contents as `content_type`.
    ///
    /// The data is sent to the agent once it arrives. If the selection is not owned by a desktop
    /// application offering `content_type`, the agent is told right away that there is no data.
    pub fn request_data(
        &mut self,
        selection: Selection,
        content_type: ContentType,
    ) -> Result<(), Error> {
        if self.atoms.for_selection(selection).is_none() {
            warn!("{}: data request for an unsupported selection", selection);
            self.send_no_data(selection);
            return self.dispatch();
        }

        if self.slots.owner(selection) != Owner::Desktop {
            warn!(
                "{}: data request while the selection is not owned by the desktop",
                selection
            );
            self.send_no_data(selection);
            return self.dispatch();
        }

        let Some(target) = self.slots.target_for(selection, content_type) else {
            warn!(
                "{}: data request for unavailable type {:?}",
                selection, content_type
            );
            self.send_no_data(selection);
            return self.dispatch();
        };

        self.conversions
            .push_back(ConversionRequest { selection, target });
        if self.conversions.len() == 1 {
            self.start_conversion()?;
        }

        self.dispatch()
    }

    /// Sends the conversion request at the front of the queue to the owner.
    pub(crate) fn start_conversion(&mut self) -> Result<(), Error> {
        let Some(&request) = self.conversions.front() else {
            return Ok(());
        };
        let Some(selection_atom) = self.atoms.for_selection(request.selection) else {
            return Ok(());
        };

        // A reply to an older conversion of this selection can't be told apart any more.
        self.abandoned_conversions
            .retain(|abandoned| abandoned.selection != request.selection);

        trace!(
            "{}: converting to {}",
            request.selection,
            self.display.atom_name(request.target)
        );
        self.display
            .convert_selection(selection_atom, request.target, selection_atom)
    }

    /// Answers every queued conversion of `selection` with no data.
    ///
    /// If the active conversion was among them, the next one is started.
    pub(crate) fn drop_conversions(&mut self, selection: Selection) -> Result<(), Error> {
        let active = match self.conversions.front() {
            Some(front) if front.selection == selection => Some(*front),
            _ => None,
        };

        let before = self.conversions.len();
        self.conversions
            .retain(|request| request.selection != selection);
        let dropped = before - self.conversions.len();
        if dropped == 0 {
            return Ok(());
        }

        debug!(
            "{}: ownership changed with {} data requests pending, clearing",
            selection, dropped
        );
        for _ in 0..dropped {
            self.send_no_data(selection);
        }

        if let Some(active) = active {
            self.incr_reader.abort();
            self.abandoned_conversions.push(active);
            self.start_conversion()?;
        }

        Ok(())
    }

    /// Handles the reply of an owner to the active conversion.
    pub(crate) fn handle_conversion_notify(
        &mut self,
        notify: &SelectionNotify,
    ) -> Result<(), Error> {
        let selection = self.atoms.selection(notify.selection);

        if let Some(index) = self.abandoned_conversions.iter().position(|abandoned| {
            Some(abandoned.selection) == selection && abandoned.target == notify.target
        }) {
            let abandoned = self.abandoned_conversions.remove(index);
            if self.conversions.front().map(|request| request.selection) != selection {
                debug!(
                    "{}: discarding the reply to a dropped data request",
                    abandoned.selection
                );
                if notify.property != NONE && notify.requestor == self.display.proxy_window() {
                    self.display
                        .delete_property(notify.requestor, notify.property)?;
                }
                return Ok(());
            }
        }

        let Some(&request) = self.conversions.front() else {
            warn!("Selection notify received without a pending data request");
            return Ok(());
        };

        let mut valid = true;
        if selection != Some(request.selection) {
            warn!(
                "{}: requested data for this selection, got {}",
                request.selection,
                self.display.atom_name(notify.selection)
            );
            valid = false;
        }
        if notify.target != request.target && notify.target != self.atoms.incr {
            warn!(
                "{}: requested target {}, got {}",
                request.selection,
                self.display.atom_name(request.target),
                self.display.atom_name(notify.target)
            );
            valid = false;
        }

        let reply = if valid {
            self.read_conversion(request, notify)?
        } else {
            Reply::Failed
        };

        match reply {
            Reply::Pending => Ok(()),
            Reply::Data(data) => self.finish_conversion(Some(data)),
            Reply::Failed => self.finish_conversion(None),
        }
    }

    fn read_conversion(
        &mut self,
        request: ConversionRequest,
        notify: &SelectionNotify,
    ) -> Result<Reply, Error> {
        let selection = request.selection;
        let window = self.display.proxy_window();
        let property = notify.property;

        if property == NONE {
            debug!("{}: conversion refused by the owner", selection);
            return Ok(Reply::Failed);
        }
        if notify.requestor != window || self.atoms.for_selection(selection) != Some(property) {
            warn!("{}: selection notify parameters mismatch", selection);
            return Ok(Reply::Failed);
        }

        let Some(value) = self.display.get_property(window, property, false)? else {
            warn!("{}: selection notify without a property", selection);
            return Ok(Reply::Failed);
        };

        if value.type_ == self.atoms.incr {
            if self.incr_reader.is_active() {
                warn!(
                    "{}: incremental transfer started while still reading another one",
                    selection
                );
                self.display.delete_property(window, property)?;
                return Ok(Reply::Failed);
            }

            let size_hint = value
                .value32()
                .and_then(|values| values.first().copied())
                .unwrap_or(0);
            debug!(
                "{}: starting incremental transfer, at least {} bytes",
                selection, size_hint
            );
            self.incr_reader.begin(size_hint as usize);
            self.display.watch_property_changes(window)?;
            self.display.delete_property(window, property)?;
            return Ok(Reply::Pending);
        }

        self.display.delete_property(window, property)?;

        if !self.check_property(selection, request.target, &value) {
            return Ok(Reply::Failed);
        }
        if value.value.is_empty() {
            warn!("{}: property contains no data (zero length)", selection);
            return Ok(Reply::Failed);
        }

        Ok(Reply::Data(value.value))
    }

    /// Handles a new chunk of an incremental transfer.
    pub(crate) fn handle_incr_chunk(&mut self, window: Window, atom: Atom) -> Result<(), Error> {
        if !self.incr_reader.is_active() {
            return Ok(());
        }
        let Some(&request) = self.conversions.front() else {
            return Ok(());
        };
        if window != self.display.proxy_window()
            || self.atoms.for_selection(request.selection) != Some(atom)
        {
            return Ok(());
        }

        let selection = request.selection;
        let Some(chunk) = self.display.get_property(window, atom, true)? else {
            warn!("{}: incremental chunk without a property", selection);
            return self.finish_conversion(None);
        };

        if !self.check_property(selection, request.target, &chunk) {
            return self.finish_conversion(None);
        }

        if !chunk.value.is_empty() {
            self.incr_reader.push(&chunk.value);
            trace!(
                "{}: appended {} bytes, {} total",
                selection,
                chunk.value.len(),
                self.incr_reader.len()
            );
            return Ok(());
        }

        let data = self.incr_reader.finish();
        if data.is_empty() {
            warn!("{}: property contains no data (zero length)", selection);
            return self.finish_conversion(None);
        }

        debug!(
            "{}: incremental transfer of {} bytes done",
            selection,
            data.len()
        );
        self.finish_conversion(Some(data))
    }

    fn check_property(&mut self, selection: Selection, target: Atom, property: &Property) -> bool {
        if property.type_ != target {
            warn!(
                "{}: expected property type {}, got {}",
                selection,
                self.display.atom_name(target),
                self.display.atom_name(property.type_)
            );
            return false;
        }
        if property.format != 8 {
            warn!(
                "{}: expected 8 bit format, got {} bits",
                selection, property.format
            );
            return false;
        }
        true
    }

    /// Sends the outcome of the active conversion to the agent and starts the next one.
    fn finish_conversion(&mut self, data: Option<Vec<u8>>) -> Result<(), Error> {
        if data.is_none() {
            // Chunks still arriving for a failed conversion must not end up in the next one.
            self.incr_reader.abort();
        }

        let Some(request) = self.conversions.pop_front() else {
            return Ok(());
        };

        let content_type = formats::type_for_logged(
            &self.registry,
            &mut self.display,
            request.selection,
            request.target,
        );
        match data {
            Some(data) if content_type != ContentType::None => {
                self.outbox.push(AgentMessage::ClipboardData {
                    selection: request.selection,
                    content_type,
                    data,
                })
            }
            _ => self.send_no_data(request.selection),
        }

        self.start_conversion()
    }

    pub(crate) fn send_no_data(&mut self, selection: Selection) {
        self.outbox.push(AgentMessage::ClipboardData {
            selection,
            content_type: ContentType::None,
            data: Vec::new(),
        });
    }
}
