//! Serving selection requests of desktop applications while the agent owns a selection.

use log::{debug, log_enabled, trace, warn, Level};
use x11rb::protocol::xproto::{Atom, Window};
use x11rb::NONE;

use crate::agent::AgentMessage;
use crate::bridge::Bridge;
use crate::common::Error;
use crate::display::{Display, SelectionRequest};
use crate::ownership::Owner;
use crate::transfer::IncrWriter;
use crate::{ContentType, Selection};

/// A selection request waiting for its turn.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub(crate) struct PendingRequest {
    pub selection: Selection,
    pub event: SelectionRequest,
}

/// Whether the active request is done.
enum Progress {
    Answered,
    /// Waiting for the agent or for an incremental transfer.
    Waiting,
}

impl<D: Display> Bridge<D> {
    /// Queues a selection request, serving it right away if nothing else is in progress.
    pub(crate) fn queue_selection_request(&mut self, event: SelectionRequest) -> Result<(), Error> {
        let Some(selection) = self.atoms.selection(event.selection) else {
            warn!(
                "Selection request for unknown selection {}",
                self.display.atom_name(event.selection)
            );
            return self.display.send_selection_notify(&event, NONE);
        };

        self.selection_requests
            .push_back(PendingRequest { selection, event });
        if self.selection_requests.len() == 1 {
            self.serve_selection_requests()?;
        }

        Ok(())
    }

    /// Serves queued requests until one has to wait.
    pub(crate) fn serve_selection_requests(&mut self) -> Result<(), Error> {
        while let Some(&request) = self.selection_requests.front() {
            match self.serve(request)? {
                Progress::Answered => {
                    self.selection_requests.pop_front();
                }
                Progress::Waiting => break,
            }
        }

        Ok(())
    }

    fn serve(&mut self, request: PendingRequest) -> Result<Progress, Error> {
        let PendingRequest { selection, event } = request;

        if self.slots.owner(selection) != Owner::Agent {
            warn!(
                "{}: selection request for target {} while not owning the selection",
                selection,
                self.display.atom_name(event.target)
            );
            return self.refuse(&event);
        }

        if event.target == self.atoms.multiple {
            warn!("{}: MULTIPLE target not supported", selection);
            return self.refuse(&event);
        }

        if event.target == self.atoms.targets {
            self.send_targets(selection, &event)?;
            return Ok(Progress::Answered);
        }

        let Some(content_type) = self.registry.type_for(event.target) else {
            warn!(
                "{}: unexpected selection type {}",
                selection,
                self.display.atom_name(event.target)
            );
            return self.refuse(&event);
        };

        self.outbox.push(AgentMessage::ClipboardRequest {
            selection,
            content_type,
        });
        Ok(Progress::Waiting)
    }

    fn refuse(&mut self, event: &SelectionRequest) -> Result<Progress, Error> {
        self.display.send_selection_notify(event, NONE)?;
        Ok(Progress::Answered)
    }

    fn send_targets(
        &mut self,
        selection: Selection,
        event: &SelectionRequest,
    ) -> Result<(), Error> {
        let mut targets = vec![self.atoms.targets];
        targets.extend(
            self.registry
                .targets_for(&self.slots.content_types(selection)),
        );

        let property = event.reply_property();
        self.display
            .change_property32(event.requestor, property, self.atoms.atom, &targets)?;

        if log_enabled!(Level::Debug) {
            debug!("{}: sent {} targets", selection, targets.len());
            for &target in &targets {
                debug!("{}:     {}", selection, self.display.atom_name(target));
            }
        }

        self.display.send_selection_notify(event, property)
    }

    /// Hands the agent's data to the application whose request is active.
    ///
    /// Data which doesn't fit in one property is sent incrementally.
    pub fn supply_data(
        &mut self,
        selection: Selection,
        content_type: ContentType,
        data: Vec<u8>,
    ) -> Result<(), Error> {
        let has_data = content_type != ContentType::None || !data.is_empty();

        if self.incr_writer.is_some() {
            if has_data {
                warn!(
                    "{}: data received while still sending data of a previous request, ignoring",
                    selection
                );
            }
            return self.dispatch();
        }

        let Some(&PendingRequest {
            selection: expected_selection,
            event,
        }) = self.selection_requests.front()
        else {
            if has_data {
                warn!(
                    "{}: data received without an outstanding selection request, ignoring",
                    selection
                );
            }
            return self.dispatch();
        };

        let expected_type = self
            .registry
            .type_for(event.target)
            .unwrap_or(ContentType::None);
        if selection != expected_selection || content_type != expected_type {
            if selection != expected_selection {
                warn!(
                    "{}: expected data for selection {}",
                    selection, expected_selection
                );
            }
            if content_type != expected_type {
                warn!(
                    "{}: expected {:?} data, got {:?}",
                    selection, expected_type, content_type
                );
            }
            self.display.send_selection_notify(&event, NONE)?;
            self.selection_requests.pop_front();
            self.serve_selection_requests()?;
            return self.dispatch();
        }

        let property = event.reply_property();
        if data.len() > self.max_property_size {
            debug!(
                "{}: starting incremental send of {} bytes",
                selection,
                data.len()
            );
            let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
            self.display.watch_property_changes(event.requestor)?;
            self.display
                .change_property32(event.requestor, property, self.atoms.incr, &[len])?;
            self.display.send_selection_notify(&event, property)?;
            self.incr_writer = Some(IncrWriter::new(
                data,
                event.requestor,
                property,
                event.target,
            ));
        } else {
            self.display
                .change_property8(event.requestor, property, event.target, &data)?;
            self.display.send_selection_notify(&event, property)?;
            self.selection_requests.pop_front();
            self.serve_selection_requests()?;
        }

        self.dispatch()
    }

    /// Sends the next chunk of an incremental transfer, once the requestor took the previous one.
    pub(crate) fn handle_property_deleted(
        &mut self,
        window: Window,
        atom: Atom,
    ) -> Result<(), Error> {
        let max_len = self.max_property_size;
        let Some(writer) = self.incr_writer.as_mut() else {
            return Ok(());
        };
        if !writer.matches(window, atom) {
            return Ok(());
        }

        let (requestor, property, target) =
            (writer.requestor(), writer.property(), writer.target());
        let (start, total) = (writer.position(), writer.total_len());
        let chunk = writer.next_chunk(max_len);
        let done = chunk.is_empty();
        if done {
            debug!("Ending incremental send of {} bytes", total);
        } else {
            trace!(
                "Sending {}-{}/{} bytes",
                start,
                start + chunk.len() - 1,
                total
            );
        }
        self.display
            .change_property8(requestor, property, target, chunk)?;

        // The zero-length chunk ends the transfer.
        if done {
            self.incr_writer = None;
            self.selection_requests.pop_front();
            self.serve_selection_requests()?;
        }

        Ok(())
    }

    /// Refuses every queued request for `selection`.
    ///
    /// If the active request was among them, the next one is served.
    pub(crate) fn drop_selection_requests(&mut self, selection: Selection) -> Result<(), Error> {
        let active_dropped = self
            .selection_requests
            .front()
            .is_some_and(|request| request.selection == selection);

        let mut dropped = Vec::new();
        self.selection_requests.retain(|request| {
            if request.selection == selection {
                dropped.push(request.event);
                false
            } else {
                true
            }
        });
        if dropped.is_empty() {
            return Ok(());
        }

        debug!(
            "{}: ownership changed with {} selection requests pending, clearing",
            selection,
            dropped.len()
        );
        for event in &dropped {
            self.display.send_selection_notify(event, NONE)?;
        }

        if active_dropped {
            self.incr_writer = None;
            self.serve_selection_requests()?;
        }

        Ok(())
    }
}
