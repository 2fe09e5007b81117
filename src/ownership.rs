//! Per-selection ownership state.

use x11rb::protocol::xproto::Atom;

use crate::{ContentType, Selection};

/// Who currently owns a selection, from the bridge's point of view.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default)]
pub enum Owner {
    /// Nobody, or an owner whose targets we could not make sense of.
    #[default]
    None,
    /// An application on the local desktop. The agent may fetch the data.
    Desktop,
    /// The bridge itself, on behalf of the remote client. Local applications may fetch the data.
    Agent,
}

/// A content type available from a selection.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub(crate) struct Offer {
    pub content_type: ContentType,
    /// The target the desktop owner offers the content type as.
    ///
    /// `None` for offers made by the agent, which are advertised under every target of the
    /// content type.
    pub target: Option<Atom>,
}

impl Offer {
    pub fn from_agent(content_type: ContentType) -> Self {
        Self {
            content_type,
            target: None,
        }
    }

    pub fn from_desktop(content_type: ContentType, target: Atom) -> Self {
        Self {
            content_type,
            target: Some(target),
        }
    }
}

/// How a `TARGETS` reply relates to the discoveries we issued.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum TargetsReply {
    /// No discovery was outstanding.
    Unexpected,
    /// A newer discovery is outstanding; this reply describes a previous owner.
    Stale,
    /// The reply to the latest discovery.
    Current,
}

#[derive(Clone, Debug, Default)]
struct Slot {
    owner: Owner,
    offers: Vec<Offer>,
    expected_targets: u32,
}

/// Ownership state of every selection slot.
///
/// Offers are non-empty only while the owner is not [`Owner::None`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Slots {
    slots: [Slot; 3],
}

impl Slots {
    pub fn owner(&self, selection: Selection) -> Owner {
        self.slots[selection.index()].owner
    }

    pub fn offers(&self, selection: Selection) -> &[Offer] {
        &self.slots[selection.index()].offers
    }

    pub fn content_types(&self, selection: Selection) -> Vec<ContentType> {
        self.offers(selection)
            .iter()
            .map(|offer| offer.content_type)
            .collect()
    }

    /// Returns the desktop owner's target for `content_type`, if it offers one.
    pub fn target_for(&self, selection: Selection, content_type: ContentType) -> Option<Atom> {
        self.offers(selection)
            .iter()
            .find(|offer| offer.content_type == content_type)
            .and_then(|offer| offer.target)
    }

    /// Records that a `TARGETS` discovery was sent to the owner of `selection`.
    pub fn expect_targets(&mut self, selection: Selection) {
        self.slots[selection.index()].expected_targets += 1;
    }

    /// Accounts for an arriving `TARGETS` reply.
    /// Whether a `TARGETS` reply is still on its way for any selection.
    pub fn targets_pending(&self) -> bool {
        self.slots.iter().any(|slot| slot.expected_targets > 0)
    }

    pub fn targets_reply(&mut self, selection: Selection) -> TargetsReply {
        let slot = &mut self.slots[selection.index()];
        if slot.expected_targets == 0 {
            return TargetsReply::Unexpected;
        }

        slot.expected_targets -= 1;
        if slot.expected_targets > 0 {
            TargetsReply::Stale
        } else {
            TargetsReply::Current
        }
    }

    /// Changes the owner of `selection`.
    ///
    /// Offers are replaced by `offers`, and dropped altogether when the new owner is
    /// [`Owner::None`]. Returns the previous owner.
    pub fn set_owner(&mut self, selection: Selection, owner: Owner, offers: Vec<Offer>) -> Owner {
        let slot = &mut self.slots[selection.index()];
        let previous = slot.owner;

        slot.owner = owner;
        if owner == Owner::None {
            slot.offers.clear();
        } else {
            slot.offers = offers;
        }

        previous
    }
}
