//! Mapping between agent content types and X11 targets.

use log::warn;
use x11rb::protocol::xproto::Atom;

use crate::common::Error;
use crate::display::Display;
use crate::ContentType;

/// Target names considered equivalent for each content type.
///
/// Earlier entries win when several content types are offered, and earlier names win when an
/// owner offers several targets for the same content type.
pub const TEMPLATES: &[(ContentType, &[&str])] = &[
    (
        ContentType::Utf8Text,
        &[
            "UTF8_STRING",
            "text/plain;charset=UTF-8",
            "text/plain;charset=utf-8",
        ],
    ),
    (ContentType::ImagePng, &["image/png"]),
    (
        ContentType::ImageBmp,
        &[
            "image/bmp",
            "image/x-bmp",
            "image/x-MS-bmp",
            "image/x-win-bitmap",
        ],
    ),
    (ContentType::ImageTiff, &["image/tiff"]),
    (ContentType::ImageJpg, &["image/jpeg"]),
];

/// One content type with the targets it resolved to.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Format {
    pub content_type: ContentType,
    pub targets: Vec<Atom>,
}

/// The format table, resolved against a live display connection.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Registry {
    formats: Vec<Format>,
}

impl Registry {
    /// Resolves every template target name to an atom.
    ///
    /// Names which fail to resolve are left out of their entry.
    pub fn resolve<D: Display>(display: &mut D) -> Result<Self, Error> {
        let mut formats = Vec::with_capacity(TEMPLATES.len());
        for &(content_type, names) in TEMPLATES {
            let mut targets = Vec::with_capacity(names.len());
            for name in names {
                let atom = display.intern_atom(name)?;
                if atom != x11rb::NONE {
                    targets.push(atom);
                }
            }
            formats.push(Format {
                content_type,
                targets,
            });
        }

        Ok(Self { formats })
    }

    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    /// Returns the content type of `target`, if any.
    ///
    /// The first entry listing the target wins.
    pub fn type_for(&self, target: Atom) -> Option<ContentType> {
        self.formats
            .iter()
            .find(|format| format.targets.contains(&target))
            .map(|format| format.content_type)
    }

    /// Expands content types to all their targets, in the order given.
    pub fn targets_for(&self, types: &[ContentType]) -> Vec<Atom> {
        types
            .iter()
            .flat_map(|content_type| {
                self.formats
                    .iter()
                    .filter(move |format| format.content_type == *content_type)
                    .flat_map(|format| format.targets.iter().copied())
            })
            .collect()
    }

    /// Picks, for each known content type, the first of our targets that the owner offers.
    ///
    /// The result is in registry priority order.
    pub fn negotiate(&self, offered: &[Atom]) -> Vec<(ContentType, Atom)> {
        self.formats
            .iter()
            .filter_map(|format| {
                format
                    .targets
                    .iter()
                    .find(|target| offered.contains(target))
                    .map(|&target| (format.content_type, target))
            })
            .collect()
    }
}

/// Looks up the content type of `target`, logging when there is none.
pub(crate) fn type_for_logged<D: Display>(
    registry: &Registry,
    display: &mut D,
    selection: crate::Selection,
    target: Atom,
) -> ContentType {
    match registry.type_for(target) {
        Some(content_type) => content_type,
        None => {
            warn!(
                "{}: unexpected selection type {}",
                selection,
                display.atom_name(target)
            );
            ContentType::None
        }
    }
}
