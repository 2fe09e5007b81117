use proptest::prelude::*;
use x11rb::NONE;

use crate::agent::AgentMessage;
use crate::tests::*;
use crate::{ContentType, Owner, Selection};

const TEXT_AND_PNG: &[&str] = &["TARGETS", "UTF8_STRING", "image/png"];

fn data(selection: Selection, content_type: ContentType, data: &[u8]) -> AgentMessage {
    AgentMessage::ClipboardData {
        selection,
        content_type,
        data: data.to_vec(),
    }
}

fn no_data(selection: Selection) -> AgentMessage {
    data(selection, ContentType::None, &[])
}

fn owned_bridge() -> Bridge<FakeDisplay> {
    let mut bridge = new_bridge();
    desktop_grab(&mut bridge, "CLIPBOARD", 42, TEXT_AND_PNG);
    desktop_grab(&mut bridge, "PRIMARY", 43, TEXT_AND_PNG);
    bridge.take_messages();
    bridge.display_mut().take_calls();
    bridge
}

#[test]
fn request_hello() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();

    let clipboard = atom(&mut bridge, "CLIPBOARD");
    let utf8 = atom(&mut bridge, "UTF8_STRING");
    assert_eq!(
        bridge.display_mut().take_calls(),
        [Call::ConvertSelection {
            selection: clipboard,
            target: utf8,
            property: clipboard,
        }]
    );
    assert!(bridge.take_messages().is_empty());

    answer_conversion(
        &mut bridge,
        "CLIPBOARD",
        "UTF8_STRING",
        "UTF8_STRING",
        8,
        b"hello".to_vec(),
    );

    assert_eq!(
        bridge.take_messages(),
        [data(Selection::Clipboard, ContentType::Utf8Text, b"hello")]
    );
    // The property is deleted once read.
    assert!(bridge
        .display_mut()
        .take_calls()
        .contains(&Call::DeleteProperty {
            window: PROXY,
            property: clipboard,
        }));
    assert!(bridge.display().properties.is_empty());
}

#[test]
fn request_without_owner() {
    let mut bridge = new_bridge();

    bridge
        .request_data(Selection::Primary, ContentType::Utf8Text)
        .unwrap();

    assert_eq!(bridge.take_messages(), [no_data(Selection::Primary)]);
    assert!(bridge.display().calls.is_empty());
}

#[test]
fn request_unavailable_type() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Clipboard, ContentType::ImageJpg)
        .unwrap();
    bridge
        .request_data(Selection::Secondary, ContentType::Utf8Text)
        .unwrap();

    assert_eq!(
        bridge.take_messages(),
        [no_data(Selection::Clipboard), no_data(Selection::Secondary)]
    );
    assert!(bridge.display().calls.is_empty());
}

#[test]
fn request_while_agent_owns() {
    let mut bridge = new_bridge();
    bridge
        .grab(Selection::Clipboard, vec![ContentType::Utf8Text])
        .unwrap();
    bridge.display_mut().take_calls();

    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();

    assert_eq!(bridge.take_messages(), [no_data(Selection::Clipboard)]);
    assert!(bridge.display().calls.is_empty());
}

#[test]
fn requests_served_in_order() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();
    bridge
        .request_data(Selection::Primary, ContentType::ImagePng)
        .unwrap();
    bridge
        .request_data(Selection::Clipboard, ContentType::ImagePng)
        .unwrap();

    // Only the first one is sent to the owner.
    assert_eq!(bridge.display().conversions().len(), 1);

    answer_conversion(&mut bridge, "CLIPBOARD", "UTF8_STRING", "UTF8_STRING", 8, b"1".to_vec());
    assert_eq!(bridge.display().conversions().len(), 2);
    answer_conversion(&mut bridge, "PRIMARY", "image/png", "image/png", 8, b"2".to_vec());
    answer_conversion(&mut bridge, "CLIPBOARD", "image/png", "image/png", 8, b"3".to_vec());

    assert_eq!(
        bridge.take_messages(),
        [
            data(Selection::Clipboard, ContentType::Utf8Text, b"1"),
            data(Selection::Primary, ContentType::ImagePng, b"2"),
            data(Selection::Clipboard, ContentType::ImagePng, b"3"),
        ]
    );
    assert_eq!(bridge.display().conversions().len(), 3);
}

#[test]
fn refused_and_mismatched_replies() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();
    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();
    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();
    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();

    refuse_conversion(&mut bridge, "CLIPBOARD", "UTF8_STRING");
    // Wrong target.
    answer_conversion(&mut bridge, "CLIPBOARD", "image/png", "image/png", 8, b"x".to_vec());
    // Wrong type.
    answer_conversion(&mut bridge, "CLIPBOARD", "UTF8_STRING", "STRING", 8, b"x".to_vec());
    // Zero length.
    answer_conversion(&mut bridge, "CLIPBOARD", "UTF8_STRING", "UTF8_STRING", 8, Vec::new());

    assert_eq!(
        bridge.take_messages(),
        [
            no_data(Selection::Clipboard),
            no_data(Selection::Clipboard),
            no_data(Selection::Clipboard),
            no_data(Selection::Clipboard),
        ]
    );
}

#[test]
fn incremental_read() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Primary, ContentType::Utf8Text)
        .unwrap();
    answer_conversion(
        &mut bridge,
        "PRIMARY",
        "UTF8_STRING",
        "INCR",
        32,
        300_000u32.to_ne_bytes().to_vec(),
    );

    let primary = atom(&mut bridge, "PRIMARY");
    let calls = bridge.display_mut().take_calls();
    assert!(calls.contains(&Call::WatchProperties(PROXY)));
    assert!(calls.contains(&Call::DeleteProperty {
        window: PROXY,
        property: primary,
    }));
    assert!(bridge.take_messages().is_empty());

    let expected: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    for chunk in expected.chunks(65536) {
        send_chunk(&mut bridge, "PRIMARY", "UTF8_STRING", chunk);
        assert!(bridge.take_messages().is_empty());
    }
    send_chunk(&mut bridge, "PRIMARY", "UTF8_STRING", &[]);

    assert_eq!(
        bridge.take_messages(),
        [data(Selection::Primary, ContentType::Utf8Text, &expected)]
    );
    assert!(!bridge.incr_reader.is_active());
}

#[test]
fn incremental_read_bad_chunk() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Clipboard, ContentType::ImagePng)
        .unwrap();
    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();
    answer_conversion(
        &mut bridge,
        "CLIPBOARD",
        "image/png",
        "INCR",
        32,
        0u32.to_ne_bytes().to_vec(),
    );
    send_chunk(&mut bridge, "CLIPBOARD", "image/png", b"\x89PNG");
    send_chunk(&mut bridge, "CLIPBOARD", "image/jpeg", b"nope");

    assert_eq!(bridge.take_messages(), [no_data(Selection::Clipboard)]);
    assert!(!bridge.incr_reader.is_active());

    // The next request went out.
    let clipboard = atom(&mut bridge, "CLIPBOARD");
    let utf8 = atom(&mut bridge, "UTF8_STRING");
    assert_eq!(bridge.display().conversions().last(), Some(&(clipboard, utf8)));
}

#[test]
fn refusal_during_incremental_read() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Clipboard, ContentType::ImagePng)
        .unwrap();
    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();
    answer_conversion(
        &mut bridge,
        "CLIPBOARD",
        "image/png",
        "INCR",
        32,
        1000u32.to_ne_bytes().to_vec(),
    );
    refuse_conversion(&mut bridge, "CLIPBOARD", "image/png");

    assert_eq!(bridge.take_messages(), [no_data(Selection::Clipboard)]);
    assert!(!bridge.incr_reader.is_active());

    // The next conversion reads its own incremental transfer.
    answer_conversion(
        &mut bridge,
        "CLIPBOARD",
        "UTF8_STRING",
        "INCR",
        32,
        5u32.to_ne_bytes().to_vec(),
    );
    send_chunk(&mut bridge, "CLIPBOARD", "UTF8_STRING", b"hello");
    send_chunk(&mut bridge, "CLIPBOARD", "UTF8_STRING", &[]);

    assert_eq!(
        bridge.take_messages(),
        [data(Selection::Clipboard, ContentType::Utf8Text, b"hello")]
    );
}

#[test]
fn incremental_start_while_reading() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Clipboard, ContentType::ImagePng)
        .unwrap();
    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();
    for _ in 0..2 {
        answer_conversion(
            &mut bridge,
            "CLIPBOARD",
            "image/png",
            "INCR",
            32,
            1000u32.to_ne_bytes().to_vec(),
        );
    }

    assert_eq!(bridge.take_messages(), [no_data(Selection::Clipboard)]);
    assert!(!bridge.incr_reader.is_active());

    let clipboard = atom(&mut bridge, "CLIPBOARD");
    let utf8 = atom(&mut bridge, "UTF8_STRING");
    assert_eq!(bridge.display().conversions().last(), Some(&(clipboard, utf8)));

    // Chunks of the failed transfer are ignored.
    send_chunk(&mut bridge, "CLIPBOARD", "image/png", b"\x89PNG");
    assert!(bridge.take_messages().is_empty());

    answer_conversion(&mut bridge, "CLIPBOARD", "UTF8_STRING", "UTF8_STRING", 8, b"hi".to_vec());
    assert_eq!(
        bridge.take_messages(),
        [data(Selection::Clipboard, ContentType::Utf8Text, b"hi")]
    );
}

#[test]
fn owner_change_answers_pending_requests() {
    let mut bridge = owned_bridge();

    bridge
        .request_data(Selection::Clipboard, ContentType::Utf8Text)
        .unwrap();
    bridge
        .request_data(Selection::Primary, ContentType::Utf8Text)
        .unwrap();
    bridge
        .request_data(Selection::Clipboard, ContentType::ImagePng)
        .unwrap();

    announce_owner(&mut bridge, "CLIPBOARD", NONE);

    assert_eq!(
        bridge.take_messages(),
        [
            no_data(Selection::Clipboard),
            no_data(Selection::Clipboard),
            AgentMessage::ClipboardRelease {
                selection: Selection::Clipboard
            },
        ]
    );
    assert_eq!(bridge.owner(Selection::Clipboard), Owner::None);

    // The primary request is now active.
    let primary = atom(&mut bridge, "PRIMARY");
    let utf8 = atom(&mut bridge, "UTF8_STRING");
    assert_eq!(bridge.display().conversions().last(), Some(&(primary, utf8)));

    // A late answer of the previous clipboard owner doesn't confuse it.
    answer_conversion(&mut bridge, "CLIPBOARD", "UTF8_STRING", "UTF8_STRING", 8, b"old".to_vec());
    assert!(bridge.take_messages().is_empty());

    answer_conversion(&mut bridge, "PRIMARY", "UTF8_STRING", "UTF8_STRING", 8, b"new".to_vec());
    assert_eq!(
        bridge.take_messages(),
        [data(Selection::Primary, ContentType::Utf8Text, b"new")]
    );
}

#[test]
fn notify_without_request() {
    let mut bridge = owned_bridge();

    answer_conversion(&mut bridge, "CLIPBOARD", "UTF8_STRING", "UTF8_STRING", 8, b"x".to_vec());

    assert!(bridge.take_messages().is_empty());
}

proptest! {
    #[test]
    fn requests_complete_in_order(
        requests in prop::collection::vec(
            (
                prop_oneof![Just(Selection::Clipboard), Just(Selection::Primary)],
                prop_oneof![Just(ContentType::Utf8Text), Just(ContentType::ImagePng)],
            ),
            1..12,
        ),
    ) {
        let mut bridge = owned_bridge();

        for &(selection, content_type) in &requests {
            bridge.request_data(selection, content_type).unwrap();
        }

        for index in 0..requests.len() {
            let conversions = bridge.display().conversions();
            prop_assert_eq!(conversions.len(), index + 1);

            let (selection, target) = conversions[index];
            let name = bridge.display_mut().atom_name(selection);
            let target = bridge.display_mut().atom_name(target);
            answer_conversion(&mut bridge, &name, &target, &target, 8, vec![index as u8]);
        }

        let expected: Vec<_> = requests
            .iter()
            .enumerate()
            .map(|(index, &(selection, content_type))| {
                data(selection, content_type, &[index as u8])
            })
            .collect();
        prop_assert_eq!(bridge.take_messages(), expected);
    }
}
