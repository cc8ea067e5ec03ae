//! Property-based serialization tests for the request/notification envelope.
//!
//! Uses proptest to verify:
//! 1. Any `ChatMessage` survives an encode → decode round-trip.
//! 2. Any `RequestMessage`, including a deferred notification, round-trips.
//! 3. Any `ServiceMessage` survives a framed encode → decode round-trip.
//! 4. A framed snapshot cut short never decodes.
//! 5. Random bytes never cause a panic in `decode` or `decode_framed`.

use std::path::PathBuf;

use proptest::prelude::*;

use nchat_proto::codec;
use nchat_proto::message::{ChatInfo, ChatMessage, ContactInfo};
use nchat_proto::request::RequestMessage;
use nchat_proto::service::{ServiceKind, ServiceMessage};

// --- Strategies ---

fn arb_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_/.%-]{0,24}"
}

fn arb_text() -> impl Strategy<Value = String> {
    ".{0,256}"
}

fn arb_chat_info() -> impl Strategy<Value = ChatInfo> {
    (arb_id(), arb_text(), any::<bool>(), any::<bool>(), any::<i64>()).prop_map(
        |(id, name, is_unread, is_muted, last_message_time)| ChatInfo {
            id,
            name,
            is_unread,
            is_muted,
            last_message_time,
        },
    )
}

fn arb_contact_info() -> impl Strategy<Value = ContactInfo> {
    (arb_id(), arb_text(), any::<bool>()).prop_map(|(id, name, is_self)| ContactInfo {
        id,
        name,
        is_self,
    })
}

fn arb_chat_message() -> impl Strategy<Value = ChatMessage> {
    (
        (arb_id(), arb_id(), arb_text()),
        proptest::option::of(arb_id()),
        proptest::option::of("[a-z/]{1,32}".prop_map(PathBuf::from)),
        (any::<i64>(), any::<bool>(), any::<bool>()),
    )
        .prop_map(
            |((id, sender_id, text), quoted_id, file_path, (time_sent, is_outgoing, is_read))| {
                ChatMessage {
                    id,
                    sender_id,
                    text,
                    quoted_id,
                    file_path,
                    time_sent,
                    is_outgoing,
                    is_read,
                }
            },
        )
}

fn arb_service_kind() -> impl Strategy<Value = ServiceKind> {
    prop_oneof![
        any::<bool>().prop_map(|success| ServiceKind::Connect { success }),
        prop::collection::vec(arb_contact_info(), 0..8)
            .prop_map(|contacts| ServiceKind::NewContacts { contacts }),
        (any::<bool>(), prop::collection::vec(arb_chat_info(), 0..8))
            .prop_map(|(success, chats)| ServiceKind::NewChats { success, chats }),
        (
            any::<bool>(),
            arb_id(),
            prop::collection::vec(arb_chat_message(), 0..8),
            proptest::option::of(arb_id()),
        )
            .prop_map(|(success, chat_id, messages, from_msg_id)| {
                ServiceKind::NewMessages {
                    success,
                    chat_id,
                    messages,
                    from_msg_id,
                }
            }),
        (any::<bool>(), arb_id(), arb_chat_message()).prop_map(
            |(success, chat_id, chat_message)| ServiceKind::SendMessage {
                success,
                chat_id,
                chat_message,
            }
        ),
        (any::<bool>(), arb_id(), arb_id()).prop_map(|(success, chat_id, msg_id)| {
            ServiceKind::DeleteMessage {
                success,
                chat_id,
                msg_id,
            }
        }),
        (arb_id(), arb_id(), any::<bool>()).prop_map(|(chat_id, user_id, is_typing)| {
            ServiceKind::ReceiveTyping {
                chat_id,
                user_id,
                is_typing,
            }
        }),
        (arb_id(), any::<bool>())
            .prop_map(|(user_id, is_online)| ServiceKind::ReceiveStatus { user_id, is_online }),
    ]
}

fn arb_service_message() -> impl Strategy<Value = ServiceMessage> {
    (arb_id(), arb_service_kind()).prop_map(|(profile_id, kind)| ServiceMessage::new(profile_id, kind))
}

fn arb_request() -> impl Strategy<Value = RequestMessage> {
    prop_oneof![
        Just(RequestMessage::GetContacts),
        Just(RequestMessage::GetChats),
        (arb_id(), proptest::option::of(arb_id()), 0usize..1000).prop_map(
            |(chat_id, from_msg_id, limit)| RequestMessage::GetMessages {
                chat_id,
                from_msg_id,
                limit,
            }
        ),
        (arb_id(), arb_text(), proptest::option::of(arb_id())).prop_map(
            |(chat_id, text, quoted_id)| RequestMessage::SendMessage {
                chat_id,
                text,
                file_path: None,
                quoted_id,
            }
        ),
        (arb_id(), arb_id())
            .prop_map(|(chat_id, msg_id)| RequestMessage::MarkMessageRead { chat_id, msg_id }),
        (arb_id(), any::<bool>())
            .prop_map(|(chat_id, is_typing)| RequestMessage::SendTyping { chat_id, is_typing }),
        any::<bool>().prop_map(|is_online| RequestMessage::SetStatus { is_online }),
        arb_service_message().prop_map(|m| RequestMessage::DeferNotify(Box::new(m))),
    ]
}

// --- Property tests ---

proptest! {
    /// Any ChatMessage survives an encode → decode round-trip.
    #[test]
    fn chat_message_round_trip(msg in arb_chat_message()) {
        let bytes = codec::encode(&msg).expect("encode should succeed");
        let decoded: ChatMessage = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(msg, decoded);
    }

    /// Any request, including a deferred notification, round-trips.
    #[test]
    fn request_round_trip(request in arb_request()) {
        let bytes = codec::encode(&request).expect("encode should succeed");
        let decoded: RequestMessage = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(request, decoded);
    }

    /// Any notification survives a framed encode → decode round-trip.
    #[test]
    fn framed_notification_round_trip(message in arb_service_message()) {
        let frame = codec::encode_framed(&message).expect("encode_framed should succeed");
        let decoded: ServiceMessage =
            codec::decode_framed(&frame).expect("decode_framed should succeed");
        prop_assert_eq!(message, decoded);
    }

    /// A frame missing any number of trailing bytes is rejected.
    #[test]
    fn truncated_frame_is_rejected(message in arb_service_message(), cut in 1usize..64) {
        let frame = codec::encode_framed(&message).expect("encode_framed should succeed");
        let keep = frame.len().saturating_sub(cut);
        let result: Result<ServiceMessage, _> = codec::decode_framed(&frame[..keep]);
        prop_assert!(result.is_err());
    }

    /// Random bytes never cause a panic when decoded.
    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode::<ServiceMessage>(&bytes);
        let _ = codec::decode::<RequestMessage>(&bytes);
    }

    /// Random bytes never cause a panic when decoded as a framed snapshot.
    #[test]
    fn random_bytes_decode_framed_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_framed::<ServiceMessage>(&bytes);
    }
}
