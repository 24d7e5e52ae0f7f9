pub mod disposition {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use skyport_core::collaborators::{InboundDelivery, ReceiveOutcome};
    use skyport_core::{DeliveryOutcome, DispositionContext, InboundMessage, MessageVerdict};
    use skyport_transport_amqp::{DeviceHandle, OperationStatus, TransportError};

    use crate::support::{DropProbe, Harness, deliver_inbound};

    fn subscribed() -> (Harness, DeviceHandle) {
        let mut harness = Harness::new();
        let (handle, _queue) = harness.register_key("doorbell");
        harness.transport.subscribe(handle).expect("subscribe");
        (harness, handle)
    }

    fn delivery(payload: Bytes, delivery_id: u32) -> InboundDelivery {
        InboundDelivery {
            payload,
            link_name: "messages/devicebound".to_owned(),
            delivery_id,
        }
    }

    fn take_received(harness: &Harness) -> InboundMessage {
        harness.sink.received.lock().pop().expect("message handed to client")
    }

    #[test]
    fn verdicts_map_onto_delivery_outcomes() {
        let cases = [
            (MessageVerdict::Accepted, DeliveryOutcome::Accepted),
            (MessageVerdict::Abandoned, DeliveryOutcome::Released),
            (MessageVerdict::Rejected, DeliveryOutcome::Rejected),
        ];
        let (mut harness, _handle) = subscribed();
        for (index, (verdict, expected)) in cases.into_iter().enumerate() {
            let delivery_id = u32::try_from(index).expect("small index");
            let outcome = deliver_inbound(
                &harness.world,
                "doorbell",
                delivery(Bytes::from_static(b"c2d"), delivery_id),
            );
            assert_eq!(outcome, ReceiveOutcome::Deferred);

            let message = take_received(&harness);
            harness
                .transport
                .resolve_disposition(message, verdict)
                .expect("disposition sent");

            let world = harness.world.lock();
            assert_eq!(
                world.device("doorbell").dispositions.last(),
                Some(&("messages/devicebound".to_owned(), delivery_id, expected))
            );
        }
    }

    #[test]
    fn rejected_message_is_released_once_even_when_acknowledgment_fails() {
        let (mut harness, _handle) = subscribed();
        harness.world.lock().device_mut("doorbell").fail_disposition = true;
        let drops = Arc::new(AtomicUsize::new(0));

        deliver_inbound(
            &harness.world,
            "doorbell",
            delivery(Bytes::from_owner(DropProbe(Arc::clone(&drops))), 7),
        );
        let message = take_received(&harness);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        let err = harness
            .transport
            .resolve_disposition(message, MessageVerdict::Rejected)
            .expect_err("acknowledgment fails");

        assert_eq!(err.status(), OperationStatus::Error);
        assert_eq!(err.code(), "transport.disposition.ack_failed");
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(
            harness.world.lock().device("doorbell").dispositions,
            vec![("messages/devicebound".to_owned(), 7, DeliveryOutcome::Rejected)]
        );
    }

    #[test]
    fn missing_context_or_payload_is_an_invalid_argument() {
        let (mut harness, _handle) = subscribed();
        let drops = Arc::new(AtomicUsize::new(0));

        let err = harness
            .transport
            .resolve_disposition(
                InboundMessage::new(Some(Bytes::from_owner(DropProbe(Arc::clone(&drops)))), None),
                MessageVerdict::Accepted,
            )
            .expect_err("context required");
        assert_eq!(err.status(), OperationStatus::InvalidArgument);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        let context = DispositionContext::new(Arc::from("doorbell"), "messages/devicebound", 1);
        let err = harness
            .transport
            .resolve_disposition(InboundMessage::new(None, Some(context)), MessageVerdict::Accepted)
            .expect_err("payload required");
        assert_eq!(OperationStatus::of(&Err::<(), _>(err)), OperationStatus::InvalidArgument);
        assert!(harness.world.lock().device("doorbell").dispositions.is_empty());
    }

    #[test]
    fn disposition_for_an_unregistered_device_fails() {
        let (mut harness, handle) = subscribed();
        deliver_inbound(
            &harness.world,
            "doorbell",
            delivery(Bytes::from_static(b"late"), 3),
        );
        let message = take_received(&harness);
        harness.transport.unregister(handle);

        let err = harness
            .transport
            .resolve_disposition(message, MessageVerdict::Accepted)
            .expect_err("device gone");
        assert_eq!(err.code(), "transport.disposition.unknown_device");
    }

    #[test]
    fn refused_hand_off_releases_immediately() {
        let (harness, _handle) = subscribed();
        harness.sink.refuse.store(true, Ordering::SeqCst);
        let drops = Arc::new(AtomicUsize::new(0));

        let outcome = deliver_inbound(
            &harness.world,
            "doorbell",
            delivery(Bytes::from_owner(DropProbe(Arc::clone(&drops))), 9),
        );

        assert_eq!(outcome, ReceiveOutcome::Released);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(harness.sink.received.lock().is_empty());
    }

    #[test]
    fn subscription_is_idempotent_and_reversible() {
        let (mut harness, handle) = subscribed();
        harness.transport.subscribe(handle).expect("second subscribe");
        assert_eq!(harness.world.lock().device("doorbell").subscribe_calls, 1);

        harness.transport.unsubscribe(handle).expect("unsubscribe");
        harness.transport.unsubscribe(handle).expect("second unsubscribe");
        let world = harness.world.lock();
        assert_eq!(world.device("doorbell").unsubscribe_calls, 1);
        assert!(world.device("doorbell").handler.is_none());
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let (mut harness, handle) = subscribed();
        harness.transport.unregister(handle);
        let err = harness.transport.subscribe(handle).expect_err("unknown");
        assert!(matches!(err, TransportError::UnknownDevice { .. }));
        assert_eq!(err.status(), OperationStatus::InvalidArgument);
        assert!(harness.transport.send_status(handle).is_err());
    }
}
