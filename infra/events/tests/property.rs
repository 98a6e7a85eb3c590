use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use tybus_events::{Bus, Relay};

#[derive(Clone, Debug)]
struct Sample(u32);

#[derive(Clone, Debug)]
struct Label(String);

#[derive(Clone, Debug)]
enum Op {
    Sample(u32),
    Label(String),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u32>().prop_map(Op::Sample), "[a-z]{1,8}".prop_map(Op::Label)]
}

proptest! {
    #[test]
    fn flush_delivers_every_event_once_in_push_order(values in proptest::collection::vec(any::<u32>(), 0..256)) {
        let bus = Bus::new();
        let relay = Relay::new();
        bus.connect_relay(&relay).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        relay.connect(move |event: &mut Sample| sink.lock().push(event.0));

        for value in &values {
            bus.emit(Sample(*value));
        }
        relay.dispatch();
        prop_assert_eq!(&*seen.lock(), &values);

        relay.dispatch();
        prop_assert_eq!(seen.lock().len(), values.len());
    }

    #[test]
    fn interleaved_types_keep_per_type_order(
        ops in proptest::collection::vec(op(), 0..128)
    ) {
        let bus = Bus::new();
        let relay = Relay::new();
        bus.connect_relay(&relay).unwrap();

        let samples = Arc::new(Mutex::new(Vec::new()));
        let labels = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&samples);
        relay.connect(move |event: &mut Sample| sink.lock().push(event.0));
        let sink = Arc::clone(&labels);
        relay.connect(move |event: &mut Label| sink.lock().push(event.0.clone()));

        let mut expected_samples = Vec::new();
        let mut expected_labels = Vec::new();
        for op in ops {
            match op {
                Op::Sample(value) => {
                    expected_samples.push(value);
                    bus.emit(Sample(value));
                },
                Op::Label(label) => {
                    expected_labels.push(label.clone());
                    bus.emit(Label(label));
                },
            }
        }

        let delivered = relay.queue().sync_and_emit_events(relay.bus());
        prop_assert_eq!(delivered, expected_samples.len() + expected_labels.len());
        prop_assert_eq!(&*samples.lock(), &expected_samples);
        prop_assert_eq!(&*labels.lock(), &expected_labels);
    }

    #[test]
    fn connections_removed_in_any_order_leave_no_listeners(
        count in 1usize..16,
        seed in any::<u64>(),
    ) {
        let bus = Bus::new();
        let mut handles: Vec<_> = (0..count).map(|_| bus.connect(|_: &mut Sample| {})).collect();
        prop_assert_eq!(bus.listener_count::<Sample>(), count);

        // Cheap deterministic shuffle driven by the seed.
        let mut state = seed | 1;
        for i in (1..handles.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = usize::try_from(state % (i as u64 + 1)).unwrap();
            handles.swap(i, j);
        }

        for (removed, handle) in handles.into_iter().enumerate() {
            bus.disconnect::<Sample>(handle);
            prop_assert_eq!(bus.listener_count::<Sample>(), count - removed - 1);
        }
    }
}
