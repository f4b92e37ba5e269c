//! End-to-end tests for the control plane
//!
//! Each test runs a full plane against a fake radio backend (a loopback
//! TCP listener speaking the status-line protocol) and, where needed, a
//! fake decoder-app instance (a loopback UDP socket speaking the telemetry
//! protocol). Children are not spawned.

use std::time::Duration;

use slice_link::config::Config;
use slice_link::coordinator::CoordinatorOptions;
use slice_link::{ControlPlane, LinkError, LinkEvent, PlaneOptions};
use slice_protocol::qt::{QtReader, QtWriter};
use slice_protocol::wsjtx;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Helpers
// ============================================================================

struct FakeRadio {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl FakeRadio {
    /// Next command line from the plane (skipping nothing)
    async fn next_command(&mut self) -> String {
        tokio::time::timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for backend command")
            .expect("backend stream error")
            .expect("backend stream closed")
    }

    /// Push one status line to the plane
    async fn push(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }
}

async fn start_plane() -> (ControlPlane, FakeRadio) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_port = listener.local_addr().unwrap().port();

    let mut config = Config::default();
    config.station.callsign = "W1ABC".into();
    config.station.grid = "FN20".into();
    config.flex.host = "127.0.0.1".into();
    config.flex.cat_base_port = 0;

    let options = PlaneOptions {
        coordinator: CoordinatorOptions {
            spawn_children: false,
            auto_bind: true,
            ini_dir: std::env::temp_dir().join("slicelink-test-ini"),
        },
        telemetry_port: 0,
        backend_port,
        connect_backend: true,
    };

    let plane = ControlPlane::start(config, options).await.unwrap();

    let (stream, _) = tokio::time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let (read_half, writer) = stream.into_split();
    let mut radio = FakeRadio {
        lines: BufReader::new(read_half).lines(),
        writer,
    };

    // The plane subscribes and asks for the slice list right away
    assert_eq!(radio.next_command().await, "C1|sub slice all");
    assert_eq!(radio.next_command().await, "C2|slice list");

    (plane, radio)
}

async fn expect_event(
    events: &mut broadcast::Receiver<LinkEvent>,
    mut matcher: impl FnMut(&LinkEvent) -> bool,
) -> LinkEvent {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed");
        if matcher(&event) {
            return event;
        }
    }
}

async fn cat_connect(plane: &ControlPlane, instance_id: &str) -> TcpStream {
    let status = plane.handle.status().await.unwrap();
    let port = status
        .instances
        .iter()
        .find(|i| i.instance_id == instance_id)
        .map(|i| i.cat_port)
        .expect("instance not bound");
    TcpStream::connect(("127.0.0.1", port)).await.unwrap()
}

async fn cat_roundtrip(stream: &mut TcpStream, command: &str) -> String {
    use tokio::io::AsyncReadExt;
    stream.write_all(command.as_bytes()).await.unwrap();
    let mut buf = [0u8; 256];
    let n = tokio::time::timeout(WAIT, stream.read(&mut buf)).await.unwrap().unwrap();
    String::from_utf8_lossy(&buf[..n]).to_string()
}

/// A fake decoder-app instance on the telemetry socket
struct FakeInstance {
    socket: UdpSocket,
    id: String,
    server_port: u16,
}

impl FakeInstance {
    async fn start(plane: &ControlPlane, id: &str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let instance = Self {
            socket,
            id: id.to_string(),
            server_port: plane.telemetry_port,
        };
        instance.send_heartbeat().await;
        instance
    }

    async fn send_heartbeat(&self) {
        let mut w = QtWriter::new();
        w.put_u32(wsjtx::MAGIC).put_u32(wsjtx::SCHEMA).put_u32(0).put_qstring(&self.id);
        self.socket
            .send_to(&w.into_bytes(), ("127.0.0.1", self.server_port))
            .await
            .unwrap();
    }

    async fn send_decode(&self, message: &str, snr: i32) {
        let mut w = QtWriter::new();
        w.put_u32(wsjtx::MAGIC)
            .put_u32(wsjtx::SCHEMA)
            .put_u32(2)
            .put_qstring(&self.id)
            .put_u8(1)
            .put_u32(43_200_000)
            .put_i32(snr)
            .put_f64(0.2)
            .put_u32(1200)
            .put_qstring("~")
            .put_qstring(message)
            .put_u8(0)
            .put_u8(0);
        self.socket
            .send_to(&w.into_bytes(), ("127.0.0.1", self.server_port))
            .await
            .unwrap();
    }

    /// Receive one command; returns (type, text payload)
    ///
    /// For FreeText the payload is the message text, for Reply it is the
    /// echoed decode message.
    async fn recv_command(&self) -> (u32, String) {
        let mut buf = vec![0u8; 1024];
        let (len, _) = tokio::time::timeout(WAIT, self.socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for decoder command")
            .unwrap();
        let mut r = QtReader::new(&buf[..len]);
        assert_eq!(r.read_u32().unwrap(), wsjtx::MAGIC);
        r.read_u32().unwrap();
        let msg_type = r.read_u32().unwrap();
        let text = match msg_type {
            // FreeText: id, text, send
            9 => {
                r.read_qstring().unwrap();
                r.read_qstring().unwrap()
            }
            // Reply: id, time, snr, dt, df, mode, message
            4 => {
                r.read_qstring().unwrap();
                r.read_u32().unwrap();
                r.read_i32().unwrap();
                r.read_f64().unwrap();
                r.read_u32().unwrap();
                r.read_qstring().unwrap();
                r.read_qstring().unwrap()
            }
            // HaltTx and friends: id only
            _ => r.read_qstring().unwrap(),
        };
        (msg_type, text)
    }
}

// ============================================================================
// Slice lifecycle (spec scenario: add / tune / remove)
// ============================================================================

#[tokio::test]
async fn slice_add_tune_remove() {
    let (plane, mut radio) = start_plane().await;
    let mut events = plane.handle.subscribe();

    radio.push("S1|slice 0 in_use=1 RF_frequency=14.074000 mode=USB").await;

    let added = expect_event(&mut events, |e| matches!(e, LinkEvent::SliceAdded { .. })).await;
    match added {
        LinkEvent::SliceAdded { index, state } => {
            assert_eq!(index, 0);
            assert_eq!(state.frequency_hz, 14_074_000);
            assert_eq!(state.mode, slice_protocol::SliceMode::Usb);
        }
        _ => unreachable!(),
    }
    expect_event(&mut events, |e| {
        matches!(e, LinkEvent::InstanceLaunched { instance_id, .. } if instance_id == "Slice-A")
    })
    .await;

    // CAT peer reads the live frequency, then retunes
    let mut cat = cat_connect(&plane, "Slice-A").await;
    assert_eq!(cat_roundtrip(&mut cat, "FA;").await, "FA00014074000;");

    cat.write_all(b"FA00014076000;").await.unwrap();
    assert_eq!(radio.next_command().await, "C3|slice tune 0 14.076000");

    // Optimistic store update is immediately visible
    assert_eq!(cat_roundtrip(&mut cat, "FA;").await, "FA00014076000;");

    // Release tears the binding down
    radio.push("S1|slice 0 in_use=0").await;
    expect_event(&mut events, |e| matches!(e, LinkEvent::SliceRemoved { index, .. } if *index == 0))
        .await;
    expect_event(&mut events, |e| {
        matches!(e, LinkEvent::InstanceStopped { instance_id, .. } if instance_id == "Slice-A")
    })
    .await;

    plane.shutdown().await;
}

// ============================================================================
// QSO happy path (FT8 exchange)
// ============================================================================

#[tokio::test]
async fn qso_happy_path() {
    let (plane, mut radio) = start_plane().await;
    let mut events = plane.handle.subscribe();

    radio.push("S1|slice 0 in_use=1 RF_frequency=14.074000 mode=DIGU").await;
    expect_event(&mut events, |e| matches!(e, LinkEvent::InstanceLaunched { .. })).await;

    let wsjtx = FakeInstance::start(&plane, "Slice-A").await;
    // Wait for the heartbeat to register the reply address
    loop {
        let status = plane.handle.status().await.unwrap();
        if status.instances.iter().any(|i| i.last_heartbeat_ms > 0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    plane.handle.execute_qso("Slice-A", "DL1XYZ").await.unwrap();

    // CQ goes out as keyed free text
    let (msg_type, text) = wsjtx.recv_command().await;
    assert_eq!(msg_type, 9);
    assert_eq!(text, "CQ W1ABC FN20");

    // They answer; we reply through the decoder's sequencer
    wsjtx.send_decode("W1ABC DL1XYZ JO62", -5).await;
    let (msg_type, text) = wsjtx.recv_command().await;
    assert_eq!(msg_type, 4);
    assert_eq!(text, "W1ABC DL1XYZ JO62");

    // Their R-report earns the RR73
    wsjtx.send_decode("W1ABC DL1XYZ R-07", -7).await;
    let (msg_type, text) = wsjtx.recv_command().await;
    assert_eq!(msg_type, 9);
    assert_eq!(text, "DL1XYZ W1ABC RR73");

    // Final 73 completes exactly once
    wsjtx.send_decode("W1ABC DL1XYZ 73", -7).await;
    let done = expect_event(&mut events, |e| e.is_qso_terminal()).await;
    match done {
        LinkEvent::QsoComplete { instance_id, target_call } => {
            assert_eq!(instance_id, "Slice-A");
            assert_eq!(target_call, "DL1XYZ");
        }
        other => panic!("expected completion, got {other:?}"),
    }

    plane.shutdown().await;
}

#[tokio::test]
async fn concurrent_qso_start_rejected() {
    let (plane, mut radio) = start_plane().await;
    let mut events = plane.handle.subscribe();

    radio.push("S1|slice 0 in_use=1 RF_frequency=14.074000 mode=DIGU").await;
    expect_event(&mut events, |e| matches!(e, LinkEvent::InstanceLaunched { .. })).await;
    let _wsjtx = FakeInstance::start(&plane, "Slice-A").await;

    plane.handle.execute_qso("Slice-A", "DL1XYZ").await.unwrap();
    let err = plane.handle.execute_qso("Slice-A", "G4AAA").await.unwrap_err();
    assert!(matches!(err, LinkError::QsoAlreadyRunning(_)));

    plane.shutdown().await;
}

// ============================================================================
// Single-transmitter invariant across CAT peers
// ============================================================================

#[tokio::test]
async fn single_transmitter_across_cat_peers() {
    let (plane, mut radio) = start_plane().await;
    let mut events = plane.handle.subscribe();

    radio.push("S1|slice 0 in_use=1 RF_frequency=14.074000 mode=USB").await;
    radio.push("S1|slice 1 in_use=1 RF_frequency=7.074000 mode=USB").await;
    expect_event(&mut events, |e| {
        matches!(e, LinkEvent::InstanceLaunched { instance_id, .. } if instance_id == "Slice-B")
    })
    .await;

    let mut cat0 = cat_connect(&plane, "Slice-A").await;
    let mut cat1 = cat_connect(&plane, "Slice-B").await;

    cat0.write_all(b"TX1;").await.unwrap();
    assert_eq!(radio.next_command().await, "C3|xmit 1");

    cat1.write_all(b"TX1;").await.unwrap();
    assert_eq!(radio.next_command().await, "C4|xmit 1");

    let status = plane.handle.status().await.unwrap();
    let tx_flags: Vec<(usize, bool)> =
        status.slices.iter().map(|s| (s.index, s.transmit)).collect();
    assert!(tx_flags.contains(&(0, false)));
    assert!(tx_flags.contains(&(1, true)));

    plane.shutdown().await;
}

// ============================================================================
// Emergency stop
// ============================================================================

#[tokio::test]
async fn emergency_stop_is_best_effort_and_idempotent() {
    let (plane, mut radio) = start_plane().await;
    let mut events = plane.handle.subscribe();

    radio.push("S1|slice 0 in_use=1 RF_frequency=14.074000 mode=USB").await;
    radio.push("S1|slice 1 in_use=1 RF_frequency=7.074000 mode=USB").await;
    expect_event(&mut events, |e| {
        matches!(e, LinkEvent::InstanceLaunched { instance_id, .. } if instance_id == "Slice-B")
    })
    .await;

    let mut cat1 = cat_connect(&plane, "Slice-B").await;
    cat1.write_all(b"TX1;").await.unwrap();
    assert_eq!(radio.next_command().await, "C3|xmit 1");

    plane.handle.emergency_stop().await.unwrap();
    // One transmitting slice, so exactly one xmit 0
    assert_eq!(radio.next_command().await, "C4|xmit 0");

    let status = plane.handle.status().await.unwrap();
    assert!(status.slices.iter().all(|s| !s.transmit));

    // Second stop finds nothing transmitting and sends nothing
    plane.handle.emergency_stop().await.unwrap();
    let extra = tokio::time::timeout(Duration::from_millis(300), radio.lines.next_line()).await;
    assert!(extra.is_err(), "unexpected backend traffic after idempotent stop");

    plane.shutdown().await;
}

// ============================================================================
// Operator errors
// ============================================================================

#[tokio::test]
async fn unknown_instance_is_a_short_error() {
    let (plane, _radio) = start_plane().await;

    let err = plane.handle.stop_instance("Slice-Q").await.unwrap_err();
    assert!(matches!(err, LinkError::InstanceNotFound(_)));

    let err = plane.handle.set_frequency("Slice-Q", 14_074_000).await.unwrap_err();
    assert!(matches!(err, LinkError::InstanceNotFound(_)));

    let err = plane.handle.execute_qso("Slice-Q", "DL1XYZ").await.unwrap_err();
    assert!(matches!(err, LinkError::InstanceNotFound(_)));

    plane.shutdown().await;
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use proptest::prelude::*;
    use slice_link::state::{SliceEvent, SliceStore, MAX_SLICES};
    use slice_protocol::flex::SliceUpdate;

    /// One transmit-flag operation: (slice index, key down)
    fn tx_op() -> impl Strategy<Value = (usize, bool)> {
        (0usize..4, any::<bool>())
    }

    fn in_use_push(index: usize, in_use: bool) -> SliceUpdate {
        SliceUpdate {
            index,
            in_use: Some(in_use),
            ..SliceUpdate::default()
        }
    }

    fn store_with_slices(count: usize) -> SliceStore {
        let store = SliceStore::new();
        for index in 0..count {
            store.apply_push(&in_use_push(index, true));
        }
        store
    }

    proptest! {
        #[test]
        fn at_most_one_transmitter_after_every_operation(
            ops in prop::collection::vec(tx_op(), 1..40)
        ) {
            let store = store_with_slices(4);

            for (index, on) in ops {
                store.set_tx(index, on);
                let transmitting = (0..4)
                    .filter(|&i| store.snapshot(i).map(|s| s.transmit).unwrap_or(false))
                    .count();
                prop_assert!(transmitting <= 1, "two transmitters after set_tx({index}, {on})");
            }
        }

        #[test]
        fn observers_never_see_two_transmitters(
            ops in prop::collection::vec(tx_op(), 1..40)
        ) {
            let store = store_with_slices(4);
            let mut events = store.subscribe();

            for (index, on) in ops {
                store.set_tx(index, on);
            }

            // Replay the event stream the way a CAT peer would see it
            let mut tx_flags = [false; MAX_SLICES];
            while let Ok(event) = events.try_recv() {
                if let SliceEvent::Updated(slice) = event {
                    tx_flags[slice.index] = slice.transmit;
                    let transmitting = tx_flags.iter().filter(|t| **t).count();
                    prop_assert!(transmitting <= 1, "observer saw two transmitters");
                }
            }
        }

        #[test]
        fn in_use_edges_pair_added_with_removed(
            flips in prop::collection::vec(any::<bool>(), 1..30)
        ) {
            let store = SliceStore::new();
            let mut events = store.subscribe();

            // Count the edges the sequence actually contains; repeats are
            // idempotent merges and must emit nothing
            let mut in_use = false;
            let mut rising = 0usize;
            let mut falling = 0usize;
            for &flip in &flips {
                if flip && !in_use {
                    rising += 1;
                } else if !flip && in_use {
                    falling += 1;
                }
                in_use = flip;
                store.apply_push(&in_use_push(0, flip));
            }

            let mut added = 0usize;
            let mut removed = 0usize;
            let mut last_was_add = false;
            while let Ok(event) = events.try_recv() {
                match event {
                    SliceEvent::Added(_) => {
                        // Adds and removes must strictly alternate
                        prop_assert!(!last_was_add, "two slice-added without a removal");
                        added += 1;
                        last_was_add = true;
                    }
                    SliceEvent::Removed(_) => {
                        prop_assert!(last_was_add, "slice-removed without a prior add");
                        removed += 1;
                        last_was_add = false;
                    }
                    SliceEvent::Updated(_) => {}
                }
            }
            prop_assert_eq!(added, rising);
            prop_assert_eq!(removed, falling);
        }

        #[test]
        fn pushes_never_disturb_other_slices(
            target in 1usize..4,
            frequency in 1_800_000u64..29_700_000u64
        ) {
            let store = store_with_slices(4);
            let before: Vec<_> = (0..4)
                .filter(|&i| i != target)
                .map(|i| store.snapshot(i).unwrap())
                .collect();

            store.apply_push(&SliceUpdate {
                index: target,
                frequency_hz: Some(frequency),
                ..SliceUpdate::default()
            });

            let after: Vec<_> = (0..4)
                .filter(|&i| i != target)
                .map(|i| store.snapshot(i).unwrap())
                .collect();
            prop_assert_eq!(before, after);
            prop_assert_eq!(store.snapshot(target).unwrap().frequency_hz, frequency);
        }
    }
}
