//! Integration tests for [`DeviceClient`] against stub TCP servers.
//!
//! Each test spins up a real `TcpListener` on `127.0.0.1:0` that mimics one
//! of the appliance's documented (mis)behaviours: noisy replies, truncated
//! frames, closed connections on the primary set-input opcode, padded ASCII
//! octets, and silent set acknowledgements.  The client talks to it over
//! real sockets, so the deadline-bounded read loops are exercised for real.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use tesmart_core::{DeviceError, NetworkSettings};
use tesmart_remote::application::DeviceClient;

/// Spawns a stub that, for every accepted connection, reads one request and
/// passes it to `respond`, writing back whatever bytes that returns.  The
/// socket stays open afterwards until the client hangs up.
async fn spawn_stub<F>(respond: F) -> String
where
    F: Fn(&[u8]) -> Vec<u8> + Clone + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut req = [0u8; 64];
                let Ok(n) = sock.read(&mut req).await else {
                    return;
                };
                let reply = respond(&req[..n]);
                if !reply.is_empty() {
                    let _ = sock.write_all(&reply).await;
                }
                // Drain until the client closes its end.
                let mut sink = [0u8; 64];
                while matches!(sock.read(&mut sink).await, Ok(m) if m > 0) {}
            });
        }
    });
    addr
}

/// Like [`spawn_stub`], but hangs up right after writing the reply.  Used
/// for set-packet tests so the one-shot drain ends on EOF instead of
/// waiting out the full deadline.
async fn spawn_stub_closing<F>(respond: F) -> String
where
    F: Fn(&[u8]) -> Vec<u8> + Clone + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let mut req = [0u8; 64];
            let Ok(n) = sock.read(&mut req).await else {
                continue;
            };
            let reply = respond(&req[..n]);
            if !reply.is_empty() {
                let _ = sock.write_all(&reply).await;
            }
        }
    });
    addr
}

fn client_for(addr: &str) -> DeviceClient {
    let (ip, port) = addr.rsplit_once(':').unwrap();
    DeviceClient::new(
        ip,
        port.parse().unwrap(),
        Duration::from_millis(300),
        Duration::from_millis(300),
    )
}

// ── GetActiveInput ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_active_input_parses_noisy_reply() {
    // The status frame is wrapped in unrelated bytes on both sides.
    let addr = spawn_stub(|req| {
        assert_eq!(req, [0xAA, 0xBB, 0x03, 0x10, 0x00, 0xEE]);
        vec![0x00, 0xAA, 0xBB, 0x03, 0x11, 0x05, 0xEE, 0x99]
    })
    .await;

    let client = client_for(&addr);
    assert_eq!(client.get_active_input().await.unwrap(), 6);
}

#[tokio::test]
async fn test_get_active_input_parses_truncated_reply() {
    // Firmware variant that drops the trailing 0xEE: the relaxed fallback
    // scan must still recover the port.
    let addr = spawn_stub(|_| vec![0xAA, 0xBB, 0x03, 0x11, 0x02]).await;

    let client = client_for(&addr);
    assert_eq!(client.get_active_input().await.unwrap(), 3);
}

#[tokio::test]
async fn test_get_active_input_retries_once_then_succeeds() {
    // First session gets garbage, second session gets a proper frame.
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_stub = Arc::clone(&calls);
    let addr = spawn_stub(move |_| {
        if calls_stub.fetch_add(1, Ordering::SeqCst) == 0 {
            vec![0xDE, 0xAD, 0xBE, 0xEF]
        } else {
            vec![0xAA, 0xBB, 0x03, 0x11, 0x0F, 0xEE]
        }
    })
    .await;

    let client = client_for(&addr);
    assert_eq!(client.get_active_input().await.unwrap(), 16);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_get_active_input_no_reply_includes_hex_dump() {
    // Garbage on both attempts: NoReply, carrying the bytes for diagnosis.
    let addr = spawn_stub(|_| vec![0xDE, 0xAD]).await;

    let client = client_for(&addr);
    match client.get_active_input().await.unwrap_err() {
        DeviceError::NoReply { reply_hex } => assert_eq!(reply_hex, "DEAD"),
        other => panic!("expected NoReply, got {other}"),
    }
}

#[tokio::test]
async fn test_get_active_input_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = client_for(&addr);
    assert!(matches!(
        client.get_active_input().await.unwrap_err(),
        DeviceError::Unreachable { .. }
    ));
}

// ── SetInput ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_input_primary_opcode() {
    let addr = spawn_stub(|req| {
        assert_eq!(req, [0xAA, 0xBB, 0x03, 0x01, 0x04, 0xEE]);
        vec![0xAA, 0xBB, 0x03, 0x11, 0x03, 0xEE]
    })
    .await;

    client_for(&addr).set_input(4).await.unwrap();
}

#[tokio::test]
async fn test_set_input_falls_back_to_alternate_opcode() {
    // The stub NACKs the 1-indexed opcode by closing the connection without
    // a reply, and ACKs the 0-indexed alternate form.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_stub = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let mut req = [0u8; 64];
            let Ok(n) = sock.read(&mut req).await else {
                continue;
            };
            seen_stub.lock().await.push(req[..n].to_vec());
            if req[3] == 0x01 {
                // Primary opcode: slam the connection shut.
                drop(sock);
            } else {
                let _ = sock.write_all(&[0xAA, 0xBB, 0x03, 0x11, req[4], 0xEE]).await;
                let mut sink = [0u8; 64];
                while matches!(sock.read(&mut sink).await, Ok(m) if m > 0) {}
            }
        }
    });

    client_for(&addr).set_input(4).await.unwrap();

    let seen = seen.lock().await;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], [0xAA, 0xBB, 0x03, 0x01, 0x04, 0xEE]);
    assert_eq!(seen[1], [0xAA, 0xBB, 0x03, 0x11, 0x03, 0xEE]);
}

// ── Buzzer / LED ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_buzzer_sends_expected_frames() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_stub = Arc::clone(&seen);
    let addr = spawn_stub(move |req| {
        seen_stub.try_lock().unwrap().push(req.to_vec());
        vec![0xAA, 0xBB, 0x03, 0x02, req[4], 0xEE]
    })
    .await;

    let client = client_for(&addr);
    client.set_buzzer(true).await.unwrap();
    client.set_buzzer(false).await.unwrap();

    let seen = seen.lock().await;
    assert_eq!(seen[0], [0xAA, 0xBB, 0x03, 0x02, 0x01, 0xEE]);
    assert_eq!(seen[1], [0xAA, 0xBB, 0x03, 0x02, 0x00, 0xEE]);
}

#[tokio::test]
async fn test_set_led_timeout_sends_mode_byte() {
    use tesmart_core::LedTimeout;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_stub = Arc::clone(&seen);
    let addr = spawn_stub(move |req| {
        seen_stub.try_lock().unwrap().push(req.to_vec());
        vec![0xAA, 0xBB, 0x03, 0x03, req[4], 0xEE]
    })
    .await;

    let client = client_for(&addr);
    client.set_led_timeout(LedTimeout::Off).await.unwrap();
    client.set_led_timeout(LedTimeout::Secs10).await.unwrap();
    client.set_led_timeout(LedTimeout::Secs30).await.unwrap();

    let seen = seen.lock().await;
    assert_eq!(seen[0][4], 0x00);
    assert_eq!(seen[1][4], 0x0A);
    assert_eq!(seen[2][4], 0x1E);
}

// ── Raw hex ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_raw_hex_send_round_trips_against_echo_stub() {
    let addr = spawn_stub(|req| req.to_vec()).await;

    let client = client_for(&addr);
    let reply = client
        .raw_hex_send("aa bb 03 10 00 ee", Duration::from_millis(300))
        .await
        .unwrap();
    assert_eq!(reply, "AABB031000EE");
}

// ── ASCII network configuration ───────────────────────────────────────────────

#[tokio::test]
async fn test_get_network_config_normalises_padded_octets() {
    let addr = spawn_stub(|req| {
        if req == b"IP?" {
            b"IP:192.168.001.010;".to_vec()
        } else if req == b"PT?" {
            b"PT:05000;".to_vec()
        } else if req == b"MA?" {
            b"MA:255.255.255.000;".to_vec()
        } else if req == b"GW?" {
            b"GW:192.168.001.001;".to_vec()
        } else {
            panic!("unexpected query: {req:?}")
        }
    })
    .await;

    let net = client_for(&addr).get_network_config().await.unwrap();
    assert_eq!(
        net,
        NetworkSettings {
            ip: "192.168.1.10".to_string(),
            port: 5000,
            mask: "255.255.255.0".to_string(),
            gateway: "192.168.1.1".to_string(),
        }
    );
}

#[tokio::test]
async fn test_get_network_config_tolerates_nul_padding() {
    let addr = spawn_stub(|req| {
        let mut reply = vec![0x00, 0x00];
        let body: &[u8] = if req == b"IP?" {
            b"IP:10.0.0.5;\r\n"
        } else if req == b"PT?" {
            b"PT:5000;\r\n"
        } else if req == b"MA?" {
            b"MA:255.0.0.0;\r\n"
        } else if req == b"GW?" {
            b"GW:10.0.0.1;\r\n"
        } else {
            panic!("unexpected query: {req:?}")
        };
        reply.extend_from_slice(body);
        reply
    })
    .await;

    let net = client_for(&addr).get_network_config().await.unwrap();
    assert_eq!(net.ip, "10.0.0.5");
    assert_eq!(net.port, 5000);
}

#[tokio::test]
async fn test_get_network_config_rejects_out_of_range_port() {
    let addr = spawn_stub(|req| {
        if req == b"IP?" {
            b"IP:10.0.0.5;".to_vec()
        } else if req == b"PT?" {
            b"PT:0;".to_vec()
        } else {
            panic!("unexpected query: {req:?}")
        }
    })
    .await;

    assert!(matches!(
        client_for(&addr).get_network_config().await.unwrap_err(),
        DeviceError::BadReply(_)
    ));
}

#[tokio::test]
async fn test_set_then_get_network_config_round_trips() {
    // A compliant stub: remembers set values and echoes them on queries.
    let stored: Arc<Mutex<NetworkSettings>> = Arc::new(Mutex::new(NetworkSettings {
        ip: "0.0.0.0".to_string(),
        port: 1,
        mask: "0.0.0.0".to_string(),
        gateway: "0.0.0.0".to_string(),
    }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let stored_stub = Arc::clone(&stored);
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let mut req = [0u8; 64];
            let Ok(n) = sock.read(&mut req).await else {
                continue;
            };
            let text = String::from_utf8_lossy(&req[..n]).to_string();
            let mut cfg = stored_stub.lock().await;
            let reply = if let Some(v) = text.strip_prefix("IP:") {
                cfg.ip = v.trim_end_matches(';').to_string();
                "OK".to_string()
            } else if let Some(v) = text.strip_prefix("PT:") {
                cfg.port = v.trim_end_matches(';').parse().unwrap();
                "OK".to_string()
            } else if let Some(v) = text.strip_prefix("MA:") {
                cfg.mask = v.trim_end_matches(';').to_string();
                "OK".to_string()
            } else if let Some(v) = text.strip_prefix("GW:") {
                cfg.gateway = v.trim_end_matches(';').to_string();
                "OK".to_string()
            } else {
                match text.as_str() {
                    "IP?" => format!("IP:{};", cfg.ip),
                    "PT?" => format!("PT:{};", cfg.port),
                    "MA?" => format!("MA:{};", cfg.mask),
                    "GW?" => format!("GW:{};", cfg.gateway),
                    other => panic!("unexpected request: {other:?}"),
                }
            };
            drop(cfg);
            let _ = sock.write_all(reply.as_bytes()).await;
        }
    });

    let desired = NetworkSettings {
        ip: "192.168.1.20".to_string(),
        port: 5001,
        mask: "255.255.255.0".to_string(),
        gateway: "192.168.1.1".to_string(),
    };
    let client = client_for(&addr);
    client.set_network_config(&desired).await.unwrap();
    assert_eq!(client.get_network_config().await.unwrap(), desired);
}

#[tokio::test]
async fn test_set_network_config_accepts_silent_firmware() {
    // No reply at all to set packets is success.
    let addr = spawn_stub_closing(|_| Vec::new()).await;

    let desired = NetworkSettings {
        ip: "10.0.0.2".to_string(),
        port: 5000,
        mask: "255.0.0.0".to_string(),
        gateway: "10.0.0.1".to_string(),
    };
    client_for(&addr).set_network_config(&desired).await.unwrap();
}

#[tokio::test]
async fn test_set_network_config_rejects_non_ok_reply() {
    let addr = spawn_stub_closing(|_| b"ERR".to_vec()).await;

    let desired = NetworkSettings {
        ip: "10.0.0.2".to_string(),
        port: 5000,
        mask: "255.0.0.0".to_string(),
        gateway: "10.0.0.1".to_string(),
    };
    assert!(matches!(
        client_for(&addr).set_network_config(&desired).await.unwrap_err(),
        DeviceError::BadReply(_)
    ));
}

// ── Serialisation under load ──────────────────────────────────────────────────

#[tokio::test]
async fn test_thirty_two_concurrent_callers_never_overlap_on_the_wire() {
    // The stub counts requests being processed at the same moment; the
    // client mutex must keep that at exactly one.
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let in_flight_stub = Arc::clone(&in_flight);
    let max_stub = Arc::clone(&max_in_flight);
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let in_flight = Arc::clone(&in_flight_stub);
            let max = Arc::clone(&max_stub);
            tokio::spawn(async move {
                let mut req = [0u8; 64];
                let Ok(n) = sock.read(&mut req).await else {
                    return;
                };
                if n == 0 {
                    return;
                }
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                let _ = sock.write_all(&[0xAA, 0xBB, 0x03, 0x11, 0x00, 0xEE]).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                let mut sink = [0u8; 64];
                while matches!(sock.read(&mut sink).await, Ok(m) if m > 0) {}
            });
        }
    });

    let client = Arc::new(client_for(&addr));
    let mut tasks = Vec::new();
    for _ in 0..32 {
        let client = Arc::clone(&client);
        tasks.push(tokio::spawn(async move {
            client.get_active_input().await.unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 1);
    }

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}
