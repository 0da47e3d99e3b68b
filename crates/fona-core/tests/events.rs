//! Unsolicited notifications and their delivery

mod common;

use std::thread;
use std::time::Duration;

use common::{agreeable, device, device_with_hardware, table, RecordingHardware};
use crossbeam_channel::unbounded;
use fona_core::types::{AddressType, HttpMethod, SmsStorage};
use pretty_assertions::assert_eq;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

#[test]
fn test_ring_text_raises_ringing() {
    let (fona, handle) = device(agreeable());
    let (tx, rx) = unbounded();
    fona.on_ringing(move |e| {
        tx.send(e.at)?;
        Ok(())
    });

    handle.inject(b"\r\nRING\r\n");
    rx.recv_timeout(WAIT).unwrap();
    assert_eq!(fona.engine().link().queued(), 0);
}

#[test]
fn test_ring_text_ignored_with_ring_indicator() {
    let (fona, handle) = device_with_hardware(agreeable(), RecordingHardware::default());
    let (tx, rx) = unbounded();
    fona.on_ringing(move |_| {
        tx.send(())?;
        Ok(())
    });

    handle.inject(b"RING\r\n");
    assert!(rx.recv_timeout(QUIET).is_err());
    assert_eq!(fona.engine().link().queued(), 0);

    fona.ring_notifier().notify();
    rx.recv_timeout(WAIT).unwrap();
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_caller_id_event() {
    let (fona, handle) = device(agreeable());
    let (tx, rx) = unbounded();
    fona.on_caller_id(move |e| {
        tx.send(e.clone())?;
        Ok(())
    });

    handle.inject(b"+CLIP: \"+12025550123\",145,\"\",0,\"\",0\r\n");
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event.number, "+12025550123");
    assert_eq!(event.address_type, AddressType::International);
}

#[test]
fn test_caller_id_suppressed_while_setting_it() {
    let (fona, handle) = device(table(&[
        ("AT+CLIP=1", "+CLIP: 1,1\r\nOK\r\n"),
        ("AT+CLIP?", "+CLIP: 1,1\r\nOK\r\n"),
    ]));
    let (tx, rx) = unbounded();
    fona.on_caller_id(move |e| {
        tx.send(e.number.clone())?;
        Ok(())
    });

    fona.set_caller_id_enabled(true).unwrap();
    assert!(fona.caller_id_enabled().unwrap());
    assert!(rx.recv_timeout(QUIET).is_err());

    // suppression ends with the command
    handle.inject(b"+CLIP: \"5550100\",129\r\n");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "5550100");
}

#[test]
fn test_caller_id_delivered_while_waiting_to_set_it() {
    let (fona, handle) = device(Box::new(|command: &str| match command {
        "AT+CSQ" => {
            thread::sleep(Duration::from_millis(400));
            vec![b"+CSQ: 12,0\r\nOK\r\n".to_vec()]
        }
        _ => vec![b"OK\r\n".to_vec()],
    }));
    let (tx, rx) = unbounded();
    fona.on_caller_id(move |e| {
        tx.send(e.number.clone())?;
        Ok(())
    });

    thread::scope(|s| {
        let busy = s.spawn(|| fona.rssi());
        thread::sleep(Duration::from_millis(100));
        let waiting = s.spawn(|| fona.set_caller_id_enabled(true));
        thread::sleep(Duration::from_millis(100));

        // set_caller_id_enabled is still queued behind AT+CSQ
        handle.inject(b"+CLIP: \"5550100\",129\r\n");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "5550100");

        assert_eq!(busy.join().unwrap().unwrap(), 12);
        waiting.join().unwrap().unwrap();
    });
    assert!(handle.written().contains(&"AT+CLIP=1".to_string()));
}

#[test]
fn test_sms_arrived_event() {
    let (fona, handle) = device(agreeable());
    let (tx, rx) = unbounded();
    fona.on_sms_received(move |e| {
        tx.send((e.storage, e.index))?;
        Ok(())
    });

    handle.inject(b"+CMTI: \"SM\",7\r\n");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), (SmsStorage::Sim, 7));
}

#[test]
fn test_notification_inside_reply_does_not_disturb_it() {
    let (fona, _) = device(table(&[("AT+CSQ", "RING\r\n+CSQ: 17,0\r\nRING\r\nOK\r\n")]));
    let (tx, rx) = unbounded();
    fona.on_ringing(move |_| {
        tx.send(())?;
        Ok(())
    });

    assert_eq!(fona.rssi().unwrap(), 17);
    rx.recv_timeout(WAIT).unwrap();
    rx.recv_timeout(WAIT).unwrap();
}

#[test]
fn test_events_from_sequential_producers_keep_order() {
    let (fona, handle) = device(agreeable());
    let (tx, rx) = unbounded();
    fona.on_sms_received(move |e| {
        tx.send(e.index)?;
        Ok(())
    });

    for index in 0..20u32 {
        let producer = handle.clone();
        thread::spawn(move || producer.inject(format!("+CMTI: \"SM\",{}\r\n", index).as_bytes()))
            .join()
            .unwrap();
    }

    let got: Vec<u32> = (0..20).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
    assert_eq!(got, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_failing_callback_does_not_stop_delivery() {
    let (fona, handle) = device(agreeable());
    let (tx, rx) = unbounded();
    fona.on_sms_received(move |e| {
        if e.index == 1 {
            anyhow::bail!("cannot handle message {}", e.index);
        }
        tx.send(e.index)?;
        Ok(())
    });

    handle.inject(b"+CMTI: \"SM\",1\r\n+CMTI: \"SM\",2\r\n");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
}

#[test]
fn test_unregistered_events_are_dropped() {
    let (fona, handle) = device(agreeable());
    handle.inject(b"RING\r\n+CMTI: \"SM\",1\r\n");
    let (tx, rx) = unbounded();
    fona.on_sms_received(move |e| {
        tx.send(e.index)?;
        Ok(())
    });
    handle.inject(b"+CMTI: \"SM\",2\r\n");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
}

fn http_modem(status: u16, body: &'static str, read_reply: Option<&'static str>) -> common::Responder {
    Box::new(move |command: &str| match command {
        "AT+HTTPTERM" => vec![b"ERROR\r\n".to_vec()],
        "AT+HTTPACTION=0" => vec![
            b"OK\r\n".to_vec(),
            format!("\r\n+HTTPACTION: 0,{},{}\r\n", status, body.len()).into_bytes(),
        ],
        "AT+HTTPREAD" => vec![read_reply
            .map(str::to_string)
            .unwrap_or_else(|| format!("+HTTPREAD: {}\r\n{}\r\nOK\r\n", body.len(), body))
            .into_bytes()],
        _ => vec![b"OK\r\n".to_vec()],
    })
}

#[test]
fn test_http_get_delivers_body() {
    let (fona, handle) = device(http_modem(200, "hello\r\nworld", None));
    let (tx, rx) = unbounded();
    fona.on_http_response(move |e| {
        tx.send(e.clone())?;
        Ok(())
    });

    fona.send_http_request(HttpMethod::Get, "http://example.com/x", false)
        .unwrap();
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event.status, 200);
    assert_eq!(event.body_text().as_deref(), Some("hello\r\nworld"));

    let written = handle.written();
    assert_eq!(
        written[..8].to_vec(),
        vec![
            "AT+HTTPTERM",
            "AT+HTTPINIT",
            "AT+HTTPPARA=\"CID\",1",
            "AT+HTTPPARA=\"UA\",\"fona-rs\"",
            "AT+HTTPPARA=\"URL\",\"http://example.com/x\"",
            "AT+HTTPPARA=\"REDIR\",0",
            "AT+HTTPACTION=0",
            "AT+HTTPREAD",
        ]
    );
}

#[test]
fn test_http_error_status_has_no_body() {
    let (fona, handle) = device(http_modem(404, "", None));
    let (tx, rx) = unbounded();
    fona.on_http_response(move |e| {
        tx.send(e.clone())?;
        Ok(())
    });

    fona.send_http_request(HttpMethod::Get, "http://example.com/missing", true)
        .unwrap();
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event.status, 404);
    assert_eq!(event.body, None);
    assert!(!handle.written().iter().any(|c| c == "AT+HTTPREAD"));
}

#[test]
fn test_http_body_fetch_failure_still_completes() {
    let (fona, _) = device(http_modem(200, "hello", Some("ERROR\r\n")));
    let (tx, rx) = unbounded();
    fona.on_http_response(move |e| {
        tx.send(e.clone())?;
        Ok(())
    });

    fona.send_http_request(HttpMethod::Get, "http://example.com/", false)
        .unwrap();
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event.status, 200);
    assert_eq!(event.body, None);
}
