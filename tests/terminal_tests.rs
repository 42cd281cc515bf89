//! Terminal session tests: reader loop, local echo, lifecycle errors.

mod common;

use common::{wait_until, Fixture};
use pretty_assertions::assert_eq;
use std::time::Duration;
use uart_mcp::{ConfigOverrides, LineEnding, SerialError, TerminalConfig};

const WAIT: Duration = Duration::from_secs(2);

fn open(fx: &Fixture, id: &str) {
    fx.serial.open_port(id, &ConfigOverrides::new(), true).unwrap();
}

#[test]
fn test_create_requires_open_port() {
    let fx = Fixture::new(&["P1"]);
    let terminals = fx.terminals();

    assert_eq!(
        terminals.create_session("P1", "CRLF", false, 1024).unwrap_err(),
        SerialError::PortNotOpen("P1".into())
    );

    open(&fx, "P1");
    let info = terminals.create_session("P1", "crlf", false, 1024).unwrap();
    assert_eq!(info.session_id, "P1");
    assert_eq!(info.port, "P1");
    assert!(info.active);
    assert_eq!(info.buffer_size, 0);
    assert_eq!(info.config.line_ending, LineEnding::Crlf);

    assert_eq!(
        terminals.create_session("P1", "LF", true, 1024).unwrap_err(),
        SerialError::SessionExists("P1".into())
    );
}

#[test]
fn test_create_validates_parameters() {
    let fx = Fixture::new(&["P1"]);
    let terminals = fx.terminals();

    // Line ending is checked before the port.
    assert_eq!(
        terminals.create_session("P1", "LFCR", false, 1024).unwrap_err(),
        SerialError::InvalidLineEnding("LFCR".into())
    );

    open(&fx, "P1");
    assert!(matches!(
        terminals.create_session("P1", "CR", false, 0),
        Err(SerialError::InvalidParam { param: "buffer_size", .. })
    ));
    assert!(terminals.list_sessions().is_empty());
}

#[test]
fn test_send_command_appends_line_ending() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    let terminals = fx.terminals();
    terminals.create_session("P1", "CRLF", false, 1024).unwrap();

    assert_eq!(terminals.send_command("P1", "PING", true).unwrap(), 6);
    assert_eq!(terminals.send_command("P1", "RAW", false).unwrap(), 3);
    assert_eq!(
        fx.device("P1").get_write_log(),
        vec![b"PING\r\n".to_vec(), b"RAW".to_vec()]
    );
}

#[test]
fn test_each_line_ending() {
    for (name, suffix) in [("CR", &b"\r"[..]), ("LF", &b"\n"[..]), ("CRLF", &b"\r\n"[..])] {
        let fx = Fixture::new(&["P1"]);
        open(&fx, "P1");
        let terminals = fx.terminals();
        terminals.create_session("P1", name, false, 1024).unwrap();
        terminals.send_command("P1", "x", true).unwrap();

        let mut expected = b"x".to_vec();
        expected.extend_from_slice(suffix);
        assert_eq!(fx.device("P1").written_bytes(), expected, "line ending {name}");
    }
}

#[test]
fn test_local_echo_buffers_exact_bytes() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    let terminals = fx.terminals();
    terminals.create_session("P1", "LF", true, 1024).unwrap();

    terminals.send_command("P1", "héllo", true).unwrap();
    assert_eq!(
        terminals.read_output("P1", false).unwrap(),
        "héllo\n".as_bytes()
    );
    assert_eq!(terminals.get_session_info("P1").unwrap().buffer_size, 7);
}

#[test]
fn test_local_echo_after_short_write() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    fx.device("P1").set_max_write(Some(4));
    let terminals = fx.terminals();
    terminals.create_session("P1", "CRLF", true, 1024).unwrap();

    assert_eq!(terminals.send_command("P1", "RESET", true).unwrap(), 4);
    assert_eq!(fx.device("P1").written_bytes(), b"RESE");
    assert_eq!(terminals.read_output("P1", false).unwrap(), b"RESE");
}

#[test]
fn test_reader_loop_collects_device_output() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    fx.device("P1").set_echo(true);
    let terminals = fx.terminals();
    terminals.create_session("P1", "CRLF", false, 4096).unwrap();

    terminals.send_command("P1", "PING", true).unwrap();
    assert!(wait_until(WAIT, || {
        terminals.read_output("P1", false).unwrap() == b"PING\r\n"
    }));

    // Non-clearing reads leave the data; clearing reads empty the buffer.
    assert_eq!(terminals.read_output("P1", true).unwrap(), b"PING\r\n");
    assert!(terminals.read_output("P1", false).unwrap().is_empty());
}

#[test]
fn test_read_output_text_is_lossy() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    let terminals = fx.terminals();
    terminals.create_session("P1", "CRLF", false, 4096).unwrap();

    fx.device("P1").enqueue_read(&[b'o', b'k', 0xFF]);
    assert!(wait_until(WAIT, || {
        terminals.get_session_info("P1").unwrap().buffer_size == 3
    }));
    let text = terminals.read_output_text("P1", true).unwrap();
    assert_eq!(text.bytes, 3);
    assert_eq!(text.data, "ok\u{FFFD}");
}

#[test]
fn test_output_is_bounded() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    let terminals = fx.terminals();
    terminals
        .create_session_with_config(
            "P1",
            TerminalConfig {
                local_echo: true,
                buffer_size: 10,
                ..TerminalConfig::default()
            },
        )
        .unwrap();

    for cmd in ["aaaa", "bbbb", "cccc"] {
        terminals.send_command("P1", cmd, false).unwrap();
    }
    assert_eq!(terminals.read_output("P1", false).unwrap(), b"bbbbcccc");

    terminals.clear_buffer("P1").unwrap();
    assert_eq!(terminals.get_session_info("P1").unwrap().buffer_size, 0);
}

#[test]
fn test_session_goes_inactive_when_port_closes() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    let terminals = fx.terminals();
    terminals.create_session("P1", "CRLF", false, 1024).unwrap();

    fx.serial.close_port("P1").unwrap();
    assert!(wait_until(WAIT, || {
        !terminals.get_session_info("P1").unwrap().active
    }));
    assert_eq!(
        terminals.send_command("P1", "x", true).unwrap_err(),
        SerialError::SessionClosed("P1".into())
    );

    // Closed sessions still hold their buffer until removed.
    terminals.close_session("P1").unwrap();
    assert_eq!(
        terminals.get_session_info("P1").unwrap_err(),
        SerialError::SessionNotFound("P1".into())
    );
}

#[test]
fn test_send_failure_is_wrapped() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    let terminals = fx.terminals();
    terminals.create_session("P1", "CRLF", true, 1024).unwrap();
    fx.device("P1").set_fail_writes(true);

    match terminals.send_command("P1", "x", true) {
        Err(SerialError::SendCommandFailed { session, reason }) => {
            assert_eq!(session, "P1");
            assert!(reason.contains("simulated write failure"));
        }
        other => panic!("expected SendCommandFailed, got {other:?}"),
    }
    // Nothing was echoed for the failed write.
    assert!(terminals.read_output("P1", false).unwrap().is_empty());
}

#[test]
fn test_unknown_session_errors() {
    let fx = Fixture::new(&[]);
    let terminals = fx.terminals();
    let missing = SerialError::SessionNotFound("NOPE".into());

    assert_eq!(terminals.close_session("NOPE").unwrap_err(), missing);
    assert_eq!(terminals.send_command("NOPE", "x", true).unwrap_err(), missing);
    assert_eq!(terminals.read_output("NOPE", true).unwrap_err(), missing);
    assert_eq!(terminals.clear_buffer("NOPE").unwrap_err(), missing);
    assert_eq!(terminals.get_session_info("NOPE").unwrap_err(), missing);
}

#[test]
fn test_list_and_shutdown() {
    let fx = Fixture::new(&["B", "A"]);
    open(&fx, "A");
    open(&fx, "B");
    let terminals = fx.terminals();
    terminals.create_session("B", "CRLF", false, 64).unwrap();
    terminals.create_session("A", "CRLF", false, 64).unwrap();

    let ids: Vec<String> = terminals
        .list_sessions()
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    assert_eq!(ids, vec!["A", "B"]);

    terminals.shutdown();
    assert!(terminals.list_sessions().is_empty());
    // Ports stay open; the terminal layer does not own them.
    assert!(fx.serial.is_open("A"));
    terminals.shutdown();
}

#[test]
fn test_session_can_be_recreated_after_close() {
    let fx = Fixture::new(&["P1"]);
    open(&fx, "P1");
    let terminals = fx.terminals();

    let first = terminals.create_session("P1", "CRLF", false, 64).unwrap();
    terminals.close_session("P1").unwrap();
    let second = terminals.create_session("P1", "LF", false, 64).unwrap();
    assert!(second.created_at >= first.created_at);
    assert_eq!(second.config.line_ending, LineEnding::Lf);
}
