#![cfg(unix)]

use tethersolver::{BackendError, Channel, ProcessChannel, SolverCommand};

// `cat` echoes everything back, which is all the framing layer needs.
fn echo_channel() -> ProcessChannel {
    let command = SolverCommand::new("cat", Vec::new());
    ProcessChannel::spawn(&command).expect("Failed to spawn cat")
}

#[test]
fn line_round_trip() {
    let mut channel = echo_channel();
    channel.write("hello solver\n").unwrap();
    assert_eq!(channel.read_line().unwrap(), "hello solver\n");

    channel.write("sat\n").unwrap();
    assert_eq!(channel.read_verdict().unwrap(), "sat");
    assert!(channel.is_alive());
}

#[test]
fn exact_length_read() {
    let mut channel = echo_channel();
    channel.write("hello\n").unwrap();
    assert_eq!(channel.read_exact_len(5).unwrap(), "hello");
    assert_eq!(channel.read_line().unwrap(), "\n");
}

#[test]
fn reset_sends_the_reset_command() {
    let mut channel = echo_channel();
    channel.reset().unwrap();
    assert_eq!(channel.read_line().unwrap(), "(reset)\n");
}

#[test]
fn model_block_framing_stops_at_the_closing_paren_line() {
    let mut channel = echo_channel();
    channel.write("(\n(x #x05)\n)\ntrailing\n").unwrap();

    let block = channel.read_model_block().unwrap();
    assert_eq!(block, "(\n(x #x05)\n)");

    // The trailing line is still in the stream, untouched by the framing.
    assert_eq!(channel.read_line().unwrap(), "trailing\n");
}

#[test]
fn dead_process_reports_channel_closed() {
    let command = SolverCommand::new("true", Vec::new());
    let mut channel = ProcessChannel::spawn(&command).expect("Failed to spawn");

    match channel.read_byte() {
        Err(BackendError::ChannelClosed(_)) => {}
        other => panic!("Expected ChannelClosed, got {:?}", other),
    }
}
