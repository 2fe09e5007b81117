#![deny(unsafe_code)]

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;

use anyhow::Context;
use bytes::BytesMut;
use clap::Parser;
use log::{debug, info, trace, warn};
use rustix::event::{poll, PollFd, PollFlags};
use rustix::io::Errno;
use x11_selection_bridge::agent::decode_frame;
use x11_selection_bridge::common::initialize;
use x11_selection_bridge::x11::X11Display;
use x11_selection_bridge::Bridge;
use x11_selection_bridge_tools::options::Options;

const READ_SIZE: usize = 64 * 1024;

/// Sends everything the bridge has queued for the agent.
fn flush_messages(bridge: &mut Bridge<X11Display>, stream: &mut UnixStream) -> anyhow::Result<()> {
    let messages = bridge.take_messages();
    if messages.is_empty() {
        return Ok(());
    }

    let mut buf = BytesMut::new();
    for message in &messages {
        message.encode(&mut buf);
    }
    trace!("Sending {} messages, {} bytes", messages.len(), buf.len());

    stream
        .write_all(&buf)
        .context("Error writing to the agent socket")
}

/// Reads what the agent sent and handles every complete request.
///
/// Returns `false` once the agent closed the connection.
fn read_requests(
    bridge: &mut Bridge<X11Display>,
    stream: &mut UnixStream,
    incoming: &mut BytesMut,
) -> anyhow::Result<bool> {
    let mut chunk = [0; READ_SIZE];
    let count = match stream.read(&mut chunk) {
        Ok(0) => return Ok(false),
        Ok(count) => count,
        Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(true),
        Err(err) => return Err(err).context("Error reading from the agent socket"),
    };
    incoming.extend_from_slice(&chunk[..count]);

    loop {
        match decode_frame(incoming) {
            Ok(Some(request)) => bridge.handle_agent_request(request)?,
            Ok(None) => break,
            Err(err) => warn!("Dropping agent message: {}", err),
        }
    }

    Ok(true)
}

fn main() -> Result<(), anyhow::Error> {
    // Parse command-line options.
    let options = Options::parse();

    stderrlog::new()
        .verbosity(usize::from(options.verbose) + 1)
        .init()
        .context("Error initializing logging")?;

    let mut stream = UnixStream::connect(&options.socket)
        .with_context(|| format!("Error connecting to {}", options.socket.display()))?;

    let display = initialize(options.display.as_deref()).context("Error connecting to X11")?;
    let mut bridge = Bridge::new(display)?;
    info!("Bridging selections to {}", options.socket.display());

    // Report the initial resolution.
    flush_messages(&mut bridge, &mut stream)?;

    let mut incoming = BytesMut::with_capacity(READ_SIZE);
    loop {
        let (x11_ready, agent_ready) = {
            let mut fds = [
                PollFd::new(bridge.display(), PollFlags::IN),
                PollFd::new(&stream, PollFlags::IN),
            ];
            match poll(&mut fds, -1) {
                Ok(_) => {}
                Err(Errno::INTR) => continue,
                Err(err) => return Err(err).context("Error polling"),
            }
            (!fds[0].revents().is_empty(), !fds[1].revents().is_empty())
        };

        if x11_ready {
            bridge.dispatch()?;
        }

        if agent_ready && !read_requests(&mut bridge, &mut stream, &mut incoming)? {
            debug!("Agent closed the connection");
            break;
        }

        flush_messages(&mut bridge, &mut stream)?;
    }

    bridge.shutdown()?;
    Ok(())
}
