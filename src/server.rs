use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    process,
    sync::Arc,
    thread,
};

use anyhow::Result;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    error::SpaceError,
    instance::{Instance, Outcome},
    protocol::{read_frame, write_frame, Frame, Reply, Request, RequestType},
};

/// Reply code for failures that are not the client's fault, such as a
/// write-ahead log I/O error.
pub const INTERNAL_ERROR_CODE: u32 = 0x0002;

pub fn server_start(config: &Config) -> Result<()> {
    let instance = Arc::new(Instance::from_config(config)?);
    let listener = TcpListener::bind(&config.listen_addr)?;
    info!(addr = %config.listen_addr, "tupledb server started");
    handle_signals(instance.clone())?;
    serve(listener, instance)
}

pub fn serve(listener: TcpListener, instance: Arc<Instance>) -> Result<()> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let instance = instance.clone();
                thread::spawn(move || {
                    let peer = stream.peer_addr().ok();
                    debug!(?peer, "connection opened");
                    match handle_connection(stream, &instance) {
                        Ok(()) => debug!(?peer, "connection closed"),
                        Err(e) => warn!(?peer, error = %e, "connection closed with error"),
                    }
                });
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
    Ok(())
}

/// Flushes the write-ahead log and exits on SIGINT or SIGTERM.
fn handle_signals(instance: Arc<Instance>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "shutting down");
            if let Err(e) = instance.shutdown() {
                error!(error = %e, "shutdown failed");
                process::exit(1);
            }
            process::exit(0);
        }
    });
    Ok(())
}

fn handle_connection(mut stream: TcpStream, instance: &Instance) -> Result<()> {
    stream.set_nodelay(true)?;
    serve_stream(&mut stream, instance)
}

/// Answers frames until the peer hangs up.
pub fn serve_stream<S: Read + Write>(stream: &mut S, instance: &Instance) -> Result<()> {
    while let Some(frame) = read_frame(stream)? {
        let reply = handle_frame(instance, &frame);
        write_frame(
            stream,
            &Frame {
                request_type: frame.request_type,
                request_id: frame.request_id,
                body: reply.serialize(),
            },
        )?;
    }
    Ok(())
}

pub fn handle_frame(instance: &Instance, frame: &Frame) -> Reply {
    match execute(instance, frame) {
        Ok(outcome) => Reply::Ok {
            count: outcome.count,
            tuples: outcome.tuples,
        },
        Err(e) => {
            let code = match e.downcast_ref::<SpaceError>() {
                Some(space_error) => {
                    debug!(request_id = frame.request_id.0, error = %space_error, "request failed");
                    space_error.code()
                }
                None => {
                    error!(request_id = frame.request_id.0, error = %e, "request failed");
                    INTERNAL_ERROR_CODE
                }
            };
            Reply::Error {
                code,
                message: e.to_string(),
            }
        }
    }
}

fn execute(instance: &Instance, frame: &Frame) -> Result<Outcome> {
    let request_type =
        RequestType::try_from(frame.request_type).map_err(SpaceError::UnknownRequest)?;
    let request = Request::deserialize(request_type, &frame.body).map_err(SpaceError::from)?;
    match request {
        Request::Replace {
            space_id,
            flags,
            tuple,
        } => instance.replace(space_id, tuple, flags),
        Request::Select {
            space_id,
            index_no,
            offset,
            limit,
            keys,
        } => instance.select(space_id, index_no, &keys, offset, limit),
        Request::Update {
            space_id,
            flags,
            key,
            op_count,
            ops,
        } => instance.update(space_id, &key, &ops, op_count, flags),
        Request::Delete {
            space_id,
            flags,
            key,
        } => instance.delete(space_id, &key, flags),
        Request::Ping => Ok(Outcome::default()),
    }
}
