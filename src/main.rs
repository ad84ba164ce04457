//! Stdio worker process: newline-delimited JSON commands in on stdin,
//! newline-delimited JSON events out on stdout.

use std::io::{self, BufRead, Write};

use crossbeam_channel::unbounded;
use roomverb::worker::{Command, Event, Worker};

fn main() {
    env_logger::init();

    let (command_tx, command_rx) = unbounded::<Command>();
    let (event_tx, event_rx) = unbounded::<Event>();

    // stdin reader: parse failures become error events, everything else is
    // forwarded to the worker
    let parse_events = event_tx.clone();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(line) {
                Ok(command) => {
                    let terminate = matches!(command, Command::Terminate);
                    if command_tx.send(command).is_err() || terminate {
                        break;
                    }
                }
                Err(e) => {
                    let _ = parse_events.send(Event::Error {
                        error: format!("unrecognized message: {e}"),
                    });
                }
            }
        }
    });

    let worker = std::thread::spawn(move || {
        Worker::run(command_rx, move |event| {
            let _ = event_tx.send(event);
        })
    });

    let stdout = io::stdout();
    for event in event_rx {
        if let Ok(json) = serde_json::to_string(&event) {
            let mut out = stdout.lock();
            let _ = writeln!(out, "{json}");
            let _ = out.flush();
        }
    }
    let _ = worker.join();
}
