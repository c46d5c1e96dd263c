//! Console front end: stdin commands in, engine events out.

use std::io::{BufRead, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use nova_core::audio::device::{list_devices, DeviceInfo, Direction};
use nova_core::{Command, EngineEvent, EngineStatus};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

pub const HELP: &str = "commands: l = listen now, r = mic test, m = mute/unmute, q = quit";

/// Decode stdin lines into [`Command`]s until EOF, a read error, or the
/// engine hanging up.
pub fn spawn_command_reader<R>(input: R, tx: Sender<Command>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("nova-console".into())
        .spawn(move || read_commands(input, &tx))
}

fn read_commands<R: BufRead>(input: R, tx: &Sender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("console read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                let quit = command == Command::Shutdown;
                if tx.send(command).is_err() || quit {
                    break;
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }
    debug!("console reader finished");
}

/// Print every engine event as one JSON line on stdout until the channel closes.
pub fn spawn_event_printer(
    mut rx: broadcast::Receiver<EngineEvent>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("nova-events".into())
        .spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => {
                    if let EngineEvent::Status { status: EngineStatus::Listening, .. } = &event {
                        info!("say the wake word, or type a command ({})", HELP);
                    }
                    print_event(&event);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagging"),
                Err(RecvError::Closed) => break,
            }
        })
}

fn print_event(event: &EngineEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{} {json}", event.channel());
        }
        Err(e) => warn!("cannot serialize event: {e}"),
    }
}

pub fn device_table(devices: &[DeviceInfo]) -> String {
    let mut out = String::new();
    for d in devices {
        let mut tags = Vec::new();
        if d.is_default {
            tags.push("default");
        }
        if d.is_recommended {
            tags.push("recommended");
        }
        if d.is_loopback_like {
            tags.push("loopback");
        }
        let dir = match d.direction {
            Direction::Input => "in ",
            Direction::Output => "out",
        };
        if tags.is_empty() {
            out.push_str(&format!("{dir}  {}\n", d.name));
        } else {
            out.push_str(&format!("{dir}  {}  [{}]\n", d.name, tags.join(", ")));
        }
    }
    out
}

pub fn print_devices() {
    let mut devices = list_devices(Direction::Input);
    devices.extend(list_devices(Direction::Output));
    if devices.is_empty() {
        println!("no audio devices found");
    } else {
        print!("{}", device_table(&devices));
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reader_skips_garbage_and_stops_after_quit() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let input = Cursor::new("l\n\nbogus\nM\nq\nl\n");
        read_commands(input, &tx);
        drop(tx);

        let got: Vec<Command> = rx.iter().collect();
        assert_eq!(got, vec![Command::Listen, Command::ToggleMute, Command::Shutdown]);
    }

    #[test]
    fn device_table_tags_devices() {
        let devices = vec![
            DeviceInfo {
                name: "USB Microphone".into(),
                direction: Direction::Input,
                is_default: false,
                is_loopback_like: false,
                is_recommended: true,
            },
            DeviceInfo {
                name: "Speakers".into(),
                direction: Direction::Output,
                is_default: true,
                is_loopback_like: false,
                is_recommended: true,
            },
        ];
        let table = device_table(&devices);
        assert!(table.contains("in   USB Microphone  [recommended]"));
        assert!(table.contains("out  Speakers  [default, recommended]"));
    }
}
