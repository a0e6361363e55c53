use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc::{self, UnboundedReceiver};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Quit,
    RestartCo2,
    MeasureNow,
}

pub fn command_for(key: KeyEvent) -> Option<Command> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Char('r') => Some(Command::RestartCo2),
        KeyCode::Char('u') => Some(Command::MeasureNow),
        _ => None,
    }
}

/// Reads the terminal on its own thread, the node loop only sees [Command]s.
pub fn commands() -> UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || loop {
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => {}
            Ok(false) => {
                if tx.is_closed() {
                    break;
                }
                continue;
            }
            Err(e) => {
                log::error!("cannot poll the terminal: {}", e);
                break;
            }
        }
        if let Ok(CEvent::Key(key)) = event::read() {
            if let Some(command) = command_for(key) {
                if tx.send(command).is_err() {
                    break;
                }
            }
        }
    });
    rx
}
