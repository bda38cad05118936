use std::io::{self, BufRead, Write};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::error::PolymixError;

/// Asks the operator for config values that were not supplied.
pub trait Prompt {
    fn ask(&mut self, label: &str) -> Result<String, PolymixError>;

    /// Like `ask`, without echoing the answer.
    fn ask_secret(&mut self, label: &str) -> Result<String, PolymixError>;
}

pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&mut self, label: &str) -> Result<String, PolymixError> {
        let mut stdout = io::stdout();
        write!(stdout, "{label}: ").map_err(prompt_error)?;
        stdout.flush().map_err(prompt_error)?;

        let mut answer = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(prompt_error)?;
        if read == 0 {
            return Err(PolymixError::Prompt("input closed".to_string()));
        }
        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }

    fn ask_secret(&mut self, label: &str) -> Result<String, PolymixError> {
        let mut stdout = io::stdout();
        write!(stdout, "{label}: ").map_err(prompt_error)?;
        stdout.flush().map_err(prompt_error)?;

        enable_raw_mode().map_err(prompt_error)?;
        let secret = read_secret();
        disable_raw_mode().map_err(prompt_error)?;
        writeln!(stdout).map_err(prompt_error)?;
        secret
    }
}

fn read_secret() -> Result<String, PolymixError> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read().map_err(prompt_error)? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Esc => return Err(PolymixError::Prompt("cancelled".to_string())),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(PolymixError::Prompt("cancelled".to_string()));
            }
            KeyCode::Char(ch) => secret.push(ch),
            KeyCode::Backspace => {
                secret.pop();
            }
            _ => {}
        }
    }
}

fn prompt_error(err: io::Error) -> PolymixError {
    PolymixError::Prompt(err.to_string())
}
