//! Interactive shell
//!
//! One shell run is one process session: it starts locked and every unlock
//! lasts until `lock` or exit.

use std::io::Write;

use strongbox_core::{AccessGate, GateError, GateStatus, OpenOutcome};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use zeroize::Zeroizing;

const HELP: &str = "\
commands:
  status                         show lock state
  list                           list resources and protection
  refresh                        re-read the resource list
  unlock [<pin>]                 unlock with PIN (prompted when omitted)
  bio                            unlock with biometrics
  lock                           lock the session
  open <id>                      launch a resource
  protect <id> | unprotect <id>  change protection
  biometric on|off|toggle        automatic biometric unlock
  set-pin [<pin> <confirm>]      set the PIN (first run, or while unlocked)
  change-pin [<old> <new> <confirm>]
                                 PINs containing spaces must be entered
                                 at the prompts
  quit";

/// A parsed shell line
#[derive(Debug, PartialEq, Eq)]
pub enum ShellCommand<'a> {
    Help,
    Status,
    List,
    Refresh,
    Unlock(&'a str),
    UnlockPrompt,
    Biometric,
    Lock,
    Open(&'a str),
    Protect(&'a str, bool),
    SetBiometric(Option<bool>),
    SetPin(&'a str, &'a str),
    SetPinPrompt,
    ChangePin(&'a str, &'a str, &'a str),
    ChangePinPrompt,
    Quit,
    Empty,
    Unknown(String),
}

impl<'a> ShellCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words[..] {
            [] => Self::Empty,
            ["help"] | ["?"] => Self::Help,
            ["status"] => Self::Status,
            ["list"] | ["ls"] => Self::List,
            ["refresh"] => Self::Refresh,
            ["unlock"] => Self::UnlockPrompt,
            ["unlock", pin] => Self::Unlock(pin),
            ["bio"] => Self::Biometric,
            ["lock"] => Self::Lock,
            ["open", id] => Self::Open(id),
            ["protect", id] => Self::Protect(id, true),
            ["unprotect", id] => Self::Protect(id, false),
            ["biometric", "on"] => Self::SetBiometric(Some(true)),
            ["biometric", "off"] => Self::SetBiometric(Some(false)),
            ["biometric", "toggle"] => Self::SetBiometric(None),
            ["set-pin"] => Self::SetPinPrompt,
            ["set-pin", pin, confirm] => Self::SetPin(pin, confirm),
            ["change-pin"] => Self::ChangePinPrompt,
            ["change-pin", old, pin, confirm] => Self::ChangePin(old, pin, confirm),
            ["quit"] | ["exit"] => Self::Quit,
            [cmd, ..] => Self::Unknown(cmd.to_string()),
        }
    }

    /// Commands accepted before a PIN exists
    fn allowed_during_setup(&self) -> bool {
        matches!(
            self,
            Self::Help
                | Self::Status
                | Self::SetPin(..)
                | Self::SetPinPrompt
                | Self::Quit
                | Self::Empty
        )
    }
}

/// Read commands from `input` until EOF or `quit`
pub async fn run<R, W>(gate: &AccessGate, input: R, out: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if gate.status()? == GateStatus::SetupRequired {
        writeln!(out, "No PIN set. Create one with: set-pin <pin> <confirm>")?;
    }

    let mut lines = input.lines();
    loop {
        write!(out, "strongbox> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = Zeroizing::new(line);
        let command = ShellCommand::parse(&line);

        if command == ShellCommand::Quit {
            break;
        }

        if gate.status()? == GateStatus::SetupRequired && !command.allowed_during_setup() {
            writeln!(out, "Set a PIN first: set-pin <pin> <confirm>")?;
            continue;
        }

        let result = match command {
            ShellCommand::UnlockPrompt => {
                let pin = read_secret(&mut lines, out, "PIN: ").await?;
                execute(gate, ShellCommand::Unlock(&pin), out).await
            }
            ShellCommand::SetPinPrompt => {
                let pin = read_secret(&mut lines, out, "New PIN: ").await?;
                let confirm = read_secret(&mut lines, out, "Confirm PIN: ").await?;
                execute(gate, ShellCommand::SetPin(&pin, &confirm), out).await
            }
            ShellCommand::ChangePinPrompt => {
                let old = read_secret(&mut lines, out, "Current PIN: ").await?;
                let pin = read_secret(&mut lines, out, "New PIN: ").await?;
                let confirm = read_secret(&mut lines, out, "Confirm PIN: ").await?;
                execute(gate, ShellCommand::ChangePin(&old, &pin, &confirm), out).await
            }
            command => execute(gate, command, out).await,
        };

        if let Err(e) = result {
            match e.downcast_ref::<GateError>() {
                Some(gate_error) if gate_error.is_retryable() => {
                    writeln!(out, "error: {} - try again", gate_error)?
                }
                _ => writeln!(out, "error: {}", e)?,
            }
        }
    }

    Ok(())
}

/// Read one whole line as a secret; surrounding spaces are kept
async fn read_secret<R, W>(
    lines: &mut Lines<R>,
    out: &mut W,
    label: &str,
) -> anyhow::Result<Zeroizing<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{}", label)?;
    out.flush()?;
    Ok(Zeroizing::new(lines.next_line().await?.unwrap_or_default()))
}

async fn execute<W: Write>(gate: &AccessGate, command: ShellCommand<'_>, out: &mut W) -> anyhow::Result<()> {
    match command {
        ShellCommand::Help => writeln!(out, "{}", HELP)?,
        ShellCommand::Status => print_status(gate, out)?,
        ShellCommand::List => print_resources(gate, out)?,
        ShellCommand::Refresh => {
            let count = gate.refresh_resources()?.len();
            writeln!(out, "{} resources", count)?;
        }
        ShellCommand::Unlock(pin) => match gate.unlock_with_pin(pin) {
            Ok(()) => writeln!(out, "Unlocked")?,
            Err(e @ GateError::Auth(_)) => writeln!(out, "{}", e)?,
            Err(e) => return Err(e.into()),
        },
        ShellCommand::Biometric => match gate.unlock_with_biometric().await {
            Ok(()) => writeln!(out, "Unlocked")?,
            Err(e @ GateError::Auth(_)) => writeln!(out, "{} - use 'unlock <pin>'", e)?,
            Err(e) => return Err(e.into()),
        },
        ShellCommand::Lock => {
            gate.lock();
            writeln!(out, "Locked")?;
        }
        ShellCommand::Open(id) => match gate.open(id)? {
            OpenOutcome::Launched => writeln!(out, "Opened {}", id)?,
            OpenOutcome::Denied => writeln!(out, "{} is protected - unlock first", id)?,
            OpenOutcome::NotFound => writeln!(out, "Could not open {}", id)?,
        },
        ShellCommand::Protect(_, false) if !gate.session_state().is_unlocked() => {
            writeln!(out, "Unlock before removing protection")?;
        }
        ShellCommand::Protect(id, protect) => {
            gate.set_protected(id, protect)?;
            let state = if protect { "protected" } else { "unprotected" };
            writeln!(out, "{} {}", id, state)?;
        }
        ShellCommand::SetBiometric(value) => {
            let enabled = match value {
                Some(enabled) => {
                    gate.set_biometric_enabled(enabled)?;
                    enabled
                }
                None => gate.toggle_biometric()?,
            };
            writeln!(out, "Biometric unlock {}", if enabled { "on" } else { "off" })?;
        }
        ShellCommand::SetPin(pin, confirm) => {
            gate.set_credential(pin, confirm)?;
            writeln!(out, "PIN set")?;
        }
        ShellCommand::ChangePin(old, pin, confirm) => {
            gate.change_credential(old, pin, confirm)?;
            writeln!(out, "PIN changed")?;
        }
        ShellCommand::Unknown(cmd) => writeln!(out, "unknown command '{}', try 'help'", cmd)?,
        ShellCommand::UnlockPrompt | ShellCommand::SetPinPrompt | ShellCommand::ChangePinPrompt => {
            writeln!(out, "{}", HELP)?
        }
        ShellCommand::Quit | ShellCommand::Empty => {}
    }
    Ok(())
}

/// Print the gate status block
pub fn print_status<W: Write>(gate: &AccessGate, out: &mut W) -> anyhow::Result<()> {
    writeln!(out, "Status: {}", gate.status()?)?;
    writeln!(
        out,
        "Biometric unlock: {} ({})",
        if gate.is_biometric_enabled()? { "on" } else { "off" },
        if gate.biometric_available() {
            "available"
        } else {
            "unavailable"
        }
    )?;
    Ok(())
}

/// Print every known resource with its protection flag
pub fn print_resources<W: Write>(gate: &AccessGate, out: &mut W) -> anyhow::Result<()> {
    let entries = gate.resource_entries()?;
    if entries.is_empty() {
        writeln!(out, "No resources configured")?;
    }
    for entry in entries {
        let marker = if entry.protected { "[x]" } else { "[ ]" };
        writeln!(out, "{} {:<24} {}", marker, entry.info.label, entry.info.id)?;
    }
    Ok(())
}
