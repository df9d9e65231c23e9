//! The interactive command loop. Strictly sequential: it blocks on operator
//! input between actions and is the only actor that issues waiting requests,
//! which is what makes the correlation-free reply queue sound.

use std::io::{self, Write};

use tethercast_foundation::StreamError;
use tethercast_stream::worker::MANUAL_FOCUS_DRIVE;
use tethercast_stream::{Command, ControlHandle, Facet, Outcome, SettingFacet};

use crate::focus::{order_steps, FocusStep};

const MENU: &str = "\
tethercast
  1) start autofocus
  2) cancel autofocus
  3) manual focus
  4) aperture
  5) shutter speed
  6) iso
  7) raw setting (name:value)
  8) restart capture
  q) quit";

pub struct Dispatcher {
    control: ControlHandle,
}

impl Dispatcher {
    pub fn new(control: ControlHandle) -> Self {
        Self { control }
    }

    /// Run the menu until the operator quits or stdin closes.
    pub fn run(&mut self) -> Result<(), StreamError> {
        loop {
            println!("\n{}", MENU);
            let Some(choice) = prompt("> ")? else {
                return Ok(());
            };
            match choice.as_str() {
                "1" => self.control.send(Command::AutofocusStart)?,
                "2" => self.control.send(Command::AutofocusCancel)?,
                "3" => self.manual_focus()?,
                "4" => self.adjust_setting("aperture")?,
                "5" => self.adjust_setting("shutterspeed")?,
                "6" => self.adjust_setting("iso")?,
                "7" => self.raw_setting()?,
                "8" => self.restart_capture()?,
                "q" | "0" => return Ok(()),
                "" => {}
                other => println!("unknown choice: {}", other),
            }
        }
    }

    fn get_facet(&self, name: &str, facet: Facet) -> Result<SettingFacet, StreamError> {
        let outcome = self.control.request(Command::GetSetting {
            name: name.to_string(),
            facet: Some(facet),
        })?;
        match outcome {
            Outcome::Value(value) => Ok(value),
            other => {
                // The worker died mid-request and its final outcome answered
                // us instead. Degrade to an empty reply; the supervisor is
                // already dealing with the worker.
                tracing::warn!(?other, "worker went away during a setting query");
                Ok(match facet {
                    Facet::Current => SettingFacet::Current(String::new()),
                    Facet::Choices => SettingFacet::Choices(Vec::new()),
                })
            }
        }
    }

    fn choices_of(&self, name: &str) -> Result<Vec<String>, StreamError> {
        match self.get_facet(name, Facet::Choices)? {
            SettingFacet::Choices(choices) => Ok(choices),
            _ => Ok(Vec::new()),
        }
    }

    fn current_of(&self, name: &str) -> Result<String, StreamError> {
        match self.get_facet(name, Facet::Current)? {
            SettingFacet::Current(current) => Ok(current),
            _ => Ok(String::new()),
        }
    }

    fn manual_focus(&mut self) -> Result<(), StreamError> {
        let steps = order_steps(&self.choices_of(MANUAL_FOCUS_DRIVE)?);
        if steps.is_empty() {
            println!("manual focus is not available on this camera");
            return Ok(());
        }
        // Start from the neutral step; afterwards the last choice is the default.
        let mut default = steps.iter().position(|s| s.offset == 0).unwrap_or(0);
        loop {
            print_steps(&steps, default);
            let Some(line) = prompt("step (empty repeats default, b goes back) > ")? else {
                return Ok(());
            };
            let index = match line.as_str() {
                "b" => return Ok(()),
                "" => default,
                n => match n.parse::<usize>() {
                    Ok(i) if i < steps.len() => i,
                    _ => {
                        println!("pick 0..{}", steps.len() - 1);
                        continue;
                    }
                },
            };
            self.control
                .send(Command::FocusStep(steps[index].raw.clone()))?;
            default = index;
        }
    }

    fn adjust_setting(&mut self, name: &str) -> Result<(), StreamError> {
        loop {
            let choices = self.choices_of(name)?;
            if choices.is_empty() {
                println!("{} is not adjustable on this camera", name);
                return Ok(());
            }
            // Re-read the live value each pass; it changes under us whenever
            // the operator turns a dial on the body.
            let current = self.current_of(name)?;
            println!("\n{} (current: {})", name, current);
            for (i, choice) in choices.iter().enumerate() {
                let marker = if *choice == current { "*" } else { " " };
                println!(" {}{:>3}) {}", marker, i, choice);
            }
            let Some(line) = prompt("value (empty goes back) > ")? else {
                return Ok(());
            };
            if line.is_empty() {
                return Ok(());
            }
            let Ok(index) = line.parse::<usize>() else {
                println!("pick 0..{}", choices.len() - 1);
                continue;
            };
            let Some(value) = choices.get(index) else {
                println!("pick 0..{}", choices.len() - 1);
                continue;
            };
            if *value != current {
                self.control
                    .send(Command::UpdateSetting(format!("{}:{}", name, value)))?;
            }
        }
    }

    fn raw_setting(&mut self) -> Result<(), StreamError> {
        let Some(line) = prompt("setting name:value (empty cancels) > ")? else {
            return Ok(());
        };
        if line.is_empty() {
            return Ok(());
        }
        self.control.send(Command::UpdateSetting(line))
    }

    fn restart_capture(&mut self) -> Result<(), StreamError> {
        match self.control.request(Command::Shutdown)? {
            Outcome::Done => println!("capture restarting"),
            other => tracing::warn!(?other, "unexpected reply to shutdown"),
        }
        Ok(())
    }
}

fn print_steps(steps: &[FocusStep], default: usize) {
    println!();
    for (i, step) in steps.iter().enumerate() {
        let marker = if i == default { "*" } else { " " };
        println!(" {}{:>3}) {}", marker, i, step.label);
    }
}

/// Prompt on stdout, read one trimmed line. `None` means stdin closed.
fn prompt(text: &str) -> Result<Option<String>, StreamError> {
    print!("{}", text);
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin().read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
