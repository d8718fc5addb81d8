use std::io::{BufRead, Write};

use log::{debug, warn};

use crate::common::{DbError, Key, Result};
use crate::engine::Engine;

use super::Command;

/// How a dispatcher run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A `q` command was read
    Quit,
    /// Input ended without `q`
    EndOfInput,
}

/// Reads commands line by line, applies them to the engine and writes the
/// responses.
///
/// Responses go to `output` and are flushed one by one, since the driving
/// process waits for each answer before sending the next line. Recoverable
/// errors become a line on `diagnostics`; fatal ones end the run.
pub struct Dispatcher<'a, R, W, E> {
    engine: &'a mut Engine,
    input: R,
    output: W,
    diagnostics: E,
    line_no: usize,
}

impl<'a, R: BufRead, W: Write, E: Write> Dispatcher<'a, R, W, E> {
    pub fn new(engine: &'a mut Engine, input: R, output: W, diagnostics: E) -> Self {
        Self {
            engine,
            input,
            output,
            diagnostics,
            line_no: 0,
        }
    }

    /// Processes lines until `q` or end of input.
    pub fn run(&mut self) -> Result<Outcome> {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if self.input.read_until(b'\n', &mut buf)? == 0 {
                debug!("end of input after {} lines", self.line_no);
                return Ok(Outcome::EndOfInput);
            }
            self.line_no += 1;

            let command = std::str::from_utf8(&buf)
                .map_err(|_| DbError::Parse("line is not valid UTF-8".to_string()))
                .and_then(|line| {
                    if line.trim().is_empty() {
                        Ok(None)
                    } else {
                        Command::parse(line).map(Some)
                    }
                });

            let result = match command {
                Ok(Some(Command::Quit)) => return Ok(Outcome::Quit),
                Ok(Some(command)) => self.execute(command),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                self.report(e)?;
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Insert { key, value } => self.engine.insert(key, &value),
            Command::Delete { key } => self.engine.delete(key),
            Command::Find { key } => {
                let value = self.engine.find(key)?;
                self.respond_find(key, value.as_deref())
            }
            Command::Range { lo, hi } => {
                for (key, value) in self.engine.range(lo, hi)? {
                    write_record(&mut self.output, key, &value)?;
                }
                self.output.flush()?;
                Ok(())
            }
            Command::Quit => Ok(()),
        }
    }

    fn respond_find(&mut self, key: Key, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => write_record(&mut self.output, key, value)?,
            None => writeln!(self.output, "Record not found under key {}.", key)?,
        }
        self.output.flush()?;
        Ok(())
    }

    /// Writes a recoverable error to the diagnostics stream, or hands a
    /// fatal one back to the caller.
    fn report(&mut self, e: DbError) -> Result<()> {
        if e.is_fatal() {
            return Err(e);
        }

        match e {
            DbError::Parse(_) => warn!("line {}: {}", self.line_no, e),
            _ => debug!("line {}: {}", self.line_no, e),
        }
        writeln!(self.diagnostics, "line {}: {}", self.line_no, e)?;
        self.diagnostics.flush()?;
        Ok(())
    }
}

fn write_record<W: Write>(output: &mut W, key: Key, value: &str) -> Result<()> {
    writeln!(output, "key {}, value [{}].", key, value)?;
    Ok(())
}
