use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};

use common::expr::Expr;
use common::log_debug;

use crate::backends::SolverCommand;
use crate::error::BackendError;

/// The lowest layer of the solver protocol: a duplex byte stream to the
/// solver process plus the pending constraint set. Nothing above this layer
/// talks to the process directly.
///
/// The protocol is strictly request/response; exactly one query may be in
/// flight at a time.
pub trait Channel {
    /// Sends raw text, flushed immediately. The solver reads interactively,
    /// so buffering lag would deadlock the exchange.
    fn write(&mut self, text: &str) -> Result<(), BackendError>;

    /// Blocks for exactly one byte.
    fn read_byte(&mut self) -> Result<u8, BackendError>;

    fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Expr>, track: bool);

    fn constraints(&self) -> &[Expr];

    /// Blocks until exactly `n` bytes arrived.
    fn read_exact_len(&mut self, n: usize) -> Result<String, BackendError> {
        let mut buf = Vec::with_capacity(n);
        for _ in 0..n {
            buf.push(self.read_byte()?);
        }
        String::from_utf8(buf)
            .map_err(|e| BackendError::UnexpectedResponse(format!("non-UTF-8 output: {e}")))
    }

    /// Accumulates bytes one at a time until the delimiter appears, returning
    /// the buffer including it. Solver output length is not known in advance,
    /// so this is the framing mechanism for everything we read back.
    fn read_until(&mut self, delimiter: &str) -> Result<String, BackendError> {
        let delimiter = delimiter.as_bytes();
        let mut buf = Vec::new();
        while !buf.ends_with(delimiter) {
            buf.push(self.read_byte()?);
        }
        String::from_utf8(buf)
            .map_err(|e| BackendError::UnexpectedResponse(format!("non-UTF-8 output: {e}")))
    }

    fn read_line(&mut self) -> Result<String, BackendError> {
        self.read_until("\n")
    }

    /// One verdict line, trimmed.
    fn read_verdict(&mut self) -> Result<String, BackendError> {
        Ok(self.read_line()?.trim().to_string())
    }

    /// The model block following a `sat` verdict: everything up to the
    /// closing paren on its own line.
    fn read_model_block(&mut self) -> Result<String, BackendError> {
        Ok(self.read_until("\n)\n")?.trim().to_string())
    }

    /// Clears solver-side state without restarting the process.
    fn reset(&mut self) -> Result<(), BackendError> {
        self.write("(reset)\n")
    }
}

/// A channel over a spawned solver subprocess. Owns the process handle and
/// its pipes for its whole lifetime and reaps the child on drop, whatever
/// path the session exits through.
pub struct ProcessChannel {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    constraints: Vec<Expr>,
}

impl ProcessChannel {
    #[tracing::instrument(level = "debug", skip_all, fields(program = ?command.program))]
    pub fn spawn(command: &SolverCommand) -> Result<Self, BackendError> {
        log_debug!("Spawning solver process: {:?}", command);
        let mut child = command
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();
        Ok(Self {
            child,
            stdin,
            stdout,
            constraints: Vec::new(),
        })
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Channel for ProcessChannel {
    fn write(&mut self, text: &str) -> Result<(), BackendError> {
        self.stdin.write_all(text.as_bytes())?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, BackendError> {
        // read_exact turns EOF into an error, so a dead solver surfaces as
        // ChannelClosed instead of blocking forever on a closed pipe.
        let mut byte = [0u8; 1];
        self.stdout.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Expr>, _track: bool) {
        self.constraints.extend(constraints);
    }

    fn constraints(&self) -> &[Expr] {
        &self.constraints
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
