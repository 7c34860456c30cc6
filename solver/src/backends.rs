use std::path::PathBuf;
use std::process::Command;

/// Command-line recipe for a concrete solver process. The bridge does not
/// probe installations or parse versions; callers pick a preset (or build
/// their own) and own the consequences of a missing binary.
#[derive(Debug, Clone)]
pub struct SolverCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl SolverCommand {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Z3 reading SMT-LIB from stdin. The timeout is taken in milliseconds
    /// and converted to Z3's soft-timeout unit (seconds).
    pub fn z3(timeout_ms: Option<u64>) -> Self {
        let mut args = vec!["-smt2".to_string(), "-in".to_string()];
        if let Some(ms) = timeout_ms {
            args.push(format!("-t:{}", ms / 1000));
        }
        Self::new("z3", args)
    }

    /// cvc5 in interactive SMT-LIB mode. Its time limit is in milliseconds
    /// already.
    pub fn cvc5(timeout_ms: Option<u64>) -> Self {
        let mut args = vec!["--lang=smt2".to_string(), "--produce-models".to_string()];
        if let Some(ms) = timeout_ms {
            args.push(format!("--tlimit={ms}"));
        }
        Self::new("cvc5", args)
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}
