use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use common::expr::{free_symbols_of, Expr, Sort, Value};
use tethersolver::{
    MinimizingOracle, MutationSampler, ProcessChannel, QueryResult, Sample, SamplerParams,
    SmtSession, SolverCommand,
};

const LOG_ENV: &str = "TETHER_LOG";
const CONFIG_FILE: &str = "tether";
const ENV_PREFIX: &str = "TETHER";

#[derive(Parser, Debug)]
#[command(name = "tethersolver")]
#[command(version = "0.2.0")]
#[command(about = "Tether SMT bridge - runs constraints from JSONL files against an external solver")]
struct Args {
    /// Input JSONL file with constraints, one serialized expression per line
    #[arg(short, long, default_value = "constraints.jsonl")]
    input: PathBuf,
    /// Output JSON file with results
    #[arg(short, long, default_value = "solver_result.json")]
    output: PathBuf,
    /// Solver backend to spawn
    #[arg(long, default_value = "z3")]
    solver: SolverKind,
    /// Soft timeout handed to the solver, in milliseconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Enumerate distinct values of this symbol instead of a single model
    #[arg(long, conflicts_with = "sample")]
    eval: Option<String>,
    /// Sample values of this symbol through the mutation search
    #[arg(long)]
    sample: Option<String>,
    /// Number of values to enumerate or sample
    #[arg(long, default_value_t = 10)]
    count: usize,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum SolverKind {
    Z3,
    Cvc5,
}

/// What ends up in the output file.
#[derive(Debug, Serialize)]
struct SolverOutput {
    result: String, // "sat" or "unsat"
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<Value>>,
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
    let env_filter = EnvFilter::builder().parse_lossy(&std::env::var(LOG_ENV).unwrap_or_default());

    let fmt_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let constraints = read_constraints(&args.input)?;
    println!(
        "Loaded {} constraints from {}",
        constraints.len(),
        args.input.display()
    );

    let command = match args.solver {
        SolverKind::Z3 => SolverCommand::z3(args.timeout),
        SolverKind::Cvc5 => SolverCommand::cvc5(args.timeout),
    };
    let channel = ProcessChannel::spawn(&command)?;
    let mut session = SmtSession::new(channel);
    session.add_constraints(constraints.iter().cloned(), false);

    let output = if let Some(name) = &args.eval {
        let target = symbol_expr(&constraints, name)?;
        let values = session.eval(&target, args.count, &[])?;
        SolverOutput {
            result: verdict_for(!values.is_empty()),
            model: None,
            values: Some(values),
        }
    } else if let Some(name) = &args.sample {
        let target = symbol_expr(&constraints, name)?;
        let width = target.size();
        let params = load_sampler_params()?;
        let sampler = MutationSampler::new(
            MinimizingOracle::new(session, &target),
            width,
            params,
            StdRng::from_entropy(),
        );

        let mut values = Vec::new();
        for step in sampler {
            if let Sample::Value(bits) = step? {
                values.push(Value::bv(width, bits));
                if values.len() >= args.count {
                    break;
                }
            }
        }
        SolverOutput {
            result: verdict_for(!values.is_empty()),
            model: None,
            values: Some(values),
        }
    } else {
        match session.get_model(&[])? {
            QueryResult::Sat(model) => SolverOutput {
                result: verdict_for(true),
                model: Some(model),
                values: None,
            },
            QueryResult::Unsat(_) => SolverOutput {
                result: verdict_for(false),
                model: None,
                values: None,
            },
        }
    };

    write_result(&args.output, &output)?;

    match output.result.as_str() {
        "sat" => println!(
            "✓ SAT - Results written to {}",
            args.output.display()
        ),
        "unsat" => println!("✗ UNSAT - No solution exists"),
        _ => unreachable!("Unexpected result: {}", output.result),
    }

    Ok(())
}

fn verdict_for(satisfiable: bool) -> String {
    let verdict = if satisfiable { "sat" } else { "unsat" };
    verdict.to_string()
}

fn read_constraints(filename: &Path) -> Result<Vec<Expr>, Box<dyn std::error::Error>> {
    if !filename.exists() {
        return Err(format!("Input file '{}' not found", filename.display()).into());
    }

    let file = File::open(filename)?;
    let reader = BufReader::new(file);
    let mut constraints = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let constraint: Expr = match serde_json::from_str(&line) {
            Ok(expr) => expr,
            Err(e) => {
                return Err(format!("Error parsing line {}: {}", line_num + 1, e).into());
            }
        };
        if constraint.sort() != Sort::Bool {
            return Err(format!(
                "Constraint on line {} is not boolean",
                line_num + 1
            )
            .into());
        }
        constraints.push(constraint);
    }

    Ok(constraints)
}

/// Looks the symbol up among the constraints' free symbols so the target
/// carries the right sort.
fn symbol_expr(constraints: &[Expr], name: &str) -> Result<Expr, Box<dyn std::error::Error>> {
    free_symbols_of(constraints.iter())
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(name, sort)| Expr::Symbol { name, sort })
        .ok_or_else(|| format!("Symbol '{}' does not occur in the constraints", name).into())
}

fn load_sampler_params() -> Result<SamplerParams, Box<dyn std::error::Error>> {
    let raw = common::config::load_config(CONFIG_FILE, ENV_PREFIX, Ok)?;
    Ok(raw.get("sampler").unwrap_or_default())
}

fn write_result(filename: &Path, result: &SolverOutput) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(result)?;
    let mut file = File::create(filename)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
