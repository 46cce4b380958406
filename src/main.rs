//! Planwright - plan transformer command-line interface
//!
//! Reads a JSON catalog and a JSON logical plan, transforms the plan and
//! prints the physical operator tree.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use planwright::catalog::MemoryCatalog;
use planwright::codegen::SchemaCodeGenerator;
use planwright::planner::{LogicalPlan, PlanId, TransformMode, Transformer, TransformerConfig};

/// Plan file: the node arena plus the top-level trees to transform.
#[derive(Deserialize)]
struct PlanFile {
    #[serde(flatten)]
    plan: LogicalPlan,
    #[serde(default)]
    trees: Vec<PlanId>,
}

struct Options {
    catalog: PathBuf,
    plan: PathBuf,
    config: TransformerConfig,
    verbose: bool,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::FAILURE;
        }
    };

    let level = if options.verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .try_init();

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut catalog: Option<PathBuf> = None;
    let mut plan: Option<PathBuf> = None;
    let mut config = TransformerConfig::default();
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--catalog" => {
                i += 1;
                catalog = Some(PathBuf::from(value(args, i, "--catalog")?));
            }
            "-p" | "--plan" => {
                i += 1;
                plan = Some(PathBuf::from(value(args, i, "--plan")?));
            }
            "-d" | "--db" => {
                i += 1;
                config.db = value(args, i, "--db")?.to_string();
            }
            "-r" | "--request" => {
                config.mode = TransformMode::Request;
            }
            "--no-passes" => {
                config = config.without_passes();
            }
            "--max-depth" => {
                i += 1;
                let raw = value(args, i, "--max-depth")?;
                config.max_depth = raw
                    .parse()
                    .map_err(|_| format!("invalid --max-depth: {}", raw))?;
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "--version" => {
                println!("planwright v{}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            arg => return Err(format!("unknown option: {}", arg)),
        }
        i += 1;
    }

    Ok(Some(Options {
        catalog: catalog.ok_or("missing --catalog")?,
        plan: plan.ok_or("missing --plan")?,
        config,
        verbose,
    }))
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} needs a value", flag))
}

fn print_help() {
    println!("Planwright - logical to physical SQL plan transformer");
    println!();
    println!("Usage: planwright --catalog FILE --plan FILE [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --catalog FILE     JSON catalog of databases and tables");
    println!("  -p, --plan FILE        JSON logical plan");
    println!("  -d, --db NAME          Database to resolve tables in (default: default)");
    println!("  -r, --request          Transform for request mode");
    println!("      --no-passes        Skip optimization passes");
    println!("      --max-depth N      Deepest plan accepted (default: 512)");
    println!("  -v, --verbose          Enable debug logging");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
}

fn run(options: Options) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = MemoryCatalog::from_json_file(&options.catalog)?;
    let json = std::fs::read_to_string(&options.plan)?;
    let file: PlanFile = serde_json::from_str(&json)?;

    let trees = if file.trees.is_empty() {
        vec![file.plan.last().ok_or("plan has no nodes")?]
    } else {
        file.trees.clone()
    };

    let transformer = Transformer::new(
        options.config,
        Arc::new(catalog),
        Box::new(SchemaCodeGenerator::new()),
    );
    let physical = transformer.compile(&file.plan, &trees)?;
    print!("{}", physical);
    println!("output: {}", physical.output_schema());
    Ok(())
}
