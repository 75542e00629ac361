use anyhow::{bail, Context, Result};
use avida_core::{
    CpuVariant, Genome, HardwareConfig, HardwareCore, JsonTrace, MutationEvent, NullTrace,
    SimpleContext, TraceSink, DEFAULT_ANCESTOR,
};
use clap::{ArgAction, Parser};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "avida-run")]
#[command(about = "Run one digital organism on the virtual CPU", long_about = None)]
struct Args {
    /// Genome as instruction symbols, or @PATH to read them from a file.
    /// Defaults to the stock classic ancestor.
    #[arg(long, value_name = "GENOME")]
    genome: Option<String>,

    /// JSON hardware configuration; unspecified fields keep their defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 1_000)]
    ticks: u64,

    /// Seed for the organism's random stream.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Use the experimental hardware and instruction set.
    #[arg(long, action = ArgAction::SetTrue)]
    experimental: bool,

    /// Stop after the first successful divide.
    #[arg(long, action = ArgAction::SetTrue)]
    until_divide: bool,

    /// Write one JSON record per executed instruction.
    #[arg(long, value_name = "PATH")]
    trace: Option<PathBuf>,

    /// Print the run summary as JSON.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Serialize)]
struct Summary {
    ticks: u64,
    cycles: u64,
    alive: bool,
    genome: String,
    genome_len: usize,
    divides: u64,
    threads: usize,
    offspring: Vec<String>,
    outputs: Vec<i32>,
    faults: usize,
    mutations: Vec<MutationEvent>,
    trace_records: Option<u64>,
}

fn load_config(args: &Args) -> Result<HardwareConfig> {
    let mut config = match &args.config {
        Some(path) => HardwareConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HardwareConfig::default(),
    };
    if args.experimental {
        config.variant = CpuVariant::Experimental;
    }
    Ok(config)
}

fn load_genome(args: &Args, variant: CpuVariant) -> Result<Genome> {
    let text = match args.genome.as_deref() {
        Some(arg) => match arg.strip_prefix('@') {
            Some(path) => {
                fs::read_to_string(path).with_context(|| format!("reading genome {path}"))?
            }
            None => arg.to_string(),
        },
        None if variant == CpuVariant::Classic => DEFAULT_ANCESTOR.to_string(),
        None => bail!("--genome is required for the experimental hardware"),
    };
    Genome::parse(text.trim()).context("parsing genome")
}

fn run_ticks<T: TraceSink>(
    core: &mut HardwareCore,
    ctx: &mut SimpleContext,
    trace: &mut T,
    args: &Args,
) -> u64 {
    let mut ran = 0;
    while ran < args.ticks && core.is_alive() {
        core.single_process_traced(ctx, trace, false);
        ran += 1;
        if args.until_divide && !ctx.offspring.is_empty() {
            break;
        }
    }
    ran
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let genome = load_genome(&args, config.variant)?;
    let mut core = HardwareCore::from_config(config, &genome)?;
    let mut ctx = SimpleContext::new(args.seed);

    let (ticks, trace_records) = match &args.trace {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating trace {}", path.display()))?;
            let mut trace = JsonTrace::new(BufWriter::new(file));
            let ticks = run_ticks(&mut core, &mut ctx, &mut trace, &args);
            let records = trace.records();
            trace.finish().context("writing trace")?;
            (ticks, Some(records))
        }
        None => (run_ticks(&mut core, &mut ctx, &mut NullTrace, &args), None),
    };

    let offspring = ctx.take_offspring();
    let summary = Summary {
        ticks,
        cycles: core.cycle_count(),
        alive: core.is_alive(),
        genome: core.genome().to_string(),
        genome_len: core.memory().len(),
        divides: core.divide_count(),
        threads: core.thread_count(),
        offspring: offspring.iter().map(Genome::to_string).collect(),
        outputs: ctx.outputs.clone(),
        faults: ctx.faults.len(),
        mutations: ctx.mutations.clone(),
        trace_records,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "ran {} ticks ({} cycles since birth): {} lines, {} divides, {} threads, {} faults{}",
        summary.ticks,
        summary.cycles,
        summary.genome_len,
        summary.divides,
        summary.threads,
        summary.faults,
        if summary.alive { "" } else { " (dead)" }
    );
    println!("genome: {}", summary.genome);
    for (idx, child) in summary.offspring.iter().enumerate() {
        println!("offspring {idx}: {child}");
    }
    if let Some(records) = summary.trace_records {
        println!("trace: {records} records");
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
