use std::{path::PathBuf, time::Instant};

use anyhow::{ensure, Context as _};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use sparse_net::{
    NeuronData, ServiceContext, SolutionBuilder, SolutionSolver, SparseNetBuilder,
    TransferFunction,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// number of input values of the net
    #[arg(short, long, default_value_t = 16)]
    input_size: usize,

    /// comma separated layer sizes of the dense net, the last one is the output layer
    #[arg(short, long, value_delimiter = ',', default_values_t = vec![64, 64, 32, 8])]
    layers: Vec<usize>,

    /// threads used to compile and to solve
    #[arg(short, long, env = "SPARSE_NET_MAX_SOLVE_THREADS")]
    threads: Option<usize>,

    /// memory available to a whole row of partial solutions
    #[arg(short, long, env = "SPARSE_NET_DEVICE_MAX_MEGABYTES")]
    device_max_megabytes: Option<f64>,

    /// number of consecutive solves, the neuron state is kept between them
    #[arg(short, long, default_value_t = 10)]
    runs: usize,

    /// seed of the weights and of the inputs
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// optional file receiving a json summary of the run
    #[arg(long)]
    summary: Option<PathBuf>,

    /// log with json lines instead of text
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

#[derive(Serialize, Debug)]
struct Summary {
    neurons: usize,
    weights: usize,
    rows: usize,
    cols: Vec<usize>,
    solution_bytes: usize,
    build_ms: f64,
    solve_ms: Vec<f64>,
    output: Vec<f64>,
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to set the global subscriber: {e}"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs)?;
    ensure!(!args.layers.is_empty(), "at least one layer is required");

    let mut context = ServiceContext::default();
    if let Some(threads) = args.threads {
        context = context.with_max_solve_threads(threads);
    }
    if let Some(megabytes) = args.device_max_megabytes {
        context = context.with_device_max_megabytes(megabytes);
    }
    info!(
        threads = context.max_solve_threads,
        device = %utils::human_bytes(context.device_max_bytes()),
        layers = ?args.layers,
        "starting bench"
    );

    let net = SparseNetBuilder::new()
        .input_size(args.input_size)
        .expected_input_range(TransferFunction::Identity.average_output_range())
        .seed(args.seed)
        .dense_layers(&args.layers)
        .context("building the dense net")?;
    info!(
        neurons = %utils::separated(net.neuron_count()),
        weights = %utils::separated(net.weight_table.len()),
        "built net"
    );
    utils::log_memory_usage("net");

    let start = Instant::now();
    let solution = SolutionBuilder::new()
        .service_context(&context)
        .build(&net)
        .context("compiling the solution")?;
    let build_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        rows = solution.rows(),
        partial_solutions = solution.partial_solutions.len(),
        build_ms,
        "compiled solution"
    );
    utils::log_memory_usage("solution");

    let solver = SolutionSolver::new(&context).context("creating the solver")?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut neuron_data = NeuronData::for_solution(&solution);
    let mut solve_ms = Vec::with_capacity(args.runs);
    let mut output = vec![];
    for run in 0..args.runs {
        let input = (0..args.input_size)
            .map(|_| rng.gen_range(-1.0..=1.0))
            .collect::<Vec<f64>>();
        let start = Instant::now();
        output = solver
            .solve(&solution, &input, &mut neuron_data)
            .with_context(|| format!("solving run {run}"))?;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        info!(run, solve_ms = elapsed, "solved");
        solve_ms.push(elapsed);
    }
    info!(output = ?output, "final output");

    if let Some(path) = args.summary {
        let summary = Summary {
            neurons: net.neuron_count(),
            weights: net.weight_table.len(),
            rows: solution.rows(),
            cols: solution.cols.clone(),
            solution_bytes: solution.estimated_size_bytes(),
            build_ms,
            solve_ms,
            output,
        };
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing the summary to {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }
    Ok(())
}
