use std::fs;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use boulder::deadlock_db::DeadlockDbOptions;
use boulder::{
    Error, Levels, Metric, Method, OptimizerSettings, SearchContext, SolverOptions, optimize, solve,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Astar,
    Idastar,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Astar => Method::AStar,
            MethodArg::Idastar => Method::IdaStar,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetricArg {
    MovesPushes,
    PushesMoves,
    BoxLinesPushes,
    BoxLinesMoves,
    BoxChangesPushes,
    BoxChangesMoves,
    AllMetricsMovesPushes,
    AllMetricsBoxLinesPushes,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::MovesPushes => Metric::MovesPushes,
            MetricArg::PushesMoves => Metric::PushesMoves,
            MetricArg::BoxLinesPushes => Metric::BoxLinesPushes,
            MetricArg::BoxLinesMoves => Metric::BoxLinesMoves,
            MetricArg::BoxChangesPushes => Metric::BoxChangesPushes,
            MetricArg::BoxChangesMoves => Metric::BoxChangesMoves,
            MetricArg::AllMetricsMovesPushes => Metric::AllMetricsMovesPushes,
            MetricArg::AllMetricsBoxLinesPushes => Metric::AllMetricsBoxLinesPushes,
        }
    }
}

fn parse_radii(s: &str) -> Result<Vec<u16>, String> {
    let radii: Result<Vec<u16>, _> = s.split(',').map(|part| part.trim().parse()).collect();
    let radii = radii.map_err(|_| format!("invalid radii list: {}", s))?;
    if radii.is_empty() {
        return Err("radii list must not be empty".to_string());
    }
    if radii.windows(2).any(|w| w[0] > w[1]) {
        return Err("radii must be non-decreasing".to_string());
    }
    Ok(radii)
}

#[derive(Parser)]
#[command(name = "boulder")]
#[command(about = "A Sokoban solver and solution optimizer", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve levels push-optimally
    Solve {
        /// Path to the levels file (XSB format)
        #[arg(value_name = "FILE")]
        levels_file: String,

        /// Level number to solve (1-indexed), or start of range
        #[arg(value_name = "LEVEL", default_value = "1")]
        level_start: usize,

        /// Optional end of level range (inclusive, 1-indexed)
        #[arg(value_name = "LEVEL_END")]
        level_end: Option<usize>,

        /// Search method
        #[arg(short, long, value_enum, default_value = "astar")]
        method: MethodArg,

        /// Print the solution lurd string
        #[arg(short, long)]
        print_solution: bool,

        /// Wall-clock limit per level in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Memory budget in MiB
        #[arg(long, default_value = "512")]
        max_mem_mib: usize,

        /// Disable tunnel commitment
        #[arg(long)]
        no_tunnel: bool,

        /// Disable corral relevance pruning
        #[arg(long)]
        no_corral: bool,

        /// Disable goal-room decomposition
        #[arg(long)]
        no_goal_room: bool,

        /// Skip multi-box deadlock identification
        #[arg(long)]
        no_deadlocks: bool,

        /// Time budget for deadlock identification in milliseconds
        #[arg(long, default_value = "3000")]
        deadlock_ms: u64,
    },
    /// Improve an existing solution under a metric
    Optimize {
        /// Path to the levels file (XSB format)
        #[arg(value_name = "FILE")]
        levels_file: String,

        /// Level number the solution belongs to (1-indexed)
        #[arg(value_name = "LEVEL", default_value = "1")]
        level: usize,

        /// The solution to improve, as a lurd string
        #[arg(short, long, conflicts_with = "solution_file")]
        solution: Option<String>,

        /// Read the solution from a file instead
        #[arg(long)]
        solution_file: Option<String>,

        /// Metric to optimize
        #[arg(short = 'M', long, value_enum, default_value = "moves-pushes")]
        metric: MetricArg,

        /// Per-slot vicinity radii, comma separated and non-decreasing
        #[arg(short, long, default_value = "10,20,20")]
        radii: String,

        /// Wall-clock limit in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Memory budget in MiB
        #[arg(long, default_value = "512")]
        max_mem_mib: usize,

        /// Stop after one improvement round instead of iterating
        #[arg(long)]
        single_pass: bool,
    },
}

fn load_level(levels: &Levels, number: usize) -> Result<&boulder::Board> {
    if number == 0 {
        bail!("level numbers are 1-indexed");
    }
    levels.get(number - 1).with_context(|| {
        format!(
            "level {} not found ({} levels in file)",
            number,
            levels.len()
        )
    })
}

fn run_solve(
    levels: &Levels,
    level_start: usize,
    level_end: usize,
    opts: &SolverOptions,
    print_solution: bool,
) -> Result<()> {
    let mut total_solved = 0usize;
    let mut total_pushes = 0u64;
    let mut total_time_ms = 0u128;

    for number in level_start..=level_end {
        let board = load_level(levels, number)?;
        let ctx = SearchContext::unlimited();
        let start = Instant::now();
        let result = solve(board, opts, &ctx);
        let elapsed_ms = start.elapsed().as_millis();
        total_time_ms += elapsed_ms;

        match result {
            Ok(solution) => {
                total_solved += 1;
                total_pushes += u64::from(solution.metrics.pushes);
                println!(
                    "level: {:<3}  solved: Y  pushes: {:<5} moves: {:<6} elapsed: {} ms",
                    number, solution.metrics.pushes, solution.metrics.moves, elapsed_ms
                );
                log::debug!("level {}: {}", number, solution.stats);
                if print_solution {
                    println!("{}", solution.lurd);
                }
            }
            Err(Error::Unsolvable) => {
                println!(
                    "level: {:<3}  solved: X  pushes: -     moves: -      elapsed: {} ms",
                    number, elapsed_ms
                );
            }
            Err(err) => {
                println!(
                    "level: {:<3}  solved: N  reason: {:<24} elapsed: {} ms",
                    number, err, elapsed_ms
                );
            }
        }
    }

    if level_end > level_start {
        println!("---");
        println!(
            "solved: {}/{}  pushes: {}  elapsed: {} ms",
            total_solved,
            level_end - level_start + 1,
            total_pushes,
            total_time_ms
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Solve {
            levels_file,
            level_start,
            level_end,
            method,
            print_solution,
            timeout_ms,
            max_mem_mib,
            no_tunnel,
            no_corral,
            no_goal_room,
            no_deadlocks,
            deadlock_ms,
        } => {
            let levels = Levels::from_file(&levels_file)
                .with_context(|| format!("failed to load {}", levels_file))?;
            let level_end = level_end.unwrap_or(level_start);
            if level_end < level_start {
                bail!("level range end must be >= start");
            }

            let opts = SolverOptions {
                method: method.into(),
                timeout: timeout_ms.map(Duration::from_millis),
                max_mem_mib,
                tunnel: !no_tunnel,
                corral: !no_corral,
                goal_room: !no_goal_room,
                deadlocks: if no_deadlocks {
                    None
                } else {
                    Some(DeadlockDbOptions {
                        time_limit: Duration::from_millis(deadlock_ms),
                        ..Default::default()
                    })
                },
            };
            run_solve(&levels, level_start, level_end, &opts, print_solution)
        }
        Command::Optimize {
            levels_file,
            level,
            solution,
            solution_file,
            metric,
            radii,
            timeout_ms,
            max_mem_mib,
            single_pass,
        } => {
            let levels = Levels::from_file(&levels_file)
                .with_context(|| format!("failed to load {}", levels_file))?;
            let board = load_level(&levels, level)?;

            let lurd = match (solution, solution_file) {
                (Some(s), None) => s,
                (None, Some(path)) => {
                    fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))?
                }
                _ => bail!("provide exactly one of --solution or --solution-file"),
            };

            let radii = parse_radii(&radii).map_err(|e| anyhow::anyhow!(e))?;
            let settings = OptimizerSettings {
                metric: metric.into(),
                radii,
                timeout: timeout_ms.map(Duration::from_millis),
                max_mem_mib,
                iterate_to_fixpoint: !single_pass,
                ..Default::default()
            };

            let start = Instant::now();
            let result = optimize(board, &lurd, &settings, &SearchContext::unlimited())
                .with_context(|| format!("optimizing level {}", level))?;
            println!(
                "level: {:<3}  rounds: {:<2}  {}  elapsed: {} ms",
                level,
                result.iterations,
                result.metrics,
                start.elapsed().as_millis()
            );
            println!("{}", result.lurd);
            Ok(())
        }
    }
}
