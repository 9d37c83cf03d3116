use clap::Parser;
use tile_packer::config::{SolverConfig, Strategy, SupplyRule};
use tile_packer::grid::Grid;
use tile_packer::input::{self, GridFrame};
use tile_packer::render;
use tile_packer::solver::Solver;
use tile_packer::types::Catalog;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "tile_packer",
    about = "Packs square pieces onto a tile grid to maximize total value"
)]
struct Cli {
    /// Text occupancy map: '#' open, '_' or '.' blocked, one row per line
    #[arg(long, conflicts_with = "size")]
    grid: Option<String>,

    /// Fully open grid dimensions (WxH, e.g. 24x16)
    #[arg(long, value_parser = parse_dimensions)]
    size: Option<(usize, usize)>,

    /// JSON piece catalog (default: built-in space solar catalog)
    #[arg(long)]
    catalog: Option<String>,

    /// Search strategy: greedy, bnb, or anneal
    #[arg(long, default_value = "anneal")]
    strategy: Strategy,

    /// Scoring: ignore, or require-poles to only count pole-supplied pieces
    #[arg(long, default_value = "ignore", value_parser = parse_supply_rule)]
    supply_rule: SupplyRule,

    /// Outer iteration budget (0 = unlimited)
    #[arg(long, default_value_t = 100_000)]
    max_iterations: u64,

    /// Wall-clock budget in milliseconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    time_limit_ms: u64,

    /// Annealing start temperature
    #[arg(long, default_value_t = 100_000.0)]
    temperature: f64,

    /// Annealing temperature multiplier per step
    #[arg(long, default_value_t = 0.9995)]
    cooling_rate: f64,

    /// Branch-and-bound weight of the optimistic remainder
    #[arg(long, default_value_t = 0.9)]
    weight: f64,

    /// RNG seed for reproducible annealing
    #[arg(long)]
    seed: Option<u64>,

    /// Report the last accepted annealing state instead of the best seen
    #[arg(long)]
    last_accepted: bool,

    /// Show ASCII layout of the result
    #[arg(long)]
    layout: bool,

    /// Print the solution as JSON
    #[arg(long)]
    json: bool,

    /// Log progress to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_supply_rule(s: &str) -> Result<SupplyRule, String> {
    match s {
        "ignore" => Ok(SupplyRule::Ignore),
        "require-poles" => Ok(SupplyRule::RequirePoleCoverage),
        _ => Err(format!(
            "invalid supply rule '{}', expected: ignore or require-poles",
            s
        )),
    }
}

fn parse_dimensions(s: &str) -> Result<(usize, usize), String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(format!("invalid dimensions '{}', expected WxH", s));
    }
    let width = parts[0]
        .parse::<usize>()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    let height = parts[1]
        .parse::<usize>()
        .map_err(|_| format!("invalid height in '{}'", s))?;
    if width == 0 || height == 0 {
        return Err(format!("dimensions must be non-zero in '{}'", s));
    }
    Ok((width, height))
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .init();

    let frame = match (&cli.grid, cli.size) {
        (Some(path), _) => input::load_grid(path).unwrap_or_else(|e| fail(e)),
        (None, Some((width, height))) => GridFrame {
            grid: Grid::new(width, height).unwrap_or_else(|e| fail(e)),
            origin: (0, 0),
        },
        (None, None) => fail("one of --grid or --size is required"),
    };

    let catalog = match &cli.catalog {
        Some(path) => input::load_catalog(path).unwrap_or_else(|e| fail(e)),
        None => Catalog::space_solar(),
    };

    let mut config = SolverConfig::new()
        .with_strategy(cli.strategy)
        .with_supply_rule(cli.supply_rule)
        .with_bound_weight(cli.weight)
        .with_annealing(cli.temperature, cli.cooling_rate)
        .with_keep_best(!cli.last_accepted)
        .with_max_iterations(cli.max_iterations)
        .with_time_limit_ms(cli.time_limit_ms);
    config.seed = cli.seed;

    let solver = Solver::new(frame.grid, catalog, config).unwrap_or_else(|e| fail(e));
    let outcome = solver.solve();
    let solution = outcome.to_solution(frame.origin);

    if cli.json {
        match serde_json::to_string_pretty(&solution) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(e),
        }
        return;
    }

    for p in &solution.placements {
        println!("  {} @ ({}, {})", p.kind, p.x, p.y);
    }
    if cli.layout {
        println!();
        print!("{}", render::render_branch(&outcome.branch));
    }
    println!();

    for (kind, count) in &solution.pieces_by_kind {
        println!("  {:>4} x {}", count, kind);
    }
    println!(
        "Summary: {} piece{}, score {:.1} (greedy {:.1}, {:+.1}), {} pole network{}, {} iteration{} ({})",
        solution.piece_count(),
        if solution.piece_count() == 1 { "" } else { "s" },
        solution.score,
        solution.baseline_score,
        solution.improvement(),
        solution.pole_networks,
        if solution.pole_networks == 1 { "" } else { "s" },
        solution.iterations,
        if solution.iterations == 1 { "" } else { "s" },
        solution.stop_reason,
    );
}
