use std::path::{Path, PathBuf};

use bob_config::{BobTuning, ConfigError, RuntimeTuning};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod scenario;

use scenario::Scenario;

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_CONFIG: i32 = 3;

#[derive(Parser)]
#[command(name = "tools", version, about = "Bob locomotion tools CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a headless scenario and print the final pose.
    Simulate(SimulateArgs),
    /// Parse and validate a tuning file.
    CheckConfig {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Parser)]
struct SimulateArgs {
    #[arg(long, value_enum)]
    scenario: Scenario,

    #[arg(long)]
    ticks: Option<u32>,

    #[arg(long)]
    dt: Option<f32>,

    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0)]
    brake_left: f32,

    #[arg(long, default_value_t = 0.0)]
    brake_right: f32,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::CheckConfig { path } => run_check_config(&path),
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_simulate(args: SimulateArgs) -> i32 {
    let ticks = args.ticks.unwrap_or(120);
    let dt = args.dt.unwrap_or(1.0 / 60.0);
    if !dt.is_finite() || dt <= 0.0 {
        eprintln!("--dt must be > 0");
        return EXIT_USAGE;
    }
    let tuning = match load_tuning(args.config.as_deref()) {
        Ok(tuning) => tuning,
        Err(err) => {
            eprintln!("{}", err);
            return EXIT_CONFIG;
        }
    };

    let report = match scenario::run(
        args.scenario,
        &tuning,
        (args.brake_left, args.brake_right),
        ticks,
        dt,
    ) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("controller setup failed: {}", err);
            return EXIT_CONFIG;
        }
    };

    let pose = report.last.pose;
    println!(
        "simulate {} ok (ticks={}, dt={:.4})",
        args.scenario.as_str(),
        report.ticks,
        dt
    );
    println!(
        "position: ({:.3}, {:.3}, {:.3}) moved {:.3}",
        pose.position.x,
        pose.position.y,
        pose.position.z,
        report.distance()
    );
    println!(
        "orientation deg: yaw {:.2} pitch {:.2} roll {:.2}",
        pose.orientation.yaw.to_degrees(),
        pose.orientation.pitch.to_degrees(),
        pose.orientation.roll.to_degrees()
    );
    println!(
        "speed {:.3} vertical {:.3} overturn {:.2} (max {:.2})",
        report.last.motion.target_velocity.norm(),
        report.last.motion.vertical_speed,
        report.last.balance.overturn_deg,
        report.max_overturn_deg
    );
    println!(
        "grounded {}/{} blocked {}",
        report.grounded_ticks, report.ticks, report.blocked_ticks
    );
    EXIT_SUCCESS
}

fn load_tuning(path: Option<&Path>) -> Result<RuntimeTuning, ConfigError> {
    match path {
        Some(path) => BobTuning::load(path)?.runtime(),
        None => BobTuning::default().runtime(),
    }
}

fn run_check_config(path: &Path) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("failed to read {}: {}", path.display(), err);
            return EXIT_CONFIG;
        }
    };
    let tuning = match BobTuning::parse_toml(&text) {
        Ok(tuning) => tuning,
        Err(err) => {
            eprintln!("{}", err);
            return EXIT_CONFIG;
        }
    };
    let validation = tuning.validate();
    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }
    for error in &validation.errors {
        eprintln!("error: {}", error);
    }
    if !validation.is_ok() {
        return EXIT_CONFIG;
    }
    println!(
        "config ok: {} (strategy={})",
        tuning.name.as_deref().unwrap_or("unnamed"),
        tuning.balance.strategy.as_str()
    );
    EXIT_SUCCESS
}
