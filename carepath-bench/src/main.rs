mod logic;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use carepath_core::scenario::{self, Scenario};
use carepath_core::{
    CompositeWeights, Engine, EnvConfig, FallbackPolicy, PolicyKind, RecommendationRequest,
    RoutingPolicy, ScenarioWeights, Severity, ShockConfig, SimulationConfig,
};
use logic::{ModelChoice, NetworkChoice, ReportFormat, reports};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Recommend a destination for a single patient
    Recommend,
    /// Run one batch simulation with capacity and wait dynamics
    Simulate,
    /// Run named scenarios and rank them
    Scenarios,
    /// Evaluate routing policies on the episodic environment
    Benchmark,
}

impl RunMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Recommend => "recommend",
            Self::Simulate => "simulate",
            Self::Scenarios => "scenarios",
            Self::Benchmark => "benchmark",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "carepath-bench", version)]
#[command(about = "Referral routing recommendations, batch simulation and policy benchmarks")]
struct Args {
    /// What to run
    #[arg(long, value_enum, default_value_t = RunMode::Simulate)]
    mode: RunMode,

    /// Bundled network name (demo, complex) or path to a JSON snapshot
    #[arg(long, default_value = "demo")]
    network: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "all")]
    scenarios: String,

    /// Facility the patient starts from
    #[arg(long, default_value = "C_LOCAL_A")]
    source: String,

    /// Required speciality
    #[arg(long, default_value = "maternal")]
    speciality: String,

    /// Patient severity (low, medium, high)
    #[arg(long, default_value = "high")]
    severity: Severity,

    /// Routing policy (heuristic, learned, auto)
    #[arg(long, default_value = "heuristic")]
    policy: RoutingPolicy,

    /// Patient identifier for recommend mode
    #[arg(long, default_value = "P001")]
    patient_id: String,

    /// Patients per simulation run, scenario or episode
    #[arg(long, default_value_t = 80)]
    patients: usize,

    /// Wait minutes added to a destination per referral
    #[arg(long, default_value_t = 3.0)]
    wait_increment: f64,

    /// Recover capacity every N patients (0 disables)
    #[arg(long, default_value_t = 5)]
    recovery_interval: u32,

    /// Capacity restored per recovery
    #[arg(long, default_value_t = 2)]
    recovery_amount: u32,

    /// What to do when no destination has capacity (none, force_least_loaded)
    #[arg(long, default_value = "none")]
    fallback_policy: FallbackPolicy,

    /// Penalty for a saturated destination in least-loaded ranking
    #[arg(long, default_value_t = 30.0)]
    overload_penalty: f64,

    /// Apply a random shock every N patients (0 disables)
    #[arg(long, default_value_t = 0)]
    shock_every: u32,

    /// Wait minutes added by a shock
    #[arg(long, default_value_t = 0.0)]
    shock_wait_add: f64,

    /// Capacity removed by a shock
    #[arg(long, default_value_t = 0)]
    shock_capacity_drop: u32,

    /// Seed for shock target selection
    #[arg(long, default_value_t = 42)]
    random_seed: u64,

    /// Episodes per policy in benchmark mode
    #[arg(long, default_value_t = 20)]
    episodes: usize,

    /// First episode seed; episode i uses seed_base + i
    #[arg(long, default_value_t = 42)]
    seed_base: u64,

    /// Policies to benchmark (comma-separated, or "all")
    #[arg(long, default_value = "all")]
    policies: String,

    /// Divisor applied to travel and wait before weighting the reward
    #[arg(long, default_value_t = 100.0)]
    reward_scale: f64,

    /// Reward weight on travel minutes
    #[arg(long, default_value_t = 1.0)]
    travel_weight: f64,

    /// Reward weight on wait minutes
    #[arg(long, default_value_t = 1.0)]
    wait_weight: f64,

    /// Reward penalty on destination concentration
    #[arg(long, default_value_t = 0.0)]
    fairness_penalty: f64,

    /// Composite weight on reward
    #[arg(long, default_value_t = 1.0)]
    weight_reward: f64,

    /// Composite weight on travel
    #[arg(long, default_value_t = 0.6)]
    weight_travel: f64,

    /// Composite weight on wait
    #[arg(long, default_value_t = 0.8)]
    weight_wait: f64,

    /// Composite weight on concentration
    #[arg(long, default_value_t = 0.4)]
    weight_hhi: f64,

    /// Composite weight on the entropy gap
    #[arg(long, default_value_t = 0.2)]
    weight_entropy_gap: f64,

    /// Composite weight on the overload rate
    #[arg(long, default_value_t = 0.4)]
    weight_overloads: f64,

    /// Path to a linear policy model (JSON); learned routing is unavailable without it
    #[arg(long)]
    model: Option<PathBuf>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    let format = ReportFormat::parse(&args.report);
    if format == ReportFormat::Console && args.output.is_none() {
        announce_banner();
    }

    let start_time = Instant::now();
    let mut sink = ReportSink::open(args.output.as_deref())?;
    run(&args, format, &mut sink)?;
    if format == ReportFormat::Console {
        writeln!(sink)?;
        writeln!(sink, "🏁 Total time: {:?}", start_time.elapsed())?;
    }
    sink.finish()
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut sink = ReportSink::open(args.output.as_deref())?;
    writeln!(sink, "Available scenarios:")?;
    for scenario in scenario::catalog() {
        let shock = &scenario.config.shock;
        let description = if shock.is_enabled() {
            format!(
                "{} network, {} from {}, shock every {}",
                scenario.network,
                scenario.config.speciality,
                scenario.config.source_id,
                shock.shock_every
            )
        } else {
            format!(
                "{} network, {} from {}, stable",
                scenario.network, scenario.config.speciality, scenario.config.source_id
            )
        };
        writeln!(sink, "  {:25} - {description}", scenario.name)?;
    }
    sink.finish()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🚑 CarePath Referral Bench".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn run<W: Write>(args: &Args, format: ReportFormat, out: &mut W) -> Result<()> {
    let network = NetworkChoice::parse(&args.network);
    let models = ModelChoice::from_path(args.model.as_deref());
    if args.verbose {
        eprintln!("📂 Network: {network}");
    }
    let label = network.to_string();
    let engine = Engine::new(network, models);

    match args.mode {
        RunMode::Recommend => {
            let request = RecommendationRequest::new(
                &args.patient_id,
                &args.source,
                &args.speciality,
                args.severity,
            )
            .with_policy(args.policy);
            let result = engine
                .recommend(&request)
                .context("recommendation failed")?;
            match format {
                ReportFormat::Json => reports::write_json(out, "recommend", &label, &result)?,
                ReportFormat::Markdown => reports::recommendation_markdown(out, &result)?,
                ReportFormat::Csv => reports::recommendation_csv(out, &result)?,
                ReportFormat::Console => reports::recommendation_console(out, &result)?,
            }
        }
        RunMode::Simulate => {
            let report = engine
                .simulate(simulation_config(args))
                .context("simulation failed")?;
            match format {
                ReportFormat::Json => reports::write_json(out, "simulate", &label, &report)?,
                ReportFormat::Markdown => reports::simulation_markdown(out, &report)?,
                ReportFormat::Csv => reports::simulation_csv(out, &report)?,
                ReportFormat::Console => reports::simulation_console(out, &report)?,
            }
        }
        RunMode::Scenarios => {
            let selected = select_scenarios(&args.scenarios, args.patients)?;
            let outcomes = scenario::run_scenarios(&selected, engine.models())
                .context("scenario run failed")?;
            let ranking = scenario::rank_scenarios(&outcomes, &ScenarioWeights::default());
            match format {
                ReportFormat::Json => {
                    let payload = serde_json::json!({
                        "scenarios": outcomes,
                        "ranking": ranking,
                    });
                    reports::write_json(out, "scenarios", "catalog", &payload)?;
                }
                ReportFormat::Markdown => reports::scenarios_markdown(out, &ranking)?,
                ReportFormat::Csv => reports::scenarios_csv(out, &ranking)?,
                ReportFormat::Console => reports::scenarios_console(out, &outcomes, &ranking)?,
            }
        }
        RunMode::Benchmark => {
            let kinds = parse_policies(&args.policies)?;
            let report = engine
                .benchmark(
                    &kinds,
                    env_config(args),
                    args.episodes,
                    args.seed_base,
                    composite_weights(args),
                )
                .context("benchmark failed")?;
            match format {
                ReportFormat::Json => reports::write_json(out, "benchmark", &label, &report)?,
                ReportFormat::Markdown => reports::benchmark_markdown(out, &report)?,
                ReportFormat::Csv => reports::benchmark_csv(out, &report)?,
                ReportFormat::Console => reports::benchmark_console(out, &report)?,
            }
        }
    }
    log::info!("{} run complete", args.mode.as_str());
    Ok(())
}

fn simulation_config(args: &Args) -> SimulationConfig {
    SimulationConfig {
        patients: args.patients,
        severity: args.severity,
        policy: args.policy,
        wait_increment: args.wait_increment,
        recovery_interval: args.recovery_interval,
        recovery_amount: args.recovery_amount,
        fallback_policy: args.fallback_policy,
        overload_penalty: args.overload_penalty,
        shock: ShockConfig {
            shock_every: args.shock_every,
            shock_wait_add: args.shock_wait_add,
            shock_capacity_drop: args.shock_capacity_drop,
            random_seed: args.random_seed,
        },
        ..SimulationConfig::new(&args.source, &args.speciality)
    }
}

fn env_config(args: &Args) -> EnvConfig {
    EnvConfig {
        patients_per_episode: args.patients,
        wait_increment: args.wait_increment,
        recovery_interval: args.recovery_interval,
        recovery_amount: args.recovery_amount,
        overload_penalty: args.overload_penalty,
        reward_scale: args.reward_scale,
        travel_weight: args.travel_weight,
        wait_weight: args.wait_weight,
        fairness_penalty: args.fairness_penalty,
        ..EnvConfig::new(&args.source, &args.speciality)
    }
}

const fn composite_weights(args: &Args) -> CompositeWeights {
    CompositeWeights {
        reward: args.weight_reward,
        travel: args.weight_travel,
        wait: args.weight_wait,
        hhi: args.weight_hhi,
        entropy_gap: args.weight_entropy_gap,
        overloads: args.weight_overloads,
    }
}

fn parse_policies(value: &str) -> Result<Vec<PolicyKind>> {
    let names = split_csv(value);
    if names.iter().any(|n| n == "all") {
        return Ok(PolicyKind::ALL.to_vec());
    }
    let kinds = names
        .iter()
        .map(|name| name.parse::<PolicyKind>().map_err(anyhow::Error::msg))
        .collect::<Result<Vec<_>>>()?;
    if kinds.is_empty() {
        bail!("no policies selected");
    }
    Ok(kinds)
}

fn select_scenarios(value: &str, patients: usize) -> Result<Vec<Scenario>> {
    let names = split_csv(value);
    let selected: Vec<Scenario> = if names.iter().any(|n| n == "all") {
        scenario::catalog()
    } else {
        names
            .iter()
            .map(|name| {
                scenario::find(name).with_context(|| format!("unknown scenario: {name}"))
            })
            .collect::<Result<_>>()?
    };
    if selected.is_empty() {
        bail!("no scenarios selected");
    }
    Ok(selected
        .into_iter()
        .map(|s| s.with_patients(patients))
        .collect())
}

/// Buffered report destination: stdout, or the `--output` file.
struct ReportSink {
    inner: BufWriter<Box<dyn Write>>,
    label: String,
}

impl ReportSink {
    fn open(path: Option<&Path>) -> Result<Self> {
        let (writer, label): (Box<dyn Write>, String) = match path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                (Box::new(file), path.display().to_string())
            }
            None => (Box::new(stdout()), "stdout".to_string()),
        };
        Ok(Self {
            inner: BufWriter::new(writer),
            label,
        })
    }

    fn finish(mut self) -> Result<()> {
        self.inner
            .flush()
            .with_context(|| format!("failed to write report to {}", self.label))
    }
}

impl Write for ReportSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
