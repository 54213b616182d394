use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;

use carepath_core::numbers::{count_to_f64, ratio};
use carepath_core::scenario::{ScenarioOutcome, ScenarioRank};
use carepath_core::{BenchmarkReport, RecommendationResult, SimulationReport};

/// Output format selected with `--report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Markdown,
    Console,
    Csv,
}

impl ReportFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            "markdown" => Self::Markdown,
            "csv" => Self::Csv,
            _ => Self::Console,
        }
    }
}

/// JSON wrapper naming the run that produced `report`.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: Serialize> {
    pub tool: &'static str,
    pub version: &'static str,
    pub generated_at: String,
    pub mode: &'a str,
    pub network: &'a str,
    pub report: &'a T,
}

pub fn write_json<W: Write, T: Serialize>(
    out: &mut W,
    mode: &str,
    network: &str,
    report: &T,
) -> Result<()> {
    let envelope = Envelope {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        generated_at: Utc::now().to_rfc3339(),
        mode,
        network,
        report,
    };
    serde_json::to_writer_pretty(&mut *out, &envelope)?;
    writeln!(out)?;
    Ok(())
}

pub fn recommendation_console<W: Write>(out: &mut W, result: &RecommendationResult) -> Result<()> {
    writeln!(out, "{}", "🏥 Referral Recommendation".bright_cyan().bold())?;
    writeln!(out, "{}", "==========================".cyan())?;
    writeln!(out, "Patient      : {}", result.patient_id)?;
    writeln!(
        out,
        "Destination  : {} ({})",
        result.destination_name.green().bold(),
        result.destination_id
    )?;
    let route: Vec<&str> = result.path.iter().map(|step| step.id.as_str()).collect();
    writeln!(out, "Route        : {}", route.join(" -> "))?;
    writeln!(out, "Travel       : {:.1} min", result.travel_minutes)?;
    writeln!(out, "Wait         : {:.1} min", result.wait_minutes)?;
    writeln!(out, "Score        : {:.3}", result.score)?;
    writeln!(out, "Policy used  : {:?}", result.policy_used)?;
    if let Some(reason) = &result.fallback_reason {
        writeln!(out, "Fallback     : {}", reason.yellow())?;
    }
    writeln!(out)?;
    writeln!(out, "{}", result.explanation)?;
    Ok(())
}

pub fn recommendation_markdown<W: Write>(out: &mut W, result: &RecommendationResult) -> Result<()> {
    writeln!(out, "# CarePath Recommendation\n")?;
    writeln!(out, "- **Patient**: {}", result.patient_id)?;
    writeln!(
        out,
        "- **Destination**: {} (`{}`)",
        result.destination_name, result.destination_id
    )?;
    writeln!(out, "- **Travel**: {:.1} min", result.travel_minutes)?;
    writeln!(out, "- **Wait**: {:.1} min", result.wait_minutes)?;
    writeln!(out, "- **Score**: {:.3}", result.score)?;
    if let Some(reason) = &result.fallback_reason {
        writeln!(out, "- **Fallback**: {reason}")?;
    }
    writeln!(out, "\n## Route\n")?;
    writeln!(out, "| Step | Facility | Name | Level |")?;
    writeln!(out, "|---:|---|---|---|")?;
    for (idx, step) in result.path.iter().enumerate() {
        writeln!(out, "| {} | {} | {} | {} |", idx + 1, step.id, step.name, step.level)?;
    }
    writeln!(out, "\n{}", result.explanation)?;
    Ok(())
}

pub fn recommendation_csv<W: Write>(out: &mut W, result: &RecommendationResult) -> Result<()> {
    writeln!(
        out,
        "patient_id,destination_id,travel_minutes,wait_minutes,score,policy_used,fallback"
    )?;
    writeln!(
        out,
        "{},{},{:.3},{:.3},{:.6},{:?},{}",
        result.patient_id,
        result.destination_id,
        result.travel_minutes,
        result.wait_minutes,
        result.score,
        result.policy_used,
        result.fallback_reason.is_some()
    )?;
    Ok(())
}

pub fn simulation_console<W: Write>(out: &mut W, report: &SimulationReport) -> Result<()> {
    writeln!(out, "{}", "📊 CarePath Batch Simulation".bright_cyan().bold())?;
    writeln!(out, "{}", "============================".cyan())?;
    writeln!(out, "Preflight checks   :")?;
    writeln!(
        out,
        "  - facilities total      : {}",
        report.preflight.facilities_total
    )?;
    writeln!(out, "  - source exists         : {}", report.preflight.source_exists)?;
    writeln!(
        out,
        "  - eligible destinations : {}",
        report.preflight.eligible_destinations
    )?;
    writeln!(out, "Patients total     : {}", report.patients_total)?;
    writeln!(
        out,
        "Patients success   : {}",
        report.patients_success.to_string().green()
    )?;
    writeln!(
        out,
        "Patients failed    : {}",
        report.patients_failed.to_string().red()
    )?;
    writeln!(out, "Fallbacks used     : {}", report.fallbacks_used)?;
    writeln!(out, "Overloads          : {}", report.overloads)?;
    writeln!(out, "Fallback policy    : {}", report.fallback_policy)?;
    writeln!(
        out,
        "Shock config       : every {} / wait +{} / capacity -{} / seed {}",
        report.shock_config.shock_every,
        report.shock_config.shock_wait_add,
        report.shock_config.shock_capacity_drop,
        report.shock_config.random_seed
    )?;
    writeln!(out, "Failure rate       : {:.2}%", report.failure_rate * 100.0)?;
    writeln!(out, "Avg travel (min)   : {:.2}", report.avg_travel_minutes)?;
    writeln!(out, "Avg wait (min)     : {:.2}", report.avg_wait_minutes)?;
    writeln!(out, "Avg score          : {:.3}", report.avg_score)?;
    writeln!(out, "Concentration HHI  : {:.3}", report.concentration_hhi)?;
    writeln!(out, "Balance entropy    : {:.3}", report.balance_entropy)?;
    writeln!(out, "Snapshot           : {}", report.snapshot_fingerprint)?;
    writeln!(out, "Destination distribution:")?;
    for (destination, count) in &report.destination_counts {
        writeln!(out, "  - {destination}: {count}")?;
    }
    if !report.fallback_destination_counts.is_empty() {
        writeln!(out, "Fallback destinations:")?;
        for (destination, count) in &report.fallback_destination_counts {
            writeln!(out, "  - {destination}: {}", count.to_string().yellow())?;
        }
    }
    if !report.failure_reasons.is_empty() {
        writeln!(out, "Failure reasons:")?;
        for (reason, count) in &report.failure_reasons {
            writeln!(out, "  • {} ({count})", reason.red())?;
        }
    }
    Ok(())
}

pub fn simulation_markdown<W: Write>(out: &mut W, report: &SimulationReport) -> Result<()> {
    writeln!(out, "# CarePath Batch Simulation\n")?;
    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Patients**: {}", report.patients_total)?;
    writeln!(out, "- **Placed**: {}", report.patients_success)?;
    writeln!(out, "- **Failed**: {}", report.patients_failed)?;
    writeln!(out, "- **Fallbacks**: {}", report.fallbacks_used)?;
    writeln!(out, "- **Overloads**: {}", report.overloads)?;
    writeln!(out, "- **Failure rate**: {:.2}%", report.failure_rate * 100.0)?;
    writeln!(out, "- **Avg travel**: {:.2} min", report.avg_travel_minutes)?;
    writeln!(out, "- **Avg wait**: {:.2} min", report.avg_wait_minutes)?;
    writeln!(out, "- **HHI**: {:.3}", report.concentration_hhi)?;
    writeln!(out, "- **Entropy**: {:.3}\n", report.balance_entropy)?;
    writeln!(out, "## Destinations\n")?;
    writeln!(out, "| Destination | Referrals | Fallback |")?;
    writeln!(out, "|---|---:|---:|")?;
    for (destination, count) in &report.destination_counts {
        let fallback = report
            .fallback_destination_counts
            .get(destination)
            .copied()
            .unwrap_or(0);
        writeln!(out, "| {destination} | {count} | {fallback} |")?;
    }
    if !report.failure_reasons.is_empty() {
        writeln!(out, "\n## Failures\n")?;
        for (reason, count) in &report.failure_reasons {
            writeln!(out, "- {reason} ({count})")?;
        }
    }
    Ok(())
}

pub fn simulation_csv<W: Write>(out: &mut W, report: &SimulationReport) -> Result<()> {
    writeln!(out, "destination_id,referrals,fallback_referrals,share")?;
    for (destination, count) in &report.destination_counts {
        let fallback = report
            .fallback_destination_counts
            .get(destination)
            .copied()
            .unwrap_or(0);
        let share = ratio(count_to_f64(*count), report.patients_success);
        writeln!(out, "{destination},{count},{fallback},{share:.4}")?;
    }
    Ok(())
}

pub fn scenarios_console<W: Write>(
    out: &mut W,
    outcomes: &[ScenarioOutcome],
    ranking: &[ScenarioRank],
) -> Result<()> {
    writeln!(out, "{}", "🧪 Scenario Results".bright_cyan().bold())?;
    writeln!(out, "{}", "===================".cyan())?;
    for outcome in outcomes {
        let m = &outcome.metrics;
        let status = if m.patients_failed == 0 {
            "✅".green()
        } else {
            "⚠️".yellow()
        };
        writeln!(
            out,
            "{status} {} [{}]: {}/{} placed, {} fallbacks, HHI {:.3}, entropy {:.3}",
            outcome.scenario.bold(),
            outcome.network,
            m.patients_success,
            m.patients_total,
            m.fallbacks_used,
            m.concentration_hhi,
            m.balance_entropy
        )?;
    }
    writeln!(out)?;
    writeln!(out, "{}", "🏆 Ranking".bright_yellow().bold())?;
    writeln!(out, "{}", "==========".yellow())?;
    for row in ranking {
        writeln!(
            out,
            "{:>2}. {:<26} composite {:>8.2}  (score {:.2}, fallbacks {}, failures {})",
            row.rank, row.scenario, row.composite, row.avg_score, row.fallbacks, row.failures
        )?;
    }
    Ok(())
}

pub fn scenarios_markdown<W: Write>(out: &mut W, ranking: &[ScenarioRank]) -> Result<()> {
    writeln!(out, "# CarePath Scenario Summary\n")?;
    if ranking.is_empty() {
        writeln!(out, "_No scenarios executed._")?;
        return Ok(());
    }
    writeln!(
        out,
        "| Rank | Scenario | Avg score | Avg wait | Avg travel | Fallbacks | Failures | HHI | Entropy | Composite |"
    )?;
    writeln!(out, "|---:|---|---:|---:|---:|---:|---:|---:|---:|---:|")?;
    for row in ranking {
        writeln!(
            out,
            "| {} | {} | {:.2} | {:.2} | {:.2} | {} | {} | {:.3} | {:.3} | {:.2} |",
            row.rank,
            row.scenario,
            row.avg_score,
            row.avg_wait,
            row.avg_travel,
            row.fallbacks,
            row.failures,
            row.hhi,
            row.entropy,
            row.composite
        )?;
    }
    if let (Some(best), Some(worst)) = (ranking.first(), ranking.last()) {
        writeln!(out, "\n## Recommendation\n")?;
        writeln!(
            out,
            "- Recommended primary setup: `{}` (lowest composite `{:.2}`).",
            best.scenario, best.composite
        )?;
        writeln!(out, "- Keep `{}` as stress-test baseline.", worst.scenario)?;
        if best.fallbacks == 0 {
            writeln!(out, "- The recommended setup never needed the relaxed fallback.")?;
        }
    }
    Ok(())
}

pub fn scenarios_csv<W: Write>(out: &mut W, ranking: &[ScenarioRank]) -> Result<()> {
    writeln!(
        out,
        "rank,scenario,avg_score,avg_wait,avg_travel,fallbacks,failures,hhi,entropy,composite"
    )?;
    for row in ranking {
        writeln!(
            out,
            "{},{},{:.4},{:.4},{:.4},{},{},{:.4},{:.4},{:.4}",
            row.rank,
            row.scenario,
            row.avg_score,
            row.avg_wait,
            row.avg_travel,
            row.fallbacks,
            row.failures,
            row.hhi,
            row.entropy,
            row.composite
        )?;
    }
    Ok(())
}

pub fn benchmark_console<W: Write>(out: &mut W, report: &BenchmarkReport) -> Result<()> {
    writeln!(out, "{}", "⚖️  Policy Benchmark".bright_cyan().bold())?;
    writeln!(out, "{}", "===================".cyan())?;
    writeln!(
        out,
        "{} -> {} over {} episodes (seed base {})",
        report.source_id, report.speciality, report.episodes, report.seed_base
    )?;
    writeln!(out, "Destinations: {}", report.destination_ids.join(", "))?;
    writeln!(out)?;
    for metrics in &report.policies {
        writeln!(out, "{}", metrics.policy.bold())?;
        writeln!(
            out,
            "   Reward/episode : {:.3} (±{:.3})",
            metrics.avg_reward_per_episode, metrics.reward_std_dev
        )?;
        writeln!(
            out,
            "   Overloads      : {:.2}/episode ({:.1}%)",
            metrics.avg_overloads_per_episode,
            metrics.overload_rate * 100.0
        )?;
        writeln!(
            out,
            "   Travel / wait  : {:.1} / {:.1} min",
            metrics.avg_travel, metrics.avg_wait
        )?;
        writeln!(
            out,
            "   HHI / entropy  : {:.3} / {:.3}",
            metrics.hhi, metrics.entropy_norm
        )?;
        if metrics.fallback_decisions > 0 {
            writeln!(
                out,
                "   Fallbacks      : {} ({:.1}%)",
                metrics.fallback_decisions.to_string().yellow(),
                metrics.fallback_rate * 100.0
            )?;
        }
        if metrics.failed_decisions > 0 {
            writeln!(
                out,
                "   Failures       : {} ({:.1}%)",
                metrics.failed_decisions.to_string().red(),
                metrics.failure_rate * 100.0
            )?;
        }
    }
    writeln!(out)?;
    writeln!(out, "{}", "🏆 Ranking".bright_yellow().bold())?;
    writeln!(out, "{}", "==========".yellow())?;
    writeln!(out, "By reward    : {}", report.reward_ranking.join(" > "))?;
    let composite: Vec<String> = report
        .composite_ranking
        .iter()
        .map(|score| format!("{} ({:.3})", score.policy, score.composite))
        .collect();
    writeln!(out, "By composite : {}", composite.join(" > "))?;
    Ok(())
}

pub fn benchmark_markdown<W: Write>(out: &mut W, report: &BenchmarkReport) -> Result<()> {
    writeln!(out, "# CarePath Policy Benchmark\n")?;
    writeln!(
        out,
        "Source `{}`, speciality `{}`, {} episodes.\n",
        report.source_id, report.speciality, report.episodes
    )?;
    writeln!(
        out,
        "| Policy | Reward/episode | Overloads/episode | Overload rate | Avg travel | Avg wait | HHI | Entropy | Fallback rate | Failure rate |"
    )?;
    writeln!(out, "|---|---:|---:|---:|---:|---:|---:|---:|---:|---:|")?;
    for m in &report.policies {
        writeln!(
            out,
            "| {} | {:.3} | {:.2} | {:.3} | {:.2} | {:.2} | {:.3} | {:.3} | {:.3} | {:.3} |",
            m.policy,
            m.avg_reward_per_episode,
            m.avg_overloads_per_episode,
            m.overload_rate,
            m.avg_travel,
            m.avg_wait,
            m.hhi,
            m.entropy_norm,
            m.fallback_rate,
            m.failure_rate
        )?;
    }
    writeln!(out, "\n## Composite ranking\n")?;
    for (idx, score) in report.composite_ranking.iter().enumerate() {
        writeln!(out, "{}. `{}`: {:.3}", idx + 1, score.policy, score.composite)?;
    }
    Ok(())
}

pub fn benchmark_csv<W: Write>(out: &mut W, report: &BenchmarkReport) -> Result<()> {
    writeln!(
        out,
        "policy,episodes,avg_reward_per_episode,avg_overloads_per_episode,overload_rate,avg_travel,avg_wait,hhi,entropy_norm,fallback_rate,failure_rate"
    )?;
    for m in &report.policies {
        writeln!(
            out,
            "{},{},{:.6},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
            m.policy,
            m.episodes,
            m.avg_reward_per_episode,
            m.avg_overloads_per_episode,
            m.overload_rate,
            m.avg_travel,
            m.avg_wait,
            m.hhi,
            m.entropy_norm,
            m.fallback_rate,
            m.failure_rate
        )?;
    }
    Ok(())
}
