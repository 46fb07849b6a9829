//! ops-runner: headless operator console for the settlement core.
//!
//! Usage:
//!   ops-runner status    --db settle.db --period 2026-08-01
//!   ops-runner archive   --db settle.db --period 2026-08-01 --admin alice
//!   ops-runner cleanup   --db settle.db --period 2026-08-01 --admin alice
//!   ops-runner validate  --db settle.db --period 2026-08-01
//!   ops-runner restore   --db settle.db --period 2026-08-01 --admin alice
//!   ops-runner recompute --db settle.db --period 2026-08-01 --admin alice \
//!                        --eur 1.02 --gbp 1.21 --cop 4100
//!   ops-runner set-rates --db settle.db --eur 1.01 --gbp 1.20 --cop 4000
//!   ops-runner report    --db settle.db --period 2026-08-01 [--groups g1,g2]
//!   ops-runner audit     --db settle.db --period 2026-08-01
//!
//! Lock-held and out-of-order rejections are informational: the tool
//! prints the current status and exits 0, because callers poll.

use anyhow::{bail, Result};
use chrono::Utc;
use settle_core::{
    aggregator::{aggregate, global_totals, Scope},
    calculator::{round_cop, round_usd},
    lifecycle::ArchiveOutcome,
    store::{PeriodState, SettleStore},
    Period, PeriodLifecycleManager, RateSet, SettleConfig, SettleError,
};
use std::collections::HashSet;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).filter(|a| !a.starts_with("--")) else {
        bail!("usage: ops-runner <status|archive|cleanup|validate|restore|recompute|set-rates|report|audit> [flags]");
    };

    let db = flag(&args, "--db").unwrap_or_else(|| "settle.db".to_string());
    let data_dir = flag(&args, "--data-dir");
    let admin = flag(&args, "--admin").unwrap_or_else(|| "operator".to_string());
    let period = match flag(&args, "--period") {
        Some(p) => Period::parse(&p)?,
        None => Period::containing(Utc::now().date_naive()),
    };

    let config = match &data_dir {
        Some(dir) => SettleConfig::load(dir)?,
        None => SettleConfig::builtin(),
    };

    let store = SettleStore::open(&db)?;
    store.migrate()?;
    log::debug!("database {db} ready");
    let manager = PeriodLifecycleManager::new(store, &config);
    let json = args.iter().any(|a| a == "--json");

    match command.as_str() {
        "status" if json => {
            println!("{}", serde_json::to_string_pretty(&manager.status(&period)?)?)
        }
        "status" => status(&manager, &period)?,
        "validate" if json => println!(
            "{}",
            serde_json::to_string_pretty(&manager.cleanup_validation(&period)?)?
        ),
        "validate" => validate(&manager, &period)?,
        "archive" => archive(&manager, &period, &admin)?,
        "cleanup" => cleanup(&manager, &period, &admin)?,
        "restore" => restore(&manager, &period, &admin)?,
        "recompute" => recompute(&manager, &period, &admin, &args)?,
        "set-rates" => set_rates(&manager, &args)?,
        "report" => report(&manager, &period, &args)?,
        "audit" => audit(&manager, &period)?,
        other => bail!("unknown command '{other}'"),
    }
    Ok(())
}

fn flag(args: &[String], name: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].clone())
}

fn rate_flags(args: &[String]) -> Result<RateSet> {
    let get = |name: &str| -> Result<f64> {
        flag(args, name)
            .ok_or_else(|| anyhow::anyhow!("missing {name}"))?
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("bad {name}: {e}"))
    };
    Ok(RateSet {
        eur_usd: get("--eur")?,
        gbp_usd: get("--gbp")?,
        usd_cop: get("--cop")?,
    })
}

fn status(manager: &PeriodLifecycleManager, period: &Period) -> Result<()> {
    let status = manager.status(period)?;
    println!("period:      {} ({})", period.key(), period.label());
    println!("state:       {}", status.state.as_str());
    println!("archived:    {}", status.archived);
    println!("in_progress: {}", status.in_progress);
    match status.lock {
        Some(lock) => println!("lock:        {} held by {}", lock.operation, lock.holder),
        None => println!("lock:        none"),
    }
    Ok(())
}

fn validate(manager: &PeriodLifecycleManager, period: &Period) -> Result<()> {
    let v = manager.cleanup_validation(period)?;
    println!("can_cleanup: {}", v.can_cleanup);
    for err in &v.validation_errors {
        println!("  - {err}");
    }
    println!(
        "stats: {} raw values across {} models, {} archived, {} frozen platforms",
        v.stats.raw_value_rows,
        v.stats.models_with_values,
        v.stats.archived_models,
        v.stats.frozen_platforms
    );
    Ok(())
}

fn archive(manager: &PeriodLifecycleManager, period: &Period, admin: &str) -> Result<()> {
    match manager.archive(period, admin) {
        Ok(ArchiveOutcome::Complete { models }) => {
            println!("archived {} ({models} models)", period.key());
        }
        Ok(ArchiveOutcome::Partial { archived, failed }) => {
            println!(
                "partial archive of {}: {archived} models archived, {} failed — retry",
                period.key(),
                failed.len()
            );
            for f in failed {
                println!("  {}: {}", f.model_id, f.reason);
            }
        }
        Err(e) => return informational(manager, period, e),
    }
    Ok(())
}

fn cleanup(manager: &PeriodLifecycleManager, period: &Period, admin: &str) -> Result<()> {
    match manager.cleanup(period, admin) {
        Ok(report) => println!(
            "cleaned {}: {} values cleared, {} platforms unfrozen, {} now open",
            period.key(),
            report.cleared_values,
            report.unfrozen,
            report.next_period.key()
        ),
        Err(e) => return informational(manager, period, e),
    }
    Ok(())
}

fn restore(manager: &PeriodLifecycleManager, period: &Period, admin: &str) -> Result<()> {
    let restored = manager.restore(period, admin)?;
    println!(
        "restored {}: {restored} raw values repopulated from archive",
        period.key()
    );
    Ok(())
}

fn recompute(
    manager: &PeriodLifecycleManager,
    period: &Period,
    admin: &str,
    args: &[String],
) -> Result<()> {
    let rates = rate_flags(args)?;
    let models = manager.recompute_archived_period(period, &rates, admin)?;
    println!("rates corrected for {}: {models} models recomputed", period.key());
    Ok(())
}

fn set_rates(manager: &PeriodLifecycleManager, args: &[String]) -> Result<()> {
    let rates = rate_flags(args)?;
    manager
        .store()
        .upsert_rates(settle_core::rates::ACTIVE_SCOPE, &rates)?;
    println!(
        "active rates set: EUR/USD {} GBP/USD {} USD/COP {}",
        rates.eur_usd, rates.gbp_usd, rates.usd_cop
    );
    Ok(())
}

fn report(manager: &PeriodLifecycleManager, period: &Period, args: &[String]) -> Result<()> {
    let scope = match flag(args, "--groups") {
        Some(list) => Scope::Groups(
            list.split(',')
                .map(|s| s.trim().to_string())
                .collect::<HashSet<_>>(),
        ),
        None => Scope::Global,
    };

    // Archived periods report from the immutable snapshot; open ones
    // re-derive from live rows on every call.
    let status = manager.status(period)?;
    let earnings = if matches!(
        status.state,
        PeriodState::Archived | PeriodState::Cleaning | PeriodState::Cleaned
    ) {
        manager.archived_earnings(period)?
    } else {
        manager.compute_live_earnings(period)?
    };

    let hierarchy = manager.store().load_hierarchy()?;
    let sedes = aggregate(&earnings, &hierarchy, &scope);

    println!("report for {} ({})", period.label(), status.state.as_str());
    for sede in &sedes {
        println!(
            "sede {:<12} gross ${:>12.2}  model ${:>12.2}  agency ${:>12.2}",
            sede.sede_id,
            round_usd(sede.total_gross_usd),
            round_usd(sede.total_model_usd),
            round_usd(sede.agency_usd())
        );
        for group in &sede.groups {
            println!(
                "  group {:<10} ({:>3} models) gross ${:>12.2}  model ${:>12.2}  COP {:>16.0}",
                group.group_id,
                group.model_count,
                round_usd(group.total_gross_usd),
                round_usd(group.total_model_usd),
                round_cop(group.total_cop_model)
            );
        }
    }
    let global = global_totals(&sedes);
    println!(
        "global: {} sedes, {} models, gross ${:.2}, model ${:.2}, agency ${:.2}",
        global.sede_count,
        global.model_count,
        round_usd(global.total_gross_usd),
        round_usd(global.total_model_usd),
        round_usd(global.agency_usd())
    );
    Ok(())
}

fn audit(manager: &PeriodLifecycleManager, period: &Period) -> Result<()> {
    for entry in manager.audit_trail(period)? {
        println!(
            "[{}] {} by {}: {}",
            entry.created_at, entry.event_type, entry.actor, entry.payload
        );
    }
    Ok(())
}

/// Lock-held and precedence rejections are expected outcomes, not
/// failures; print the live status instead and exit cleanly.
fn informational(
    manager: &PeriodLifecycleManager,
    period: &Period,
    err: SettleError,
) -> Result<()> {
    match err {
        SettleError::LockHeld { operation, holder } => {
            println!("{operation} already in progress by {holder}");
            status(manager, period)
        }
        SettleError::Precedence { expected, actual } => {
            println!("rejected: period is '{actual}', operation expects '{expected}'");
            status(manager, period)
        }
        other => Err(other.into()),
    }
}
