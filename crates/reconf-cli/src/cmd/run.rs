use crate::cmd::model_rows;
use crate::output::{print_json, print_table};
use crate::plan_file::{LoadedPlan, PlanFile};
use chrono::{DateTime, Utc};
use clap::Args;
use reconf_executor::{ExecutorError, Executor};
use reconf_model::Model;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

#[derive(Args)]
pub struct RunArgs {
    /// Plan file (YAML)
    pub plan: PathBuf,

    /// Maximum number of actuators executing at once
    #[arg(long, env = "RECONF_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// Wall-clock milliseconds per plan time unit
    #[arg(long)]
    pub time_unit_ms: Option<u64>,

    /// Make the action at this index fail (repeatable). Rejected when another
    /// action of the plan is identical to it
    #[arg(long, value_name = "INDEX")]
    pub fail: Vec<usize>,
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Serialize)]
struct RunReport {
    run_id: String,
    plan: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    elapsed_ms: i64,
    status: RunStatus,
    actions: usize,
    max_concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_action: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<Model>,
}

pub fn run(args: RunArgs, json: bool) -> anyhow::Result<()> {
    let LoadedPlan {
        plan,
        mut executor,
        mut simulation,
    } = PlanFile::load(&args.plan)?;

    if let Some(n) = args.max_concurrency {
        executor.max_concurrency = n;
    }
    if let Some(ms) = args.time_unit_ms {
        simulation.time_unit_ms = ms;
    }
    simulation.fail.extend(args.fail);

    let factory = simulation.factory(&plan)?;
    let run_id = Uuid::new_v4();
    let actions = plan.len();
    let max_concurrency = executor.max_concurrency;
    info!(%run_id, plan = %args.plan.display(), actions, "run");

    let started_at = Utc::now();
    let result = Executor::new(plan, factory).with_config(executor).execute();
    let finished_at = Utc::now();

    let report = RunReport {
        run_id: run_id.to_string(),
        plan: args.plan.display().to_string(),
        started_at,
        finished_at,
        elapsed_ms: (finished_at - started_at).num_milliseconds(),
        status: if result.is_ok() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        },
        actions,
        max_concurrency,
        failed_action: result
            .as_ref()
            .err()
            .and_then(ExecutorError::action_id)
            .map(|id| id.index()),
        error: result.as_ref().err().map(|e| e.to_string()),
        model: result.as_ref().ok().cloned(),
    };

    if json {
        print_json(&report)?;
    } else if let Some(model) = &report.model {
        print_table(&["ELEMENT", "STATE", "VMS"], &model_rows(model));
        println!();
        println!(
            "Executed {} action(s) in {} ms (run {})",
            report.actions, report.elapsed_ms, report.run_id
        );
    }

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_internal() => Err(anyhow::Error::new(e).context("internal error")),
        Err(e) => Err(anyhow::Error::new(e).context(format!("run {run_id} failed"))),
    }
}
