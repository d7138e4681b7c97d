use crate::cmd::model_rows;
use crate::output::{print_json, print_table};
use crate::plan_file::{LoadedPlan, PlanFile};
use anyhow::Context;
use reconf_model::{ActionId, DependencyMonitor, Model};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ActionRow {
    id: usize,
    kind: String,
    action: String,
    start: u32,
    end: u32,
    depends_on: Vec<usize>,
}

#[derive(Serialize)]
struct CheckOutput {
    actions: Vec<ActionRow>,
    duration: u32,
    applicable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Model>,
}

pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let LoadedPlan { plan, .. } = PlanFile::load(path)?;
    let monitor = DependencyMonitor::new(&plan);

    let actions: Vec<ActionRow> = plan
        .iter()
        .map(|(id, action)| ActionRow {
            id: id.index(),
            kind: action.kind().to_string(),
            action: action.to_string(),
            start: action.start(),
            end: action.end(),
            depends_on: monitor
                .dependencies(id)
                .map(|deps| deps.iter().map(|d: &ActionId| d.index()).collect())
                .unwrap_or_default(),
        })
        .collect();

    let outcome = plan.apply_sequentially();

    if json {
        let output = CheckOutput {
            actions,
            duration: plan.duration(),
            applicable: outcome.is_ok(),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            result: outcome.as_ref().ok().cloned(),
        };
        print_json(&output)?;
    } else {
        let rows: Vec<Vec<String>> = actions
            .iter()
            .map(|a| {
                let deps: Vec<String> = a.depends_on.iter().map(|d| format!("#{d}")).collect();
                vec![
                    format!("#{}", a.id),
                    a.kind.clone(),
                    a.start.to_string(),
                    a.end.to_string(),
                    deps.join(", "),
                ]
            })
            .collect();
        print_table(&["ID", "KIND", "START", "END", "DEPENDS ON"], &rows);

        if let Ok(model) = &outcome {
            println!();
            print_table(&["ELEMENT", "STATE", "VMS"], &model_rows(model));
            println!();
            println!(
                "Plan is applicable: {} action(s), duration {}",
                plan.len(),
                plan.duration()
            );
        }
    }

    outcome
        .map(|_| ())
        .with_context(|| format!("{} cannot be applied", path.display()))
}
