use super::load_context;
use crate::cli::StatusArgs;
use crate::error::Result;
use mcccs_flow::workflows::flow::{self, JobStatus};
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::info;

fn join(items: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    let joined: Vec<String> = items.into_iter().map(|s| s.as_ref().to_string()).collect();
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined.join(", ")
    }
}

fn render(statuses: &[JobStatus]) -> String {
    let mut out = String::new();
    let mut by_state: BTreeMap<String, usize> = BTreeMap::new();

    for st in statuses {
        let short = st.job_id.get(..8).unwrap_or(&st.job_id);
        let _ = writeln!(out, "{}  {}", short, st.state);
        let _ = writeln!(out, "    labels:   {}", join(st.labels.iter()));
        let _ = writeln!(
            out,
            "    eligible: {}",
            join(st.eligible.iter().map(|op| op.name()))
        );
        *by_state.entry(st.state.to_string()).or_default() += 1;
    }

    let summary: Vec<String> = by_state
        .iter()
        .map(|(state, n)| format!("{} {}", n, state))
        .collect();
    let _ = writeln!(out, "{} job(s): {}", statuses.len(), join(summary));
    out
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let (project, config) = load_context(&args.project)?;
    let statuses =
        tokio::task::block_in_place(|| flow::status(&project, &config, &args.jobs))?;
    info!("Collected status of {} job(s).", statuses.len());
    print!("{}", render(&statuses));
    Ok(())
}
