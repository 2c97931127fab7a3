use crate::cli::InitArgs;
use crate::error::{CliError, Result};
use mcccs_flow::core::job::Project;
use mcccs_flow::core::sweep::Sweep;
use tracing::info;

pub async fn run(args: InitArgs) -> Result<()> {
    std::fs::create_dir_all(&args.project)?;
    let project = Project::open(&args.project)?;

    info!("Loading state points from {:?}", &args.statepoints);
    let sweep = Sweep::load(&args.statepoints).map_err(|e| CliError::FileParsing {
        path: args.statepoints.clone(),
        source: e.into(),
    })?;

    let mut created = 0;
    for sp in sweep.statepoints {
        let existed = project.job(&sp.id()).is_ok();
        let job = project.init_job(sp)?;
        if !existed {
            created += 1;
        }
        let sp = job.statepoint();
        println!(
            "{} {} {} {} T={} K replica {}",
            job.short_id(),
            sp.engine,
            sp.molecule,
            sp.ensemble,
            sp.temperature,
            sp.replica
        );
    }

    println!(
        "✓ {} new job(s) under {}",
        created,
        project.workspace_dir().display()
    );
    Ok(())
}
