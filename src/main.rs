//! DAGMan monitor daemon.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use dagman_monitor::cli::Cli;
use dagman_monitor::config::{ConfigLoader, MonitorConfig};
use dagman_monitor::daemon::{
    default_probe, init_tracing, signals, DaemonContext, DaemonError, LogLevelControl, PidFile,
    PID_FILE,
};
use dagman_monitor::events::{default_destination, EventSink, JsonLinesSink, NullSink};
use dagman_monitor::registry::{rotate_file, SubworkflowRegistry, REGISTRY_FILE};
use dagman_monitor::scheduler::Scheduler;
use dagman_monitor::workflow::{daemon_dir, WorkflowSpec, RECOVERY_FILE};

fn open_sink(config: &MonitorConfig, dagman_out: &Path) -> Result<Box<dyn EventSink>, DaemonError> {
    if !config.events.enabled {
        tracing::info!("Event output disabled");
        return Ok(Box::new(NullSink));
    }
    let dest = config
        .events
        .dest
        .clone()
        .unwrap_or_else(|| default_destination(dagman_out).display().to_string());
    Ok(Box::new(JsonLinesSink::open(&dest)?))
}

async fn run(cli: Cli, log: LogLevelControl) -> Result<i32, DaemonError> {
    let dagman_out = cli.output_log()?;
    let config = cli.apply(ConfigLoader::with_override(cli.conf.clone()).load()?)?;

    let run_dir = dagman_out
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let own_dir = daemon_dir(&run_dir, config.output_dir.as_deref());
    std::fs::create_dir_all(&own_dir).map_err(|source| DaemonError::DaemonDir {
        path: own_dir.clone(),
        source,
    })?;

    let probe = default_probe();
    let _lock = PidFile::acquire(own_dir.join(PID_FILE), config.force, probe.as_ref())?;

    let registry_path = own_dir.join(REGISTRY_FILE);
    if config.replay || own_dir.join(RECOVERY_FILE).exists() {
        rotate_file(&registry_path)?;
    }
    let registry = SubworkflowRegistry::open(&registry_path)?;
    let sink = open_sink(&config, &dagman_out)?;

    let ctx = DaemonContext::new(log);
    let _signals = signals::install(Arc::clone(&ctx.signals)).map_err(DaemonError::Signals)?;

    let mut scheduler = Scheduler::new(&config, registry, sink)?.with_probe(probe);
    scheduler.track(WorkflowSpec::root(&dagman_out));
    tracing::info!(
        dagman_out = %dagman_out.display(),
        replay = config.replay,
        "Monitor started"
    );

    let report = scheduler.run(&ctx).await?;
    for summary in &report.summaries {
        tracing::info!(
            dagman_out = %summary.dagman_out.display(),
            wf_uuid = summary.wf_uuid.as_deref().unwrap_or("-"),
            engine_exit = ?summary.engine_exit,
            exit = summary.exit.code(),
            "Workflow summary"
        );
    }
    Ok(report.exit_code())
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = match init_tracing(cli.verbose, cli.log_file.as_deref()) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("dagman-monitord: {e}");
            return exit_code(e.exit_code());
        }
    };

    match run(cli, log).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            tracing::error!(error = %e, "Monitor failed");
            exit_code(e.exit_code())
        }
    }
}
