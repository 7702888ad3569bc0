mod cli;

use clap::Parser;
use cli::Cli;
use config::Config;
use detector::{
    ControlEvent, DetectorEngine, Inspector, NoopHardware, ProcessVmSnapshotter, ProcfsResolver,
    SelfPidSource, Services, TracingSink,
};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // NOTE: The verbosity flag takes precedence over the environment
    // variable for log control. `PEBS_SENTRY_LOG=warn pebs-sentry -vvv`
    // still logs at the trace level; the environment variable can only
    // set the level per crate, not override the verbosity flag.
    let env_filter = EnvFilter::builder()
        .with_env_var("PEBS_SENTRY_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    let layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    // load config
    let mut config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/pebs-sentry/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.insert(0, "/etc/pebs-sentry/config.toml".into());
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    if let Some(cores) = cli.cores {
        config.sampling.cores = Some(cores);
    }
    if cli.no_sample {
        config.sampling.dosample = false;
    }
    if cli.no_inspect {
        config.inspector.doinspect = false;
    }
    debug!(?config, ?cli);

    // The register backend is privileged and host-specific; the stock
    // binary runs with the no-op backend and the replay sample path.
    let services = Services {
        hardware: Box::new(NoopHardware),
        pids: Box::new(SelfPidSource),
    };
    let mut engine = DetectorEngine::new(config.clone(), services)?;
    let rings = engine.rings();

    let cancel = CancellationToken::new();
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let inspector_handle = config.inspector.doinspect.then(|| {
        let mut inspector = Inspector::new(
            &config,
            rings,
            Box::new(ProcfsResolver),
            Box::new(ProcessVmSnapshotter::new()),
            Box::new(TracingSink),
        );
        let inspector_cancel = cancel.clone();
        tokio::spawn(async move { inspector.run_until(inspector_cancel).await })
    });

    let engine_cancel = cancel.clone();
    let mut engine_handle = tokio::spawn(async move {
        let result = engine.run_until(engine_cancel, control_rx).await;
        engine.shutdown();
        result
    });

    // install signal handlers
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    let early_exit = loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT received");
                break None;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break None;
            }
            _ = sigusr1.recv() => {
                debug!("SIGUSR1 received, dumping status");
                let _ = control_tx.send(ControlEvent::DumpStatus);
            }
            res = &mut engine_handle => break Some(res),
        }
    };

    cancel.cancel();
    let engine_result = match early_exit {
        Some(res) => res,
        None => engine_handle.await,
    };
    engine_result??;

    if let Some(handle) = inspector_handle {
        handle.await?;
    }
    info!("stopped");
    Ok(())
}
