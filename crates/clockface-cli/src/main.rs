use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use clockface_core::{ImageSource, PixelHashModel, SensorScan};
use clockface_store::SqliteStore;
use clockfaced::engine::{spawn_engine, EngineHandle};
use clockfaced::session::{ContinuousSession, ScanOutcome, SensorPrompt, SessionConfig};
use clockfaced::stubs::{FullFrameDetector, OfflineSource, StaticImageSource};
use clockfaced::{
    run_enrollment, Config, EmployeeDirectory, EnrollmentRun, JsonDirectory,
    RegistrationOrchestrator,
};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clockface", about = "Clockface kiosk operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-run face registration for every employee in the directory
    RegisterAll,
    /// Print registration coverage as JSON
    Diagnostics,
    /// Identify the person in an image file against the enrolled gallery
    Identify {
        /// Path to the probe image
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Run the continuous identification loop until Ctrl-C, printing events
    Watch {
        /// Path to the image served as each capture
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Enroll an employee's fingerprint (scans simulated on stdin)
    Enroll {
        /// Employee id from the directory
        id: String,
    },
    /// Remove all biometric records for an employee
    Unenroll {
        id: String,
    },
}

/// Simulated sensor for bring-up without fingerprint hardware: each prompt
/// reads one stdin line. Enter captures a scan, `f` misreads, `c` cancels.
struct StdinSensor {
    device_id: String,
}

impl SensorPrompt for StdinSensor {
    fn authenticate(&mut self) -> Pin<Box<dyn Future<Output = ScanOutcome> + Send + '_>> {
        let device_id = self.device_id.clone();
        Box::pin(async move {
            println!("place finger [Enter=scan, f=misread, c=cancel]:");
            let line = tokio::task::spawn_blocking(|| {
                let mut buf = String::new();
                std::io::stdin().read_line(&mut buf).map(|n| (n, buf))
            })
            .await;
            match line {
                Ok(Ok((0, _))) => ScanOutcome::UserCancelled,
                Ok(Ok((_, input))) => match input.trim() {
                    "f" => ScanOutcome::Failed,
                    "c" => ScanOutcome::UserCancelled,
                    _ => ScanOutcome::Success(SensorScan { timestamp: Utc::now(), device_id }),
                },
                _ => ScanOutcome::Error { message: "stdin unavailable".into() },
            }
        })
    }
}

struct Services {
    store: Arc<SqliteStore>,
    directory: Arc<JsonDirectory>,
    engine: EngineHandle,
    config: Config,
}

fn open_services(source: Box<dyn ImageSource + Send>) -> Result<Services> {
    let config = Config::from_env();
    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?,
    );
    let directory = Arc::new(JsonDirectory::load(&config.directory_path)?);
    let engine = spawn_engine(
        source,
        Box::new(FullFrameDetector),
        Box::new(PixelHashModel::new(config.extractor.embedding_dim)),
        config.extractor.clone(),
        config.matcher.clone(),
        store.clone(),
    );
    Ok(Services { store, directory, engine, config })
}

fn orchestrator(services: &Services) -> RegistrationOrchestrator {
    RegistrationOrchestrator::new(
        services.directory.clone(),
        services.engine.clone(),
        services.store.clone(),
        services.store.clone(),
        services.config.detection_mode,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RegisterAll => {
            let services = open_services(Box::new(OfflineSource))?;
            let report = orchestrator(&services).reprocess_all().await?;
            for entry in &report.outcomes {
                println!("{}: {:?}", entry.employee_id, entry.outcome);
            }
            println!("registered {}/{}", report.processed, report.outcomes.len());
        }
        Commands::Diagnostics => {
            let services = open_services(Box::new(OfflineSource))?;
            let diagnostics = orchestrator(&services).diagnostics()?;
            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
        }
        Commands::Identify { image } => {
            let services = open_services(Box::new(StaticImageSource::new(image)))?;
            match services.engine.identify(services.config.detection_mode).await? {
                Some(found) => {
                    println!(
                        "{} (score {:.3}, {:?} confidence)",
                        found.employee_id, found.score, found.tier
                    );
                }
                None => println!("no match"),
            }
        }
        Commands::Watch { image } => {
            let services = open_services(Box::new(StaticImageSource::new(image)))?;
            let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

            let printer = tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(err) => eprintln!("event encoding failed: {err}"),
                    }
                }
            });

            let session = ContinuousSession::face(
                services.engine.clone(),
                services.config.detection_mode,
                services.directory.clone(),
                Box::new(event_tx),
                SessionConfig {
                    retry_cooldown: services.config.retry_cooldown,
                    success_hold: services.config.success_hold,
                    cancel_restart_delay: services.config.cancel_restart_delay,
                    max_consecutive_errors: services.config.max_consecutive_errors,
                },
                shutdown_rx,
            );
            let mut task = tokio::spawn(session.run());
            // Ctrl-C requests shutdown; a fatal session error ends the loop
            // on its own.
            let result = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = shutdown_tx.send(true);
                    task.await?
                }
                res = &mut task => res?,
            };
            if let Err(err) = result {
                eprintln!("session ended: {err}");
            }
            let _ = printer.await;
        }
        Commands::Enroll { id } => {
            let services = open_services(Box::new(OfflineSource))?;
            let Some(employee) = services.directory.get(&id)? else {
                bail!("unknown employee id: {id}");
            };

            let session = clockface_core::EnrollmentSession::begin(
                &employee.id,
                &employee.display_name,
                &services.config.device_id,
                services.config.enrollment.clone(),
            );
            let mut sensor = StdinSensor { device_id: services.config.device_id.clone() };
            match run_enrollment(&mut sensor, session, &*services.store).await? {
                EnrollmentRun::Enrolled(template) => {
                    println!("enrolled {} at {}", template.employee_id, template.created_at);
                }
                EnrollmentRun::Cancelled => println!("enrollment cancelled"),
                EnrollmentRun::Failed(err) => println!("enrollment failed: {err}"),
            }
        }
        Commands::Unenroll { id } => {
            let services = open_services(Box::new(OfflineSource))?;
            if orchestrator(&services).unenroll(&id)? {
                println!("removed biometric records for {id}");
            } else {
                println!("no records for {id}");
            }
        }
    }

    Ok(())
}
