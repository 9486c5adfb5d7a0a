use limit_order_book::{EngineSettings, Replay, Script};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Logs go to stderr, stdout carries the audit trail
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "limit_order_book=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(script_path) = args.next() else {
        eprintln!("usage: limit-order-book <script.json> [settings.json]");
        std::process::exit(2);
    };

    let settings = match args.next() {
        Some(path) => EngineSettings::from_json_file(path)?,
        None => EngineSettings::from_env()?,
    };
    let script = Script::from_json_file(&script_path)?;
    tracing::info!(script = %script_path, commands = script.commands.len(), "loaded replay script");

    let replay = Replay::for_script(&settings, &script)?;

    // Print every audit record as one JSON line. The channel holds the whole
    // script, so the printer cannot fall behind.
    let mut records = replay.engine().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match records.recv().await {
                Ok(record) => match serde_json::to_string(&record) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!(error = %e, "failed to encode audit record"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "audit printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let summary = tokio::task::block_in_place(|| replay.run(&script));
    if let Err(violation) = replay.engine().check_conservation() {
        tracing::error!(%violation, "escrow conservation check failed");
    }

    // Dropping the engine closes the channel and ends the printer
    drop(replay);
    printer.await?;

    tracing::info!(
        executed = summary.executed,
        failed = summary.failures.len(),
        "replay finished"
    );
    for failure in &summary.failures {
        eprintln!("command {} failed: {}", failure.index, failure.error);
    }
    Ok(())
}
