use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EPILEDGER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // stdout carries JSON envelopes; logs go to stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    epiledger::run()?;
    Ok(())
}
