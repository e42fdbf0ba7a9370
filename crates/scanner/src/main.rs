use clap::Parser;

#[derive(clap::Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    mode: Mode,
}

#[derive(clap::Subcommand, Debug)]
enum Mode {
    /// Serve scans on a recurring cadence until signaled to stop.
    Serve(scanner::ServeArgs),
    /// Run a single scan immediately, and print its summary as JSON.
    Scan(scanner::ScanArgs),
    /// Apply the alerts schema, and the task queue schema if a queue database is given.
    ApplySchema(scanner::ApplySchemaArgs),
}

fn main() -> Result<(), anyhow::Error> {
    // Use reasonable defaults for printing structured logs to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(!matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1"))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(runtime.spawn(async move {
        match cli.mode {
            Mode::Serve(args) => scanner::run_serve(args).await,
            Mode::Scan(args) => scanner::run_scan(args).await,
            Mode::ApplySchema(args) => scanner::run_apply_schema(args).await,
        }
    }));

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result?
}
