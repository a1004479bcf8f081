mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use rf_core::config::Config;
use rf_core::params;
use rf_core::ExportRequest;
use std::path::Path;

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting renderforge");
    tracing::info!(
        "Render queue: {} concurrent, {} queued, outputs in {}",
        config.queue.max_concurrent,
        config.queue.max_queued,
        config.storage.output_dir.display()
    );

    rf_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the defaults.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "renderforge=trace,rf_server=debug,rf_jobs=debug,rf_av=debug,rf_media=debug,rf_core=debug,tower_http=debug".to_string()
        } else {
            "renderforge=info,rf_server=info,rf_jobs=info,rf_av=info,rf_media=info,rf_core=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(&config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Derive { request } => {
            let config = Config::load_or_default(cli.config.as_deref());
            derive(&request, &config)
        }
        Commands::Version => {
            println!("renderforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = rf_av::ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all().await {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing. Exports will fail until it is installed.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            Config::load(p).with_context(|| format!("loading {}", p.display()))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        for warning in &warnings {
            println!("! {warning}");
        }
    }
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Media dir: {}", config.storage.media_dir.display());
    println!("  Output dir: {}", config.storage.output_dir.display());
    println!(
        "  Queue: {} concurrent, {} queued, ttl {}s",
        config.queue.max_concurrent, config.queue.max_queued, config.queue.job_ttl_secs
    );
    println!(
        "  Soft limit: {}x{} @ {} fps",
        config.render.max_width, config.render.max_height, config.render.max_fps
    );

    Ok(())
}

fn derive(path: &Path, config: &Config) -> Result<()> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let request: ExportRequest = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    request.validate()?;

    let limits = config.render.limits();
    let requested = params::requested_render_params(&request.project, &request.settings);
    limits.check_ceiling(&requested)?;
    let derived = params::derive_render_params(&request.project, &request.settings, &limits);

    if derived != requested {
        eprintln!(
            "note: {}x{} @ {} fps exceeds the soft limit",
            requested.width, requested.height, requested.fps
        );
    }
    println!("{}", serde_json::to_string_pretty(&derived)?);
    Ok(())
}
