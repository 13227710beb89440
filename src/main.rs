use std::process::ExitCode;
use std::sync::Arc;

use mailvisor::{Config, LogWriter, Subscribe, Supervisor};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: mailvisor [--no-web-server] [CONFIG.toml]";

struct Args {
    config: Option<String>,
    no_web_server: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        no_web_server: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--no-web-server" => args.no_web_server = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with('-') => return Err(format!("unknown flag {flag}\n{USAGE}")),
            path if args.config.is_none() => args.config = Some(path.to_string()),
            _ => return Err(USAGE.to_string()),
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    // Child output owns stdout; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(2);
        }
    };

    let mut cfg = match args.config.as_deref().map(Config::load).transpose() {
        Ok(cfg) => cfg.unwrap_or_default(),
        Err(e) => {
            tracing::error!(error = %e, label = e.as_label(), "invalid configuration");
            return ExitCode::from(2);
        }
    };
    if args.no_web_server {
        cfg.web_server = false;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async move {
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
        let sup = Supervisor::builder(cfg)
            .with_subscribers(subs)
            .with_restart_on_exit()
            .build();
        tracing::info!("mailvisor started");
        sup.run().await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, label = e.as_label(), "supervisor stopped with error");
            ExitCode::FAILURE
        }
    }
}
