use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{Level, info, warn};

use crate::config::AppConfig;
use crate::core::manager::CacheManager;
use crate::core::parser::XmlDefParser;
use crate::interfaces::web::ApiServer;
use crate::logging;

pub(crate) async fn run(args: &[String]) -> Result<()> {
    let mut config = AppConfig::from_env();
    let mut verbose = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    config.host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    config.port = args[i + 1].parse().unwrap_or(config.port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--source" => {
                if i + 1 < args.len() {
                    config.source_path = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                verbose = true;
                i += 1;
            }
            _ => i += 1,
        }
    }

    let level = if verbose {
        Level::DEBUG
    } else {
        config.environment.default_log_level()
    };
    logging::init(level);
    info!(
        "Starting ctmview {} ({}). Source = {}",
        env!("CARGO_PKG_VERSION"),
        config.environment.name(),
        config.source_path.display()
    );
    if config.environment.is_production() && config.host == "127.0.0.1" {
        warn!("Production environment is serving on loopback only.");
    }

    let parser = Arc::new(XmlDefParser::new(&config.source_path));
    let manager = CacheManager::new(parser);
    ApiServer::new(config.host.clone(), config.port, manager)
        .run()
        .await
}
