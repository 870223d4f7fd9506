use std::{net::SocketAddr, sync::Arc};

use prodash_table::{
    fetch_config_from_env, init_logging, log_app_bind, log_app_start, log_source_selected,
    logging_config_from_env, table_router, InMemoryTableSource, LiveTableSource,
    ReqwestDatasetFetcher, SourceSelection, TableSnapshotSource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let addr: SocketAddr = std::env::var("PRODASH_TABLE_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;

    let source = source_from_env()?;
    let app = table_router(source);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn source_from_env() -> Result<Arc<dyn TableSnapshotSource>, Box<dyn std::error::Error>> {
    let force_demo = std::env::var("PRODASH_TABLE_USE_DEMO")
        .map(|raw| raw == "1" || raw.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if force_demo {
        log_source_selected(SourceSelection::Demo {
            reason: "PRODASH_TABLE_USE_DEMO",
        });
        return Ok(Arc::new(InMemoryTableSource::demo()));
    }

    let cfg = fetch_config_from_env();
    let fetcher = ReqwestDatasetFetcher::new(cfg.timeout_ms)?;
    log_source_selected(SourceSelection::Live {
        api_base: &cfg.base_url,
        datasets_base: &cfg.datasets_base_url,
    });
    Ok(Arc::new(LiveTableSource::new(Arc::new(fetcher), cfg)))
}
