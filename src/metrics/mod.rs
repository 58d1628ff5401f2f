use autometrics::prometheus_exporter::{self, PrometheusResponse};
use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};
use tokio::sync::watch;
use warp::{Filter, Rejection, Reply};

lazy_static! {
    pub static ref CACHE_INVALIDATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "cache_invalidations",
            "Cache keys invalidated by the subscription router"
        ),
        &["namespace"]
    )
    .expect("metric can not be created");

    pub static ref CATCHUP_SWEEPS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "catchup_sweeps",
            "Catch-up invalidation sweeps run after a feed reconnect"
        ),
        &["entity"]
    )
    .expect("metric can not be created");

    pub static ref FEED_RECONNECTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "feed_reconnects",
            "Change-feed channels re-established after a disconnect"
        ),
        &["entity"]
    )
    .expect("metric can not be created");

    pub static ref WEBHOOK_DELIVERIES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "webhook_deliveries",
            "Billing webhook deliveries by reconciliation outcome"
        ),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref BILLING_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "billing_transitions",
            "Billing records written, labelled by resulting status"
        ),
        &["status"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(CACHE_INVALIDATIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CATCHUP_SWEEPS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(FEED_RECONNECTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WEBHOOK_DELIVERIES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BILLING_TRANSITIONS.clone()))
        .expect("collector can be registered");
}

pub async fn start_server(port: u16, mut shutdown_signal: watch::Receiver<()>) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        eprintln!("could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer.clone()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    buffer.clear();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        eprintln!("could not encode prometheus metrics: {}", e);
    };
    let res_custom = match String::from_utf8(buffer.clone()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("prometheus metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    buffer.clear();

    let autometrics_metrics = get_metrics_body();
    res.push_str(&res_custom);
    res.push_str(&autometrics_metrics);
    Ok(res)
}

/// Export metrics for Prometheus to scrape
pub fn get_metrics_body() -> String {
    let autometrics_response = prometheus_exporter::encode_http_response();
    autometrics_response.into_body()
}
/// Export metrics for Prometheus to scrape
pub fn get_metrics() -> PrometheusResponse {
    prometheus_exporter::encode_http_response()
}
