//! Prometheus metrics for presence, routing and the friend graph

use actix_web::HttpResponse;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static::lazy_static! {
    /// Identities currently bound to a live connection
    pub static ref ONLINE_IDENTITIES: IntGauge = register_int_gauge!(
        "chat_online_identities",
        "Identities with a live WebSocket connection"
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Routed events by kind (direct/group)
    pub static ref ROUTED_EVENTS: IntCounterVec = register_int_counter_vec!(
        "chat_routed_events_total",
        "Message events accepted by the router",
        &["kind"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Per-recipient delivery outcomes (delivered/offline/closed/refused)
    pub static ref DELIVERIES: IntCounterVec = register_int_counter_vec!(
        "chat_deliveries_total",
        "Per-recipient delivery attempts by outcome",
        &["outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Friend graph transitions by operation and result
    pub static ref FRIEND_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "chat_friend_transitions_total",
        "Friend graph operations by result",
        &["op", "result"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub fn record_delivery(outcome: &str) {
    DELIVERIES.with_label_values(&[outcome]).inc();
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
