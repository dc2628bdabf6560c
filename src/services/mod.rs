/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Match registration, lookup and lifecycle.
pub mod match_service;
/// Ordered per-match writer to the match store.
pub mod persistence;
/// Player statistics over finished matches.
pub mod ranking_service;
/// Goals, undo and score queries.
pub mod scoring_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with backoff.
pub mod storage_supervisor;
/// Remote event ingestion and reconciliation.
pub mod sync_service;
