//! Evaluation and regression-gating harness for conversational backends.
//!
//! A run loads a JSONL suite, executes every case through one adapter
//! (offline fixture, HTTP application, or the OpenAI API), scores each
//! outcome deterministically, aggregates latency/cost/token metrics, and
//! gates them against a per-suite baseline. Each run leaves a self-contained
//! artifact directory: `manifest.json`, `results.jsonl`, `summary.json`,
//! `report.md`, `diff.md`.

pub mod adapters;
pub mod baseline;
pub mod engine;
pub mod gate;
pub mod metrics;
pub mod model;
pub mod report;
pub mod scoring;
pub mod storage;
pub mod suite;
