//! # Incident Insight
//!
//! Retrieval-augmented root-cause analysis for SRE incident reports.
//!
//! A free-text incident report is embedded, matched against a local store of
//! historical incidents, and handed to a language model together with the
//! retrieved context. The model's answer is normalized into a structured
//! recommendation, optionally followed by an LLM-as-judge quality score.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌───────────┐
//! │ Incident  │──▶│ Embedding │──▶│  SQLite   │──▶│ Inference │
//! │  report   │   │ + fallback│   │  cosine   │   │ + extract │
//! └──────────┘   └───────────┘   │  search   │   └─────┬─────┘
//!                                └──────────┘         ▼
//!                                               ┌───────────┐
//!                                               │ Formatter  │
//!                                               │ (+ judge)  │
//!                                               └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! insight init                          # create database
//! insight import incidents.json        # embed + store historical incidents
//! insight search "git authentication"  # inspect retrieval
//! insight analyze "Jenkins pipeline failed after Git error"
//! insight serve                        # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`embedding`] | Embedding client with retry FSM and local fallback |
//! | [`search`] | Vector similarity search over the incident store |
//! | [`retrieval`] | Query-to-context orchestration |
//! | [`prompt`] | Analysis and judge prompt templates |
//! | [`inference`] | Chat-completion client and response handling |
//! | [`extract`] | Ordered extraction strategies for raw model text |
//! | [`format`] | Presentation formatting, judge scoring |
//! | [`reasoning_log`] | Append-only diagnostic reasoning trace |
//! | [`ingest`] | Incident import from JSON |
//! | [`analyze`] | End-to-end pipeline glue |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyze;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod format;
pub mod inference;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod reasoning_log;
pub mod retrieval;
pub mod search;
pub mod server;
