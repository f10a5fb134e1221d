#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::float_cmp)]

//! # Changeflow
//!
//! Workflow lifecycle engine for business-change requests.
//!
//! A request moves through a fixed pipeline from intake to completion. Each
//! step is gated by the acting role, every request carries a computed
//! delivery deadline, and work is prioritized by an impact score that starts
//! as an AI estimate and can be overridden by a person.
//!
//! ## Features
//!
//! - **Stage gate**: one transition table decides who may move a request where
//! - **SLA**: deadline and on-time/at-risk/overdue status from complexity and age
//! - **Impact scoring**: validated five-dimension scores with tiers and badges
//! - **Optimistic store**: local-first mutations that roll back if the remote store fails
//! - **Streaming generation**: incremental decoding of streamed model output
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the transition table for developers
//! changeflow transitions --role dev
//!
//! # List requests by impact
//! cflow list
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod ai;
pub mod app;
pub mod core;
pub mod intake;
pub mod store;
pub mod workflow;

#[cfg(feature = "remote")]
pub use ai::ClaudeProvider;
pub use ai::{AIError, GenerationProvider, Prompt};

#[cfg(feature = "remote")]
pub use store::HttpRequestRepository;
pub use store::{InMemoryRepository, RequestRepository, RequestStore, StoreError};

// Re-export commonly used types
pub use app::App;
pub use core::Config;
pub use workflow::{Actor, ImpactAssessment, Request, RequestDraft, Role, Stage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "changeflow";

/// Short alias
pub const APP_ALIAS: &str = "cflow";
