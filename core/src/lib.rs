//! Netlab Core Library
//!
//! This crate provides the core functionality for the Netlab shell:
//! persisted settings, the project lifecycle, the local server bootstrap
//! and the background tasks they rely on.

pub mod cloud;
pub mod config;
pub mod error;
pub mod model;
pub mod project;
pub mod server;
pub mod tasks;

pub use cloud::{CloudInstance, CloudInstances};
pub use config::{CloudSection, ServerSection, Settings};
pub use error::{Error, Result};
pub use model::*;
pub use project::{
    LegacyConverter, NewProjectSettings, ProjectManager, ProjectObserver, ProjectState,
};
pub use server::{BootstrapOutcome, BootstrapPhase, LocalServer, LocalServerBootstrap};
pub use tasks::{CancelToken, TaskEvent, TransferKind, TransferReport};
