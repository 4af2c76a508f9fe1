//! scenecast: workflow execution engine for remotely generated, narrated
//! video assets.
//!
//! A [`Workflow`](scenecast_common::Workflow) is run by the
//! [`WorkflowExecutor`](executor::WorkflowExecutor) against one run
//! directory. Every remote call goes through a shared
//! [`RequestDispatcher`](dispatch::RequestDispatcher), outputs are reused
//! through the run's [`ContentCache`](cache::ContentCache), and scene
//! timing follows the measured narration.

pub mod assets;
pub mod audio;
pub mod cache;
pub mod config;
pub mod cost;
pub mod dispatch;
pub mod errors;
pub mod executor;
pub mod generation;
pub mod logging;
pub mod scenecast_config;
pub mod timing;
pub mod ui;

pub use scenecast_common::{Workflow, validate_workflow};
