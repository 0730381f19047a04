//! Stream simulation frames to the logmd viewer without stalling the
//! simulation.
//!
//! ```no_run
//! use logmd::{frame::Structure, RunConfig, RunController};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut run = RunController::start(RunConfig::default())?;
//! let frame = Structure::from_pdb(&std::fs::read_to_string("1crn.pdb")?)?;
//! for _ in 0..16 {
//!     // ... advance the simulation, update `frame` ...
//!     run.log(&frame, None, None)?;
//! }
//! run.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod auth;
pub mod error;
pub mod frame;
pub mod model;
pub mod orchestrator;
pub mod remote;

pub use model::{Annotations, Endpoints, RunConfig, UploadJob, UploadSummary, WorkerStatus};
pub use orchestrator::{RunController, RunSession};
