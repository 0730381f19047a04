//! Engine adapters.
//!
//! Simulation engines report frames in one of two ways. Push engines call a
//! hook every `interval` steps and the hook reads the live state; pull engines
//! first ask when the next report is due and which quantities it needs, then
//! hand over a state object. Both end up in [`RunController::log`].

use crate::error::LogError;
use crate::frame::{SimulationContext, Structure};
use crate::model::Annotations;
use crate::orchestrator::RunController;

/// What the hook of a push engine reads at each report.
pub struct Snapshot {
    pub frame: Structure,
    pub context: Option<Box<dyn SimulationContext>>,
    pub annotations: Option<Annotations>,
}

impl Snapshot {
    pub fn new(frame: Structure) -> Self {
        Self {
            frame,
            context: None,
            annotations: None,
        }
    }

    pub fn with_context(mut self, context: impl SimulationContext + 'static) -> Self {
        self.context = Some(Box::new(context));
        self
    }

    pub fn with_annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = Some(annotations);
        self
    }
}

type Reader = Box<dyn FnMut() -> Snapshot + Send>;

/// Hook for engines that call back every `interval` steps.
pub struct PushAdapter {
    interval: u64,
    read: Reader,
}

impl PushAdapter {
    pub fn new(interval: u64, read: impl FnMut() -> Snapshot + Send + 'static) -> Self {
        Self {
            interval,
            read: Box::new(read),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Called by the engine once per interval.
    pub fn fire(&mut self, controller: &mut RunController) -> Result<u64, LogError> {
        let snapshot = (self.read)();
        controller.log(
            &snapshot.frame,
            snapshot.context.as_deref(),
            snapshot.annotations,
        )
    }
}

/// Answer to a pull engine's "describe the next report" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRequest {
    pub steps: u64,
    pub positions: bool,
    pub velocities: bool,
    pub forces: bool,
    pub energy: bool,
}

/// State object delivered by a pull engine.
pub trait EngineState {
    /// Atom positions in Ångström, in template order.
    fn positions_angstrom(&self) -> Vec<[f64; 3]>;
}

/// Reporter for engines that pull, copying positions into a template.
pub struct PullAdapter {
    template: Structure,
    interval: u64,
}

impl PullAdapter {
    pub fn new(template: Structure, interval: u64) -> Self {
        Self { template, interval }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn describe_next_report(&self) -> ReportRequest {
        ReportRequest {
            steps: self.interval,
            positions: true,
            velocities: true,
            forces: true,
            energy: false,
        }
    }

    pub fn report(
        &mut self,
        controller: &mut RunController,
        state: &dyn EngineState,
    ) -> Result<u64, LogError> {
        self.template.set_positions(&state.positions_angstrom())?;
        controller.log(&self.template, None, None)
    }

    pub fn template(&self) -> &Structure {
        &self.template
    }
}

/// Either adapter, for code that drives engines generically.
pub enum FrameSource {
    Push(PushAdapter),
    Pull(PullAdapter),
}

impl FrameSource {
    pub fn interval(&self) -> u64 {
        match self {
            FrameSource::Push(a) => a.interval(),
            FrameSource::Pull(a) => a.interval(),
        }
    }
}

impl From<PushAdapter> for FrameSource {
    fn from(a: PushAdapter) -> Self {
        FrameSource::Push(a)
    }
}

impl From<PullAdapter> for FrameSource {
    fn from(a: PullAdapter) -> Self {
        FrameSource::Pull(a)
    }
}
