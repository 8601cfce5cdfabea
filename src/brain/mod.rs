use crate::io::IOBundle;
use crate::time_util::mytime::TimeProvider;
use backtrace::Backtrace;
use std::fmt::{Display, Formatter};
use tokio::runtime::Runtime;

pub mod zone;

#[derive(Debug)]
pub struct BrainFailure {
    description: String,
    trace: Backtrace,
    line_num: u32,
    file_name: String,
    actions: CorrectiveActions,
}

impl BrainFailure {
    pub fn new(
        description: String,
        trace: Backtrace,
        line_num: u32,
        file_name: String,
        actions: CorrectiveActions,
    ) -> Self {
        BrainFailure {
            description,
            trace,
            line_num,
            file_name,
            actions,
        }
    }

    pub fn get_corrective_actions(&self) -> &CorrectiveActions {
        &self.actions
    }
}

impl Display for BrainFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "BrainFailure occured: '{}'", self.description)?;
        writeln!(f, "Recommended corrective actions: {:?}", self.actions)?;
        writeln!(f, "At: Line {} in {}", self.line_num, self.file_name)?;
        writeln!(f, "Trace:{:?}", self.trace)
    }
}

/// What needs doing to get back to a safe state after a failure.
/// The only dangerous unknown in this system is whether the heaters are on.
#[derive(Debug)]
pub struct CorrectiveActions {
    heater_state_unknown: bool,
}

impl CorrectiveActions {
    pub fn new() -> Self {
        CorrectiveActions {
            heater_state_unknown: false,
        }
    }

    pub fn unknown_heaters() -> Self {
        CorrectiveActions::new().with_unknown_heater_state()
    }

    pub fn is_heater_state_unknown(&self) -> bool {
        self.heater_state_unknown
    }

    pub fn with_unknown_heater_state(mut self) -> Self {
        self.heater_state_unknown = true;
        self
    }
}

pub trait Brain {
    fn run(
        &mut self,
        runtime: &Runtime,
        io_bundle: &mut IOBundle,
        time_provider: &impl TimeProvider,
    ) -> Result<(), BrainFailure>;
}

#[macro_export]
macro_rules! brain_fail {
    ($msg:expr) => {{
        let trace = backtrace::Backtrace::new();
        let actions = $crate::brain::CorrectiveActions::new();
        $crate::brain::BrainFailure::new(
            $msg.to_string(),
            trace,
            line!(),
            file!().to_owned(),
            actions,
        )
    }};
    ($msg:expr, $actions:expr) => {{
        let trace = backtrace::Backtrace::new();
        $crate::brain::BrainFailure::new(
            $msg.to_string(),
            trace,
            line!(),
            file!().to_owned(),
            $actions,
        )
    }};
}
