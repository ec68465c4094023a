use std::fmt;

/// Lifecycle of a process within one workflow run.
///
/// `Idle -> Running -> (Skipped | Computed) -> Closed`. `Skipped` and
/// `Computed` are per input tuple; a streaming process moves between them once
/// per tuple before closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Running,
    /// Every output already existed; the work was not repeated.
    Skipped,
    /// Outputs were produced (or the component computed a result) this run.
    Computed,
    /// Out-ports dropped; downstream sees end-of-stream.
    Closed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Idle => "idle",
            ProcessState::Running => "running",
            ProcessState::Skipped => "skipped",
            ProcessState::Computed => "computed",
            ProcessState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Kind of data a port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// File-backed information packets.
    File,
    /// Bare scalar strings (parameter values).
    Param,
}

/// Whether a port is an input or an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    In,
    Out,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_display_in_lifecycle_order() {
        let states = [
            ProcessState::Idle,
            ProcessState::Running,
            ProcessState::Skipped,
            ProcessState::Computed,
            ProcessState::Closed,
        ];
        let names: Vec<String> = states.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["idle", "running", "skipped", "computed", "closed"]);
    }
}
