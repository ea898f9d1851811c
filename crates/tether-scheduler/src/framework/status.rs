use std::fmt;

/// Outcome code of a plugin extension point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The plugin ran correctly and found the pod schedulable
    Success,
    /// An internal error or protocol violation; aborts the cycle
    Error,
    /// The pod does not fit now but might after other pods are preempted
    Unschedulable,
    /// The pod can never fit on this node in this cycle
    UnschedulableAndUnresolvable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "Success",
            Code::Error => "Error",
            Code::Unschedulable => "Unschedulable",
            Code::UnschedulableAndUnresolvable => "UnschedulableAndUnresolvable",
        };
        write!(f, "{}", s)
    }
}

/// Result of running a plugin: a code plus human-readable reasons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
}

impl Status {
    /// Create a status with the given code and no reasons
    pub fn new(code: Code) -> Self {
        Self {
            code,
            reasons: Vec::new(),
        }
    }

    /// Create a status with a single reason
    pub fn with_reason(code: Code, reason: impl Into<String>) -> Self {
        Self {
            code,
            reasons: vec![reason.into()],
        }
    }

    /// Create a success status
    pub fn success() -> Self {
        Self::new(Code::Success)
    }

    /// Create an error status carrying `message`
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_reason(Code::Error, message)
    }

    /// Append a reason
    pub fn append_reason(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// All reasons joined by ", "
    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    /// Whether the node was rejected, as opposed to the cycle failing
    pub fn is_unschedulable(&self) -> bool {
        matches!(
            self.code,
            Code::Unschedulable | Code::UnschedulableAndUnresolvable
        )
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message())
        }
    }
}
