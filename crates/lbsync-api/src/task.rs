/// Status of an asynchronous cloud task.
///
/// Both API flavours report task state as a small integer:
/// `0` succeeded, `1` failed, `2` still being dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Dealing,
    /// A status value neither API documents.
    Unknown(i64),
}

impl From<i64> for TaskStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Succeeded,
            1 => Self::Failed,
            2 => Self::Dealing,
            other => Self::Unknown(other),
        }
    }
}

impl TaskStatus {
    /// The raw status code, as reported by the provider.
    pub fn code(self) -> i64 {
        match self {
            Self::Succeeded => 0,
            Self::Failed => 1,
            Self::Dealing => 2,
            Self::Unknown(code) => code,
        }
    }
}

/// A resource created by a possibly asynchronous action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub id: String,
    /// Task to poll before the resource is usable, if the action is async.
    pub task_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in [0, 1, 2, 7] {
            assert_eq!(TaskStatus::from(code).code(), code);
        }
        assert_eq!(TaskStatus::from(9), TaskStatus::Unknown(9));
    }
}
