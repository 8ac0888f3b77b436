use serde::{Deserialize, Serialize};

/// Coarse ordering bucket for tick functions. Groups run in declaration order
/// every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TickGroup {
    PrePhysics,
    DuringPhysics,
    PostPhysics,
    /// After all simulation work: publishing mirrors, presenting.
    PostUpdate,
}

impl TickGroup {
    pub const COUNT: usize = 4;

    /// All groups in execution order.
    pub const ALL: [TickGroup; Self::COUNT] = [
        Self::PrePhysics,
        Self::DuringPhysics,
        Self::PostPhysics,
        Self::PostUpdate,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PrePhysics => "pre-physics",
            Self::DuringPhysics => "during-physics",
            Self::PostPhysics => "post-physics",
            Self::PostUpdate => "post-update",
        }
    }
}

impl std::fmt::Display for TickGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
