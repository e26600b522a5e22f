//! Discussion participants and the fixed session roster.

use crate::error::RosterError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker id used for every human contribution.
pub const HUMAN_ID: &str = "user";
/// Display name shown for the human participant.
pub const HUMAN_NAME: &str = "你";

/// The behavioral archetype an autonomous speaker plays.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Archetype {
    /// Grabs the floor and sets the framework. Opens the discussion by default.
    Aggressive,
    /// Summarizes consensus and moves the group to the next stage.
    Structured,
    /// Digs into feasibility, cost and execution risk.
    Detail,
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Archetype::Aggressive => write!(f, "AGGRESSIVE"),
            Archetype::Structured => write!(f, "STRUCTURED"),
            Archetype::Detail => write!(f, "DETAIL"),
        }
    }
}

/// One autonomous speaker.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub archetype: Archetype,
    /// Free-form persona description handed to the content generator.
    pub personality: String,
}

impl Participant {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        archetype: Archetype,
        personality: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            archetype,
            personality: personality.into(),
        }
    }
}

/// The immutable set of autonomous speakers for a session. Never empty.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "Vec<Participant>", into = "Vec<Participant>")]
pub struct Roster {
    members: Vec<Participant>,
}

impl Roster {
    /// Builds a roster. Returns `None` when `members` is empty.
    pub fn new(members: Vec<Participant>) -> Option<Self> {
        if members.is_empty() {
            None
        } else {
            Some(Self { members })
        }
    }

    pub fn members(&self) -> &[Participant] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.members.iter().find(|p| p.id == id)
    }

    /// The speaker who opens the discussion when the human stays silent:
    /// the first aggressive member, or the first member if there is none.
    pub fn opener(&self) -> Option<&Participant> {
        self.members
            .iter()
            .find(|p| p.archetype == Archetype::Aggressive)
            .or_else(|| self.members.first())
    }
}

impl TryFrom<Vec<Participant>> for Roster {
    type Error = RosterError;

    fn try_from(members: Vec<Participant>) -> Result<Self, Self::Error> {
        Roster::new(members).ok_or(RosterError::Empty)
    }
}

impl From<Roster> for Vec<Participant> {
    fn from(roster: Roster) -> Self {
        roster.members
    }
}

impl Default for Roster {
    /// The standard three-person panel.
    fn default() -> Self {
        Self {
            members: vec![
                Participant::new(
                    "char1",
                    "张强 (Aggressive)",
                    Archetype::Aggressive,
                    "强势抢话型：喜欢设定讨论框架和节奏，会强力纠偏，语气果断。常说“我认为讨论应分为三个阶段”“必须立刻确定核心目标”。",
                ),
                Participant::new(
                    "char2",
                    "李雅 (Structured)",
                    Archetype::Structured,
                    "结构总结型：擅长归纳共识、承上启下。常说“刚才大家提到了A和B，核心分歧已明确，建议进入方案对比”。",
                ),
                Participant::new(
                    "char3",
                    "王敏 (Detail)",
                    Archetype::Detail,
                    "补充细节型：务实严谨，关注落地。常追问“人力成本和技术风险如何覆盖？”，只谈具体执行。",
                ),
            ],
        }
    }
}
