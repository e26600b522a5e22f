//! API Models
//!
//! Request and response bodies for the REST endpoints, documented for the
//! OpenAPI spec with `utoipa`.

use crossfire_core::participant::Participant;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateTopicPayload {
    #[schema(example = "字节跳动")]
    pub company: String,
    #[schema(example = "产品经理")]
    pub job_title: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TopicResponse {
    pub topic: String,
}

/// One autonomous panel member as exposed to clients.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct RosterEntry {
    #[schema(example = "char1")]
    pub id: String,
    pub name: String,
    #[schema(example = "AGGRESSIVE")]
    pub archetype: String,
    pub personality: String,
}

impl From<&Participant> for RosterEntry {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            archetype: p.archetype.to_string(),
            personality: p.personality.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
