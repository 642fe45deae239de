use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a bearer may do with their own diary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "meals:view")]
    ViewMeals,
    #[serde(rename = "meals:create")]
    CreateMeals,
    #[serde(rename = "meals:edit")]
    EditMeals,
    #[serde(rename = "meals:delete")]
    DeleteMeals,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::ViewMeals,
        Capability::CreateMeals,
        Capability::EditMeals,
        Capability::DeleteMeals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ViewMeals => "meals:view",
            Capability::CreateMeals => "meals:create",
            Capability::EditMeals => "meals:edit",
            Capability::DeleteMeals => "meals:delete",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability `{}`", s))
    }
}

/// JWT payload. `sub` is the patient id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    /// Absent means every capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caps: Option<Vec<Capability>>,
}
