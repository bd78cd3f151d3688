use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The closed set of personas the switchboard can activate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaModule {
    #[default]
    Scholar,
    Designer,
    Partner,
    Alchemist,
    Fixer,
    Influencer,
}

impl PersonaModule {
    pub const ALL: [PersonaModule; 6] = [
        Self::Scholar,
        Self::Designer,
        Self::Partner,
        Self::Alchemist,
        Self::Fixer,
        Self::Influencer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scholar => "scholar",
            Self::Designer => "designer",
            Self::Partner => "partner",
            Self::Alchemist => "alchemist",
            Self::Fixer => "fixer",
            Self::Influencer => "influencer",
        }
    }
}

impl std::fmt::Display for PersonaModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, lower-case match only. Case folding is the caller's job.
impl std::str::FromStr for PersonaModule {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown persona module: {s}"))
    }
}

/// Resolves persona text by name (`main_identity`, `scholar`, ...).
///
/// Returns an empty string when the text is missing; callers never fail on
/// absent persona data.
#[async_trait]
pub trait PersonaTextProvider: Send + Sync {
    async fn resolve(&self, name: &str) -> String;
}
