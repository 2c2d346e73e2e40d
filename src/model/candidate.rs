use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest accepted candidate or voter identifier.
pub const MAX_ID_LENGTH: usize = 64;

/// A candidate on the roster. Also the body of a candidate registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub candidate_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifesto: Option<String>,
}

impl Candidate {
    pub fn new(candidate_id: &str, name: &str, party: Option<&str>) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            name: name.to_string(),
            party: party.map(str::to_string),
            manifesto: None,
        }
    }

    /// Trim all fields and reject empty ids or names.
    pub fn normalized(self) -> Result<Self> {
        let candidate_id = validate_id("candidateId", &self.candidate_id)?.to_string();
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Candidate name must not be empty".to_string()));
        }
        let trim = |field: Option<String>| {
            field
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Ok(Self {
            candidate_id,
            name: name.to_string(),
            party: trim(self.party),
            manifesto: trim(self.manifesto),
        })
    }
}

/// Check an identifier is present and of acceptable length, returning it trimmed.
pub fn validate_id<'a>(field: &str, id: &'a str) -> Result<&'a str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }
    if id.chars().count() > MAX_ID_LENGTH || id.chars().any(char::is_control) {
        return Err(Error::Validation(format!(
            "{field} must be at most {MAX_ID_LENGTH} printable characters"
        )));
    }
    Ok(id)
}

/// The roster installed on a fresh deployment.
pub fn default_roster() -> Vec<Candidate> {
    vec![
        Candidate::new("C1", "Alice Johnson", Some("Progress Alliance")),
        Candidate::new("C2", "Bob Smith", Some("Unity Front")),
        Candidate::new("C3", "Chen Lee", Some("Future Now")),
    ]
}

#[cfg(test)]
mod examples {
    use super::*;

    impl Candidate {
        pub fn example1() -> Self {
            Self::new("C1", "Alice", None)
        }

        pub fn example2() -> Self {
            Self::new("C2", "Bob", None)
        }
    }
}
