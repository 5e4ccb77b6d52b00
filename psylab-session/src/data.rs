//! Typed session payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role carried in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Subject,
    Experimenter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Subject => "subject",
            Role::Experimenter => "experimenter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject" => Ok(Role::Subject),
            "experimenter" => Ok(Role::Experimenter),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// What a signed session cookie carries between requests.
///
/// Identity fields are refreshed from the verified token on each
/// authenticated request; the cookie copy is never an authority on its own.
/// Unknown keys in an incoming cookie are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(rename = "_id", alias = "id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Auth token issued at login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    // Experiment run scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_stimuli: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub perceptual_dimensions_ids: Option<Vec<String>>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field is set. Empty sessions are never written out.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Drop the experiment run scope, keeping identity.
    pub fn clear_experiment(&mut self) {
        self.experiment_id = None;
        self.num_stimuli = None;
        self.perceptual_dimensions_ids = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names() {
        let mut data = SessionData::new().with_id("u1").with_role(Role::Subject);
        data.experiment_id = Some("e9".to_string());
        data.num_stimuli = Some(12);

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(
            value,
            json!({ "_id": "u1", "role": "subject", "experimentId": "e9", "numStimuli": 12 })
        );
    }

    #[test]
    fn test_accepts_id_alias_and_ignores_unknown_keys() {
        let data: SessionData =
            serde_json::from_str(r#"{"id":"u1","role":"experimenter","theme":"dark"}"#).unwrap();
        assert_eq!(data.id.as_deref(), Some("u1"));
        assert_eq!(data.role, Some(Role::Experimenter));
    }

    #[test]
    fn test_is_empty() {
        assert!(SessionData::new().is_empty());
        let mut data = SessionData::new().with_token("t");
        assert!(!data.is_empty());
        data.token = None;
        assert!(data.is_empty());
    }

    #[test]
    fn test_clear_experiment() {
        let mut data = SessionData::new().with_id("u1");
        data.experiment_id = Some("e1".to_string());
        data.perceptual_dimensions_ids = Some(vec!["d1".to_string()]);
        data.clear_experiment();
        assert_eq!(data, SessionData::new().with_id("u1"));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("subject".parse::<Role>().unwrap(), Role::Subject);
        assert!("admin".parse::<Role>().is_err());
    }
}
