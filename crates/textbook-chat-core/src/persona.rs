use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::{SessionStore, PERSONA_KEY};

/// Audience hint sent with each query to bias the answer style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    None,
    Beginner,
    SoftwareEngineer,
    RoboticsStudent,
    AiResearcher,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::None => "none",
            Persona::Beginner => "beginner",
            Persona::SoftwareEngineer => "software_engineer",
            Persona::RoboticsStudent => "robotics_student",
            Persona::AiResearcher => "ai_researcher",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Some(Persona::None),
            "beginner" => Some(Persona::Beginner),
            "software_engineer" => Some(Persona::SoftwareEngineer),
            "robotics_student" => Some(Persona::RoboticsStudent),
            "ai_researcher" => Some(Persona::AiResearcher),
            _ => None,
        }
    }

    pub fn all() -> Vec<Persona> {
        vec![
            Persona::None,
            Persona::Beginner,
            Persona::SoftwareEngineer,
            Persona::RoboticsStudent,
            Persona::AiResearcher,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Persona::None => "All audiences",
            Persona::Beginner => "Beginner",
            Persona::SoftwareEngineer => "Software Engineer",
            Persona::RoboticsStudent => "Robotics Student",
            Persona::AiResearcher => "AI Researcher",
        }
    }

    /// The persona to put on the wire, or `None` when no persona is selected.
    pub fn as_request_value(&self) -> Option<Persona> {
        match self {
            Persona::None => None,
            other => Some(*other),
        }
    }
}

/// The reader's persona choice, persisted for the session.
pub struct PersonaPreference {
    store: Arc<dyn SessionStore>,
    current: Persona,
}

impl PersonaPreference {
    pub fn open(store: Arc<dyn SessionStore>) -> Self {
        let current = match store.load(PERSONA_KEY) {
            Ok(Some(raw)) => Persona::from_str(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "ignoring unknown persisted persona");
                Persona::None
            }),
            Ok(None) => Persona::None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read persona preference");
                Persona::None
            }
        };
        Self { store, current }
    }

    pub fn get(&self) -> Persona {
        self.current
    }

    /// Takes effect immediately; the stored copy is written before returning.
    pub fn set(&mut self, persona: Persona) -> Result<()> {
        self.current = persona;
        self.store.save(PERSONA_KEY, persona.as_str())
    }
}
