// src/models/user.rs

use serde::{Deserialize, Serialize};

use crate::{error::AppError, utils::jwt::Claims};

/// Role carried in the token. Account management itself lives outside this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller, as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    /// Student cohort, matched against `Exam::batch`.
    pub batch: Option<String>,
}

impl Actor {
    pub fn student(id: i64, batch: Option<&str>) -> Self {
        Self { id, role: Role::Student, batch: batch.map(str::to_string) }
    }

    pub fn teacher(id: i64) -> Self {
        Self { id, role: Role::Teacher, batch: None }
    }

    pub fn admin(id: i64) -> Self {
        Self { id, role: Role::Admin, batch: None }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}

impl TryFrom<&Claims> for Actor {
    type Error = AppError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid subject in token".to_string()))?;
        let role = Role::parse(&claims.role)
            .ok_or_else(|| AppError::AuthError(format!("Unknown role '{}'", claims.role)))?;

        Ok(Self { id, role, batch: claims.batch.clone() })
    }
}
