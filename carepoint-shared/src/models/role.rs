use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Portal roles, as carried in the identity token's group claim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "PATIENT",
            Role::Doctor => "DOCTOR",
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
        match s.trim().to_ascii_uppercase().as_str() {
            "PATIENT" => Ok(Role::Patient),
            "DOCTOR" => Ok(Role::Doctor),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("PATIENT".parse::<Role>(), Ok(Role::Patient));
        assert_eq!(" doctor ".parse::<Role>(), Ok(Role::Doctor));
        assert!("ADMIN".parse::<Role>().is_err());
        assert_eq!(Role::Doctor.to_string(), "DOCTOR");
    }
}
