//! Department codes and the triggering-department selector.

use serde::{Deserialize, Serialize};

pub const DEPT_MAINTENANCE: &str = "1001";
pub const DEPT_SANITATION: &str = "1002";
pub const DEPT_PRODUCTION: &str = "1003";
pub const DEPT_QUALITY: &str = "1004";
pub const DEPT_SAFETY: &str = "1005";
pub const DEPT_WAREHOUSE: &str = "1006";
pub const DEPT_PURCHASING: &str = "1007";

/// Sentinel accepted in place of a department code meaning "every department".
pub const ANY_DEPARTMENT: &str = "any";

/// Which department may raise posts from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggeringDepartment {
    Any,
    Department(String),
}

impl TriggeringDepartment {
    /// Whether a user from `department_code` may use the template.
    pub fn admits(&self, department_code: &str) -> bool {
        match self {
            TriggeringDepartment::Any => true,
            TriggeringDepartment::Department(code) => code == department_code,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TriggeringDepartment::Any => ANY_DEPARTMENT,
            TriggeringDepartment::Department(code) => code,
        }
    }
}

impl From<String> for TriggeringDepartment {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case(ANY_DEPARTMENT) || value.trim().is_empty() {
            TriggeringDepartment::Any
        } else {
            TriggeringDepartment::Department(value.trim().to_string())
        }
    }
}

impl From<TriggeringDepartment> for String {
    fn from(value: TriggeringDepartment) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_admits_every_department() {
        let any = TriggeringDepartment::from("any".to_string());
        assert_eq!(any, TriggeringDepartment::Any);
        assert!(any.admits(DEPT_MAINTENANCE));
        assert!(any.admits(DEPT_QUALITY));
    }

    #[test]
    fn specific_department_admits_only_itself() {
        let dept = TriggeringDepartment::from(DEPT_PRODUCTION.to_string());
        assert!(dept.admits(DEPT_PRODUCTION));
        assert!(!dept.admits(DEPT_MAINTENANCE));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_value(TriggeringDepartment::Any).unwrap();
        assert_eq!(json, serde_json::json!("any"));
        let back: TriggeringDepartment = serde_json::from_value(serde_json::json!("1003")).unwrap();
        assert_eq!(back, TriggeringDepartment::Department("1003".into()));
    }
}
