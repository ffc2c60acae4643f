// src/models/user.rs

/// Roles carried in the token's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Unknown role strings are treated as the least privileged role.
    pub fn from_claim(role: &str) -> Self {
        match role {
            "teacher" => Role::Teacher,
            "admin" => Role::Admin,
            _ => Role::Student,
        }
    }

    /// Teachers and admins author exams and see every submission.
    pub fn is_instructor(&self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    pub role: Role,
}

impl Viewer {
    pub fn is_instructor(&self) -> bool {
        self.role.is_instructor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_roles_are_least_privileged() {
        assert!(Role::from_claim("teacher").is_instructor());
        assert!(Role::from_claim("admin").is_instructor());
        assert_eq!(Role::from_claim("student"), Role::Student);
        assert_eq!(Role::from_claim("Teacher"), Role::Student);
        assert!(!Role::from_claim("").is_instructor());
    }
}
