//! Robot description cross-validation.
//!
//! The solver publishes the robot description (URDF text) into the shared
//! segment. The controller does not build a model from it; it only checks that
//! every joint it drives is declared there, so both processes agree on which
//! robot they are talking about.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static JOINT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<joint\b[^>]*?\bname\s*=\s*"([^"]+)""#).expect("static joint regex")
});

/// Description validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
    /// Description text is empty.
    #[error("robot description is empty")]
    Empty,

    /// A configured joint is not declared in the description.
    #[error("joint '{0}' is not declared in the robot description")]
    MissingJoint(String),
}

/// Joint names declared in a URDF document, in document order.
pub fn joint_names(description: &str) -> Vec<&str> {
    JOINT_NAME
        .captures_iter(description)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Check that every name in `expected` is declared in `description`.
pub fn validate_joint_names<S: AsRef<str>>(
    description: &str,
    expected: &[S],
) -> Result<(), DescriptionError> {
    if description.trim().is_empty() {
        return Err(DescriptionError::Empty);
    }
    let declared = joint_names(description);
    for name in expected {
        let name = name.as_ref();
        if !declared.contains(&name) {
            return Err(DescriptionError::MissingJoint(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URDF: &str = r#"<robot name="arm">
  <link name="base"/>
  <joint name="arm_1_joint" type="revolute"><parent link="base"/></joint>
  <joint type="revolute" name="arm_2_joint"/>
</robot>"#;

    #[test]
    fn extracts_joint_names() {
        assert_eq!(joint_names(URDF), vec!["arm_1_joint", "arm_2_joint"]);
    }

    #[test]
    fn accepts_declared_joints() {
        assert!(validate_joint_names(URDF, &["arm_2_joint", "arm_1_joint"]).is_ok());
    }

    #[test]
    fn rejects_unknown_joint() {
        assert_eq!(
            validate_joint_names(URDF, &["arm_3_joint"]),
            Err(DescriptionError::MissingJoint("arm_3_joint".to_string()))
        );
    }

    #[test]
    fn rejects_empty_description() {
        assert_eq!(
            validate_joint_names("  ", &["a"]),
            Err(DescriptionError::Empty)
        );
    }
}
