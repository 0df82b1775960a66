use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::ClassificationError;

/// Interactive control wrapping an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Link,
    Button,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub text: String,
    pub url: String,
}

/// Page regions enclosing an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Landmark {
    pub in_header: bool,
    pub in_navigation: bool,
    pub in_content: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContext {
    pub before: String,
    pub after: String,
}

/// One `<img>` found on the page, with everything the drafter gets to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub src: String,
    pub existing_alt: Option<String>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub link: Option<LinkInfo>,
    pub control: Option<Control>,
    pub landmark: Landmark,
    /// `role="presentation"`, `role="none"` or `aria-hidden="true"`.
    pub marked_decorative: bool,
    pub context: ImageContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Decorative,
    Functional,
    Informative,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Decorative => "decorative",
            Role::Functional => "functional",
            Role::Informative => "informative",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub role: Role,
    pub suggested_alt: String,
}

impl ClassificationResult {
    pub fn decorative() -> Self {
        Self {
            role: Role::Decorative,
            suggested_alt: String::new(),
        }
    }
}

/// Role as reported; `Unknown` when classification failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    Decorative,
    Functional,
    Informative,
    Unknown,
}

impl From<Role> for ImageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Decorative => ImageRole::Decorative,
            Role::Functional => ImageRole::Functional,
            Role::Informative => ImageRole::Informative,
        }
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageRole::Decorative => "decorative",
            ImageRole::Functional => "functional",
            ImageRole::Informative => "informative",
            ImageRole::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedImage {
    pub src: String,
    pub existing_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkInfo>,
    pub role: ImageRole,
    pub context: ImageContext,
    pub suggested_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnnotatedImage {
    pub fn from_outcome(
        record: ImageRecord,
        outcome: Result<ClassificationResult, ClassificationError>,
    ) -> Self {
        let (role, suggested_alt, error) = match outcome {
            Ok(result) => (result.role.into(), Some(result.suggested_alt), None),
            Err(e) => (ImageRole::Unknown, None, Some(e.to_string())),
        };
        Self {
            src: record.src,
            existing_alt: record.existing_alt,
            title: record.title,
            caption: record.caption,
            link: record.link,
            role,
            context: record.context,
            suggested_alt,
            error,
        }
    }
}
