use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a generated image lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ArtifactLocation {
    Remote(String),
    Local(PathBuf),
}

impl ArtifactLocation {
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            ArtifactLocation::Local(path) => Some(path),
            ArtifactLocation::Remote(_) => None,
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLocation::Remote(url) => f.write_str(url),
            ArtifactLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    pub location: ArtifactLocation,
    pub byte_content: Option<Vec<u8>>,
}

impl ImageArtifact {
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            location: ArtifactLocation::Remote(url.into()),
            byte_content: None,
        }
    }

    pub fn local(path: impl Into<PathBuf>, bytes: Option<Vec<u8>>) -> Self {
        Self {
            location: ArtifactLocation::Local(path.into()),
            byte_content: bytes,
        }
    }

    pub fn reference(&self) -> String {
        self.location.to_string()
    }
}

/// JSON body returned by the stable-image endpoints on success.
#[derive(Debug, Default, Deserialize)]
pub struct StabilityImageResponse {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StabilityErrorBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl StabilityErrorBody {
    pub fn summary(&self) -> String {
        let name = self.name.as_deref().unwrap_or("error");
        if self.errors.is_empty() {
            name.to_string()
        } else {
            format!("{}: {}", name, self.errors.join("; "))
        }
    }
}
