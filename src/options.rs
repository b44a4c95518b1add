//! Closed option sets for the backend: camera grouping, matching strategy and
//! the camera models the extractor understands.

use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};

/// How images are grouped into cameras during feature extraction.
///
/// | Mode        | Intrinsics shared by                |
/// |-------------|-------------------------------------|
/// | `Auto`      | images with identical EXIF/size     |
/// | `Single`    | every image                         |
/// | `PerFolder` | images in the same sub-directory    |
/// | `PerImage`  | nothing, one camera per image       |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraMode {
    #[default]
    Auto,
    Single,
    PerFolder,
    PerImage,
}

impl std::fmt::Display for CameraMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraMode::Auto => write!(f, "AUTO"),
            CameraMode::Single => write!(f, "SINGLE"),
            CameraMode::PerFolder => write!(f, "PER_FOLDER"),
            CameraMode::PerImage => write!(f, "PER_IMAGE"),
        }
    }
}

impl std::str::FromStr for CameraMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "AUTO" => Ok(CameraMode::Auto),
            "SINGLE" => Ok(CameraMode::Single),
            "PER_FOLDER" => Ok(CameraMode::PerFolder),
            "PER_IMAGE" => Ok(CameraMode::PerImage),
            _ => anyhow::bail!(
                "Invalid camera mode '{}'. Valid values: AUTO, SINGLE, PER_FOLDER, PER_IMAGE",
                s
            ),
        }
    }
}

/// Pairwise matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exhaustive,
    Sequential,
    VocabTree,
    Spatial,
}

impl MatchStrategy {
    pub const ALL: [MatchStrategy; 4] = [
        MatchStrategy::Exhaustive,
        MatchStrategy::Sequential,
        MatchStrategy::VocabTree,
        MatchStrategy::Spatial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Exhaustive => "exhaustive",
            MatchStrategy::Sequential => "sequential",
            MatchStrategy::VocabTree => "vocab_tree",
            MatchStrategy::Spatial => "spatial",
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchStrategy {
    type Err = PipelineError;

    /// Selector names are matched exactly; anything else is an
    /// [`PipelineError::UnknownMatchStrategy`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatchStrategy::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownMatchStrategy(s.to_string()))
    }
}

/// Camera model identifiers understood by the extractor.
pub const CAMERA_MODELS: &[&str] = &[
    "SIMPLE_PINHOLE",
    "PINHOLE",
    "SIMPLE_RADIAL",
    "RADIAL",
    "OPENCV",
    "OPENCV_FISHEYE",
    "FULL_OPENCV",
    "SIMPLE_RADIAL_FISHEYE",
    "RADIAL_FISHEYE",
    "THIN_PRISM_FISHEYE",
];

pub fn is_known_camera_model(model: &str) -> bool {
    CAMERA_MODELS.contains(&model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_mode_from_str() {
        assert_eq!("auto".parse::<CameraMode>().unwrap(), CameraMode::Auto);
        assert_eq!("SINGLE".parse::<CameraMode>().unwrap(), CameraMode::Single);
        assert_eq!(
            "per-folder".parse::<CameraMode>().unwrap(),
            CameraMode::PerFolder
        );
        assert_eq!(
            "PER_IMAGE".parse::<CameraMode>().unwrap(),
            CameraMode::PerImage
        );
        let err = "sometimes".parse::<CameraMode>().unwrap_err();
        assert!(err.to_string().contains("Invalid camera mode"));
    }

    #[test]
    fn test_camera_mode_display_roundtrips() {
        for mode in [
            CameraMode::Auto,
            CameraMode::Single,
            CameraMode::PerFolder,
            CameraMode::PerImage,
        ] {
            assert_eq!(mode.to_string().parse::<CameraMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_match_strategy_accepts_closed_set() {
        assert_eq!(
            "exhaustive".parse::<MatchStrategy>().unwrap(),
            MatchStrategy::Exhaustive
        );
        assert_eq!(
            "sequential".parse::<MatchStrategy>().unwrap(),
            MatchStrategy::Sequential
        );
        assert_eq!(
            "vocab_tree".parse::<MatchStrategy>().unwrap(),
            MatchStrategy::VocabTree
        );
        assert_eq!(
            "spatial".parse::<MatchStrategy>().unwrap(),
            MatchStrategy::Spatial
        );
    }

    #[test]
    fn test_match_strategy_rejects_anything_else() {
        for bad in ["", "Exhaustive", "vocab-tree", "transitive"] {
            let err = bad.parse::<MatchStrategy>().unwrap_err();
            assert_eq!(err, PipelineError::UnknownMatchStrategy(bad.to_string()));
        }
    }

    #[test]
    fn test_known_camera_models() {
        assert!(is_known_camera_model("OPENCV"));
        assert!(is_known_camera_model("PINHOLE"));
        assert!(!is_known_camera_model("opencv"));
    }
}
