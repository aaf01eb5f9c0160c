//! Build script for pose asset validation
//!
//! This script runs at compile time and validates every pose JSON file
//! shipped with the crate: bone names must be humanoid role names and
//! rotations must stay within a half turn per axis.

// Include the shared role names
#[path = "src/skeleton/role_names.rs"]
mod role_names;

use heck::ToLowerCamelCase;
use role_names::HUMANOID_BONE_NAMES;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct Xyz {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    z: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoneOperation {
    bone_name: String,
    #[allow(dead_code)]
    position: Option<Xyz>,
    rotation: Option<Xyz>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoseAsset {
    #[serde(default)]
    bone_operations: Vec<BoneOperation>,
}

/// Validate a single bone operation
fn validate_operation(index: usize, op: &BoneOperation) -> Vec<String> {
    let mut errors = Vec::new();

    if !HUMANOID_BONE_NAMES.contains(&op.bone_name.as_str()) {
        // Common slip: "LeftUpperArm" or "left_upper_arm" instead of camelCase
        let suggestion = op.bone_name.to_lower_camel_case();
        if HUMANOID_BONE_NAMES.contains(&suggestion.as_str()) {
            errors.push(format!(
                "  #{}: unknown bone '{}' (did you mean '{}'?)",
                index, op.bone_name, suggestion
            ));
        } else {
            errors.push(format!("  #{}: unknown bone '{}'", index, op.bone_name));
        }
    }

    if let Some(r) = &op.rotation {
        for (axis, degrees) in [("x", r.x), ("y", r.y), ("z", r.z)] {
            if !(-180.0..=180.0).contains(&degrees) {
                errors.push(format!(
                    "  #{} {}: rotation {} {:.1} outside [-180, 180] degrees",
                    index, op.bone_name, axis, degrees
                ));
            }
        }
    }

    errors
}

/// Validate a pose file
fn validate_pose_file(path: &Path) -> Result<(), String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    let pose: PoseAsset = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    let errors: Vec<String> = pose
        .bone_operations
        .iter()
        .enumerate()
        .flat_map(|(i, op)| validate_operation(i, op))
        .collect();

    if errors.is_empty() {
        println!(
            "cargo:warning=✓ {} validated ({} bone operations)",
            path.display(),
            pose.bone_operations.len()
        );
        Ok(())
    } else {
        Err(format!(
            "Pose '{}' has invalid bone operations:\n{}",
            path.display(),
            errors.join("\n")
        ))
    }
}

fn main() {
    let pose_dir = Path::new("assets/poses");

    // Rerun if shared role names change
    println!("cargo:rerun-if-changed=src/skeleton/role_names.rs");

    if !pose_dir.exists() {
        println!("cargo:warning=Pose directory not found, skipping validation");
        return;
    }

    let mut has_errors = false;

    if let Ok(entries) = fs::read_dir(pose_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                println!("cargo:rerun-if-changed={}", path.display());

                if let Err(e) = validate_pose_file(&path) {
                    println!("cargo:warning=VALIDATION ERROR: {}", e);
                    has_errors = true;
                }
            }
        }
    }

    if has_errors {
        panic!("Pose validation failed! Fix the bone names in the pose files.");
    }

    println!("cargo:rerun-if-changed={}", pose_dir.display());
}
