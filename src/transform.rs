// src/transform.rs - Kinematic transform from pose to actuator lengths
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::effector::{ActuatorLengths, ConnectionSession};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("Transform used before a session geometry was loaded")]
    NoGeometry,
    #[error("Non-finite pose component: {0:?}")]
    NonFinite([f32; 6]),
}

/// Converts a platform pose into actuator (strut) lengths.
pub trait Transform: Send {
    fn begin(&mut self, session: &ConnectionSession);

    fn apply_translation_and_rotation(&mut self, position: [f32; 3], rotation: [f32; 3]) -> Result<(), TransformError>;

    /// Length of actuator `index` (0..6) from the last applied pose.
    fn raw_length(&self, index: usize) -> f32;

    fn raw_lengths(&self) -> ActuatorLengths {
        std::array::from_fn(|i| self.raw_length(i))
    }
}

/// Six-leg platform layout, reported by the effector on connect.
///
/// Distances are millimetres, angles degrees. Joint `i` on the base connects
/// to joint `i` on the moving platform.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformGeometry {
    pub base_radius: f32,
    pub platform_radius: f32,
    pub base_angles: [f32; 6],
    pub platform_angles: [f32; 6],
    /// Platform height above the base plane at the neutral pose.
    pub neutral_height: f32,
    /// Full-scale translation for a normalised value of 1.0 (x, y, z).
    pub max_translation: [f32; 3],
    /// Full-scale rotation for a normalised value of 1.0 (roll, pitch, yaw).
    pub max_rotation: [f32; 3],
}

impl Default for PlatformGeometry {
    fn default() -> Self {
        Self {
            base_radius: 300.0,
            platform_radius: 200.0,
            base_angles: [350.0, 10.0, 110.0, 130.0, 230.0, 250.0],
            platform_angles: [310.0, 50.0, 70.0, 170.0, 190.0, 290.0],
            neutral_height: 250.0,
            max_translation: [50.0, 50.0, 40.0],
            max_rotation: [15.0, 15.0, 20.0],
        }
    }
}

type Vec3 = [f64; 3];

fn joint(radius: f32, angle_deg: f32) -> Vec3 {
    let a = (angle_deg as f64).to_radians();
    [radius as f64 * a.cos(), radius as f64 * a.sin(), 0.0]
}

/// Rz(yaw) * Ry(pitch) * Rx(roll)
fn rotation_matrix(roll: f64, pitch: f64, yaw: f64) -> [Vec3; 3] {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();
    [
        [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
        [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
        [-sp, cp * sr, cp * cr],
    ]
}

fn rotate(m: &[Vec3; 3], v: &Vec3) -> Vec3 {
    std::array::from_fn(|row| m[row][0] * v[0] + m[row][1] * v[1] + m[row][2] * v[2])
}

/// Inverse kinematics for a Stewart-Gough platform driven by normalised poses.
#[derive(Debug, Clone, Default)]
pub struct StewartTransform {
    geometry: Option<PlatformGeometry>,
    base_joints: [Vec3; 6],
    platform_joints: [Vec3; 6],
    lengths: ActuatorLengths,
}

impl StewartTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geometry(geometry: PlatformGeometry) -> Self {
        let mut transform = Self::new();
        transform.load(geometry);
        transform
    }

    fn load(&mut self, geometry: PlatformGeometry) {
        self.base_joints = std::array::from_fn(|i| joint(geometry.base_radius, geometry.base_angles[i]));
        self.platform_joints = std::array::from_fn(|i| joint(geometry.platform_radius, geometry.platform_angles[i]));
        self.geometry = Some(geometry);
    }
}

impl Transform for StewartTransform {
    fn begin(&mut self, session: &ConnectionSession) {
        tracing::debug!("Loading geometry for '{}'", session.name);
        self.load(session.geometry.clone());
    }

    fn apply_translation_and_rotation(&mut self, position: [f32; 3], rotation: [f32; 3]) -> Result<(), TransformError> {
        let geometry = self.geometry.as_ref().ok_or(TransformError::NoGeometry)?;
        let pose = [position[0], position[1], position[2], rotation[0], rotation[1], rotation[2]];
        if pose.iter().any(|v| !v.is_finite()) {
            return Err(TransformError::NonFinite(pose));
        }

        let t: Vec3 = [
            (position[0] * geometry.max_translation[0]) as f64,
            (position[1] * geometry.max_translation[1]) as f64,
            (geometry.neutral_height + position[2] * geometry.max_translation[2]) as f64,
        ];
        let angle = |i: usize| ((rotation[i] * geometry.max_rotation[i]) as f64).to_radians();
        let r = rotation_matrix(angle(0), angle(1), angle(2));

        for i in 0..6 {
            let p = rotate(&r, &self.platform_joints[i]);
            let b = &self.base_joints[i];
            let leg: Vec3 = std::array::from_fn(|k| t[k] + p[k] - b[k]);
            self.lengths[i] = leg.iter().map(|c| c * c).sum::<f64>().sqrt() as f32;
        }
        Ok(())
    }

    fn raw_length(&self, index: usize) -> f32 {
        self.lengths.get(index).copied().unwrap_or(0.0)
    }
}
