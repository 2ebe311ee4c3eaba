use glam::{Mat4, Vec3};

use crate::pipeline::DepthConvention;

/// Free-look perspective camera.
///
/// Angles are in radians. A yaw of `-PI / 2` looks down `-Z`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Vertical field of view.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            yaw: -std::f32::consts::FRAC_PI_2,
            pitch: 0.0,
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    const PITCH_LIMIT: f32 = 89f32 * std::f32::consts::PI / 180.0;

    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(cy * cp, sp, sy * cp).normalize()
    }

    /// Turns the camera, keeping the pitch short of straight up or down.
    pub fn rotate(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw += d_yaw;
        self.pitch = (self.pitch + d_pitch).clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Projection into `[0, 1]` depth.
    ///
    /// Forward depth maps `near` to 0 and `far` to 1. Reverse depth swaps the
    /// planes so `near` lands on 1.
    pub fn projection(&self, aspect: f32, depth: DepthConvention) -> Mat4 {
        let (near, far) = match depth {
            DepthConvention::Forward => (self.near, self.far),
            DepthConvention::Reverse => (self.far, self.near),
        };
        Mat4::perspective_rh(self.fov_y, aspect.max(f32::EPSILON), near, far)
    }
}
