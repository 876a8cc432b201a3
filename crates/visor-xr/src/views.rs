//! Projection and view matrices for host renderers.

use glam::{Mat4, Vec3};

use crate::error::{check, XrError, XrResult};
use crate::session::Session;
use crate::types::{Fov, Pose};

/// OpenGL-style asymmetric projection (clip z in `[-1, 1]`), column-major.
pub fn projection_from_fov(fov: &Fov, near: f32, far: f32) -> Mat4 {
    let tan_left = fov.angle_left.tan();
    let tan_right = fov.angle_right.tan();
    let tan_up = fov.angle_up.tan();
    let tan_down = fov.angle_down.tan();

    let tan_width = tan_right - tan_left;
    let tan_height = tan_up - tan_down;
    let offset_z = near;

    let mut m = [0.0f32; 16];
    m[0] = 2.0 / tan_width;
    m[5] = 2.0 / tan_height;
    m[8] = (tan_right + tan_left) / tan_width;
    m[9] = (tan_up + tan_down) / tan_height;
    m[10] = -(far + offset_z) / (far - near);
    m[11] = -1.0;
    m[14] = -(far * (near + offset_z)) / (far - near);
    Mat4::from_cols_array(&m)
}

/// World-to-eye transform for a located pose.
pub fn view_from_pose(pose: &Pose) -> Mat4 {
    Mat4::from_scale_rotation_translation(Vec3::ONE, pose.orientation, pose.position).inverse()
}

impl Session {
    /// Projection for `view` from a fresh view location at display time 0,
    /// so it can lag the frame in flight by one runtime query.
    pub fn projection_matrix(&mut self, view: usize) -> XrResult<Mat4> {
        self.ensure_alive()?;
        self.check_view(view)?;
        let view_configuration = self.caps().system.view_configuration;
        let views = check(
            "xrLocateViews",
            self.runtime
                .locate_views(self.session, view_configuration, 0, self.space),
        )?;
        let fov = views
            .get(view)
            .map(|located| located.fov)
            .ok_or_else(|| XrError::unavailable(format!("runtime located no view {view}")))?;
        Ok(projection_from_fov(
            &fov,
            self.config.near_plane,
            self.config.far_plane,
        ))
    }

    /// Inverse of the pose located for `view` in the last frame.
    pub fn view_matrix(&self, view: usize) -> XrResult<Mat4> {
        self.ensure_alive()?;
        self.check_view(view)?;
        let pose = self
            .frame
            .located()
            .and_then(|views| views.get(view))
            .map(|located| located.pose)
            .ok_or_else(|| XrError::unavailable("views have not been located yet"))?;
        Ok(view_from_pose(&pose))
    }
}
