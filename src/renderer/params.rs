//! Per-frame camera and light parameters.
//!
//! Everything here is derived once per frame and handed to both passes.
//! Light directions and positions are transformed into view space up front:
//! the view transform is orthonormal, so its inverse transpose is itself and
//! normals survive the transform unscaled, which saves the lighting shader a
//! per-pixel change of frame.

use glam::{Mat4, Vec2, Vec3};

pub const Z_NEAR: f32 = 0.001;
pub const Z_FAR: f32 = 100.0;

pub struct DirLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirLight {
    fn default() -> DirLight {
        DirLight {
            direction: Vec3::new(1.0, -1.0, -1.0),
            color: Vec3::ONE,
            intensity: 2.5,
        }
    }
}

pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    /// Outer cone angle, degrees.
    pub phi_deg: f32,
    /// Inner cone angle, degrees.
    pub theta_deg: f32,
    pub intensity: f32,
}

impl Default for SpotLight {
    fn default() -> SpotLight {
        SpotLight {
            position: Vec3::new(2.0, 2.0, 2.0),
            direction: Vec3::new(-1.0, -1.0, -1.0),
            color: Vec3::new(0.0, 1.0, 1.0),
            phi_deg: 60.0,
            theta_deg: 45.0,
            intensity: 5.0,
        }
    }
}

/// The fully derived per-frame uniform block.
pub struct FrameParams {
    pub mat_model: Mat4,
    pub mat_view: Mat4,
    pub mat_proj: Mat4,
    pub viewport: (i32, i32),
    pub z_near: f32,
    pub z_far: f32,
    pub fov_y_deg: f32,
    pub specular_pow: f32,
    pub morph_progress: f32,
    /// View space.
    pub dir_light_dir: Vec3,
    /// Premultiplied by intensity.
    pub dir_light_color: Vec3,
    /// View space.
    pub spot_light_pos: Vec3,
    /// View space.
    pub spot_light_dir: Vec3,
    /// Premultiplied by intensity.
    pub spot_light_color: Vec3,
    /// Cosines of the (outer, inner) cone angles.
    pub spot_light_angle_cos: Vec2,
}

impl FrameParams {
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        mat_view: Mat4,
        mat_model: Mat4,
        fov_y_deg: f32,
        viewport: (i32, i32),
        specular_pow: f32,
        morph_progress: f32,
        dir_light: &DirLight,
        spot_light: &SpotLight,
    ) -> FrameParams {
        let aspect = viewport.0 as f32 / viewport.1.max(1) as f32;
        // Near and far swapped on purpose: with the depth buffer cleared to
        // 0.0 and compared with GREATER, most of the float precision lands
        // near the camera.
        let mat_proj = Mat4::perspective_rh_gl(fov_y_deg.to_radians(), aspect, Z_FAR, Z_NEAR);

        FrameParams {
            mat_model,
            mat_view,
            mat_proj,
            viewport,
            z_near: Z_NEAR,
            z_far: Z_FAR,
            fov_y_deg,
            specular_pow,
            morph_progress,
            dir_light_dir: (mat_view * dir_light.direction.normalize().extend(0.0)).truncate(),
            dir_light_color: dir_light.intensity * dir_light.color,
            spot_light_pos: (mat_view * spot_light.position.extend(1.0)).truncate(),
            spot_light_dir: (mat_view * spot_light.direction.normalize().extend(0.0)).truncate(),
            spot_light_color: spot_light.intensity * spot_light.color,
            spot_light_angle_cos: Vec2::new(
                spot_light.phi_deg.to_radians().cos(),
                spot_light.theta_deg.to_radians().cos(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn derive(mat_view: Mat4) -> FrameParams {
        FrameParams::derive(
            mat_view,
            Mat4::IDENTITY,
            45.0,
            (1280, 720),
            16.0,
            0.0,
            &DirLight::default(),
            &SpotLight::default(),
        )
    }

    #[test]
    fn projection_orders_depth_back_to_front() {
        // Reversed depth: a point close to the camera must come out with a
        // larger NDC z than a distant one, and the far plane maps below the
        // near plane.
        let params = derive(Mat4::IDENTITY);
        let project = |z: f32| {
            let clip = params.mat_proj * Vec4::new(0.0, 0.0, z, 1.0);
            clip.z / clip.w
        };
        let near = project(-0.01);
        let far = project(-50.0);
        assert!(near > far, "near {near} should exceed far {far}");
    }

    #[test]
    fn directions_ignore_the_view_translation() {
        let mat_view = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let params = derive(mat_view);
        // w = 0: translation must not leak into the direction.
        let expected = Vec3::new(1.0, -1.0, -1.0).normalize();
        assert!(params.dir_light_dir.abs_diff_eq(expected, 1e-6));
        // w = 1: the position does move.
        assert!(params
            .spot_light_pos
            .abs_diff_eq(Vec3::new(12.0, 2.0, 2.0), 1e-5));
    }

    #[test]
    fn directions_rotate_with_the_view() {
        let mat_view = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let params = derive(mat_view);
        let expected = (mat_view * Vec3::new(1.0, -1.0, -1.0).normalize().extend(0.0)).truncate();
        assert!(params.dir_light_dir.abs_diff_eq(expected, 1e-6));
        // Still unit length: the view transform is orthonormal.
        assert!((params.dir_light_dir.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cone_cosines_put_the_inner_angle_above_the_outer() {
        let params = derive(Mat4::IDENTITY);
        let (outer, inner) = (
            params.spot_light_angle_cos.x,
            params.spot_light_angle_cos.y,
        );
        assert!(inner > outer, "cos(45) should exceed cos(60)");
        assert!((outer - 0.5).abs() < 1e-6);
    }

    #[test]
    fn light_colors_carry_their_intensity() {
        let params = derive(Mat4::IDENTITY);
        assert!(params.dir_light_color.abs_diff_eq(Vec3::splat(2.5), 1e-6));
        assert!(params
            .spot_light_color
            .abs_diff_eq(Vec3::new(0.0, 5.0, 5.0), 1e-6));
    }
}
