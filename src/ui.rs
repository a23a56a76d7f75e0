//! The debug parameter surface.
//!
//! Every tunable the viewer exposes lives here: camera state, the two
//! lights, and the shading knobs. The fields are plain and public so any
//! widget layer can drive them; the methods below map SDL2 mouse and
//! keyboard input onto them directly.

use glam::{Mat4, Vec3, Vec4};
use sdl2::keyboard::{KeyboardState, Keycode, Scancode};

use crate::renderer::params::{DirLight, FrameParams, SpotLight};

const PI: f32 = std::f32::consts::PI;
const TWO_PI: f32 = 2.0 * PI;
const HALF_PI: f32 = 0.5 * PI;

pub struct Ui {
    pub cam_pos: Vec3,
    /// Camera pitch, radians, clamped to straight up/down.
    pub cam_angle_x: f32,
    /// Camera yaw, radians, wrapped to [0, 2pi).
    pub cam_angle_y: f32,
    pub cam_speed: f32,
    pub fov_deg: f32,
    pub specular_pow: f32,
    pub morph_progress: f32,
    pub dir_light: DirLight,
    pub spot_light: SpotLight,
    /// Automatic model rotation, cycles per second.
    pub rotation_speed: f32,
    cycle: f32,
}

impl Ui {
    pub fn new() -> Ui {
        Ui {
            cam_pos: Vec3::new(0.0, 0.0, 1.0),
            cam_angle_x: 0.0,
            cam_angle_y: 0.0,
            cam_speed: 1.0,
            fov_deg: 45.0,
            specular_pow: 16.0,
            morph_progress: 0.0,
            dir_light: DirLight::default(),
            spot_light: SpotLight::default(),
            rotation_speed: 0.0,
            cycle: 0.0,
        }
    }

    fn cam_right(&self) -> Vec3 {
        Vec3::new(self.cam_angle_y.cos(), 0.0, self.cam_angle_y.sin())
    }

    fn cam_forward(&self) -> Vec3 {
        let right = self.cam_right();
        Vec3::new(right.z, 0.0, -right.x) * self.cam_angle_x.cos()
            + Vec3::new(0.0, self.cam_angle_x.sin(), 0.0)
    }

    fn cam_up(&self) -> Vec3 {
        self.cam_right().cross(self.cam_forward())
    }

    /// Mouse-drag look. The delta is scaled by tan(fov) over the viewport
    /// height so a drag across the window sweeps a comparable arc at any
    /// zoom level.
    pub fn look(&mut self, dx: f32, dy: f32, viewport_height: f32) {
        let fov_tan = self.fov_deg.to_radians().tan();
        self.cam_angle_x += fov_tan * dy / viewport_height;
        self.cam_angle_y -= fov_tan * dx / viewport_height;
        self.cam_angle_x = self.cam_angle_x.clamp(-HALF_PI, HALF_PI);
        self.cam_angle_y = self.cam_angle_y.rem_euclid(TWO_PI);
    }

    /// WASD flight in the camera's horizontal frame, E/Q for straight up
    /// and down.
    pub fn movement(&mut self, delta_time: f32, keyboard: &KeyboardState) {
        let right = self.cam_right();
        let forward = self.cam_forward();
        let step = delta_time * self.cam_speed;
        if keyboard.is_scancode_pressed(Scancode::W) {
            self.cam_pos += step * forward;
        }
        if keyboard.is_scancode_pressed(Scancode::S) {
            self.cam_pos -= step * forward;
        }
        if keyboard.is_scancode_pressed(Scancode::D) {
            self.cam_pos += step * right;
        }
        if keyboard.is_scancode_pressed(Scancode::A) {
            self.cam_pos -= step * right;
        }
        if keyboard.is_scancode_pressed(Scancode::E) {
            self.cam_pos.y += step;
        }
        if keyboard.is_scancode_pressed(Scancode::Q) {
            self.cam_pos.y -= step;
        }
    }

    /// Steps one of the tunables. Stands in for the slider row of a widget
    /// toolkit; the current values go to the log so they stay visible.
    pub fn handle_key(&mut self, keycode: Keycode) {
        match keycode {
            Keycode::F1 => self.fov_deg = (self.fov_deg - 5.0).clamp(15.0, 90.0),
            Keycode::F2 => self.fov_deg = (self.fov_deg + 5.0).clamp(15.0, 90.0),
            Keycode::F3 => self.specular_pow = (self.specular_pow - 8.0).max(0.0),
            Keycode::F4 => self.specular_pow = (self.specular_pow + 8.0).min(256.0),
            Keycode::F5 => self.morph_progress = (self.morph_progress - 0.1).clamp(0.0, 1.0),
            Keycode::F6 => self.morph_progress = (self.morph_progress + 0.1).clamp(0.0, 1.0),
            Keycode::F7 => self.rotation_speed = (self.rotation_speed - 0.1).clamp(0.0, 1.0),
            Keycode::F8 => self.rotation_speed = (self.rotation_speed + 0.1).clamp(0.0, 1.0),
            Keycode::Minus => self.cam_speed = (self.cam_speed - 0.5).clamp(0.0, 5.0),
            Keycode::Equals => self.cam_speed = (self.cam_speed + 0.5).clamp(0.0, 5.0),
            Keycode::Num7 => self.spot_light.intensity = (self.spot_light.intensity - 0.5).max(0.0),
            Keycode::Num8 => self.spot_light.intensity += 0.5,
            Keycode::Num9 => self.dir_light.intensity = (self.dir_light.intensity - 0.5).max(0.0),
            Keycode::Num0 => self.dir_light.intensity += 0.5,
            _ => return,
        }
        log::info!(
            "fov {:.0} deg, speed {:.1}, specular {:.0}, morph {:.2}, rotation {:.1}, dir x{:.1}, spot x{:.1}",
            self.fov_deg,
            self.cam_speed,
            self.specular_pow,
            self.morph_progress,
            self.rotation_speed,
            self.dir_light.intensity,
            self.spot_light.intensity,
        );
    }

    /// Advances the automatic model rotation.
    pub fn tick(&mut self, delta_time: f32) {
        self.cycle = (self.cycle + self.rotation_speed * delta_time).fract();
    }

    fn rotation_angle(&self) -> f32 {
        TWO_PI * smoothstep(self.cycle)
    }

    /// View matrix from the camera basis: rows are right/up/-forward,
    /// followed by the translation to the camera origin.
    pub fn view_matrix(&self) -> Mat4 {
        let basis = Mat4::from_cols(
            self.cam_right().extend(0.0),
            self.cam_up().extend(0.0),
            (-self.cam_forward()).extend(0.0),
            Vec4::W,
        )
        .transpose();
        basis * Mat4::from_translation(-self.cam_pos)
    }

    pub fn frame_params(&self, width: i32, height: i32) -> FrameParams {
        let mat_model = Mat4::from_rotation_x(self.rotation_angle());
        FrameParams::derive(
            self.view_matrix(),
            mat_model,
            self.fov_deg,
            (width, height),
            self.specular_pow,
            self.morph_progress,
            &self.dir_light,
            &self.spot_light,
        )
    }
}

fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
