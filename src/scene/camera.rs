//! Free-look perspective camera

use glam::{Mat4, Vec3};

const WORLD_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
}

/// Camera with yaw/pitch orientation and a zoomable vertical field of view
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
    /// vertical field of view in degrees
    pub zoom: f32,
    pub movement_speed: f32,
    pub mouse_sensitivity: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0))
    }
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: -90.0,
            pitch: 0.0,
            zoom: 45.0,
            movement_speed: 2.5,
            mouse_sensitivity: 0.1,
        }
    }

    pub fn front(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.front().cross(WORLD_UP).normalize()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front(), WORLD_UP)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.zoom.to_radians(), aspect, 0.1, 100.0)
    }

    pub fn process_movement(&mut self, direction: CameraMovement, dt: f32) {
        let velocity = self.movement_speed * dt;
        match direction {
            CameraMovement::Forward => self.position += self.front() * velocity,
            CameraMovement::Backward => self.position -= self.front() * velocity,
            CameraMovement::Left => self.position -= self.right() * velocity,
            CameraMovement::Right => self.position += self.right() * velocity,
        }
    }

    pub fn process_mouse(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.mouse_sensitivity;
        self.pitch = (self.pitch + dy * self.mouse_sensitivity).clamp(-89.0, 89.0);
    }

    pub fn process_scroll(&mut self, dy: f32) {
        self.zoom = (self.zoom - dy).clamp(1.0, 45.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        let front = camera.front();
        assert!((front - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn view_matrix_moves_camera_to_origin() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 3.0));
        let eye = camera.view_matrix().transform_point3(camera.position);
        assert!(eye.length() < 1e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.process_mouse(0.0, 10_000.0);
        assert!(camera.front().y <= 1.0);
        camera.process_mouse(0.0, -20_000.0);
        assert!(camera.front().y >= -1.0);
    }

    #[test]
    fn scroll_clamps_zoom() {
        let mut camera = Camera::default();
        camera.process_scroll(100.0);
        assert_eq!(camera.zoom, 1.0);
        camera.process_scroll(-100.0);
        assert_eq!(camera.zoom, 45.0);
    }
}
