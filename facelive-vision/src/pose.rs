//! Head pose decoding from a facial transformation matrix.
//!
//! The vision model hands back a 4x4 row-major transform per detected face.
//! Only the upper-left 3x3 rotation block is used:
//!
//! ```text
//! [ r11 r12 r13 tx ]     indices  0  1  2  3
//! [ r21 r22 r23 ty ]              4  5  6  7
//! [ r31 r32 r33 tz ]              8  9 10 11
//! [  0   0   0   1 ]             12 13 14 15
//! ```

/// Flattened row-major 4x4 transform.
pub type TransformMatrix = [f32; 16];

/// Head rotation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    pub yaw: f32,
    pub pitch: f32,
}

/// Decode yaw and pitch from the rotation block of `m`.
pub fn decode_pose(m: &TransformMatrix) -> PoseEstimate {
    let r31 = m[8] as f64;
    let r32 = m[9] as f64;
    let r33 = m[10] as f64;

    let pitch = (-r32).atan2(r33).to_degrees();
    let yaw = r31.atan2((r32 * r32 + r33 * r33).sqrt()).to_degrees();

    PoseEstimate {
        yaw: yaw as f32,
        pitch: pitch as f32,
    }
}

/// Decode an optional model output; `None` means no face was found.
pub fn decode_optional(m: Option<&TransformMatrix>) -> Option<PoseEstimate> {
    m.map(decode_pose)
}

/// Build a transform whose rotation block decodes back to `yaw`/`pitch`.
///
/// Composes a rotation about Y by `-yaw` with a rotation about X by `-pitch`
/// (R = Ry(-yaw) * Rx(-pitch)), which puts `sin(yaw)` into r31 and keeps the
/// pitch terms in r32/r33. Translation is zero.
pub fn transform_from_pose(yaw: f32, pitch: f32) -> TransformMatrix {
    let (sy, cy) = (-(yaw as f64).to_radians()).sin_cos();
    let (sp, cp) = (-(pitch as f64).to_radians()).sin_cos();

    // Ry(b) = [cb 0 sb; 0 1 0; -sb 0 cb], Rx(a) = [1 0 0; 0 ca -sa; 0 sa ca]
    let r = [
        [cy, sy * sp, sy * cp],
        [0.0, cp, -sp],
        [-sy, cy * sp, cy * cp],
    ];

    let mut m = [0.0f32; 16];
    for row in 0..3 {
        for col in 0..3 {
            m[row * 4 + col] = r[row][col] as f32;
        }
    }
    m[15] = 1.0;
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> TransformMatrix {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        m
    }

    #[test]
    fn identity_is_frontal() {
        let pose = decode_pose(&identity());
        assert!(pose.yaw.abs() < 1e-6);
        assert!(pose.pitch.abs() < 1e-6);
    }

    #[test]
    fn reads_rotation_block_only() {
        let mut m = identity();
        // translation and projective row must not matter
        m[3] = 100.0;
        m[7] = -50.0;
        m[11] = 7.0;
        m[12] = 3.0;
        let pose = decode_pose(&m);
        assert!(pose.yaw.abs() < 1e-6);
        assert!(pose.pitch.abs() < 1e-6);
    }

    #[test]
    fn pure_yaw() {
        // r31 = sin(30deg), r33 = cos(30deg)
        let mut m = identity();
        m[8] = 0.5;
        m[10] = (3.0f32).sqrt() / 2.0;
        let pose = decode_pose(&m);
        assert!((pose.yaw - 30.0).abs() < 1e-4, "yaw {}", pose.yaw);
        assert!(pose.pitch.abs() < 1e-4);
    }

    #[test]
    fn pure_pitch_sign() {
        // r32 negative -> positive pitch
        let mut m = identity();
        m[9] = -0.5;
        m[10] = (3.0f32).sqrt() / 2.0;
        let pose = decode_pose(&m);
        assert!((pose.pitch - 30.0).abs() < 1e-4, "pitch {}", pose.pitch);
        assert!(pose.yaw.abs() < 1e-4);
    }

    #[test]
    fn synthesized_transform_decodes_back() {
        for &(yaw, pitch) in &[(-20.0, 0.0), (16.0, 5.0), (0.0, -9.0), (40.0, 25.0)] {
            let pose = decode_pose(&transform_from_pose(yaw, pitch));
            assert!((pose.yaw - yaw).abs() < 1e-3, "{yaw} -> {}", pose.yaw);
            assert!((pose.pitch - pitch).abs() < 1e-3, "{pitch} -> {}", pose.pitch);
        }
    }

    #[test]
    fn missing_face_yields_none() {
        assert_eq!(decode_optional(None), None);
        assert!(decode_optional(Some(&identity())).is_some());
    }
}
