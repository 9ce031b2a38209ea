// src/motion/geometry.rs - small pure-math helpers for coordinate transforms

use std::f32::consts::PI;

/// Wrap an angle in radians into [0, 2*PI).
pub fn wrap_radians(angle: f32) -> f32 {
    let two_pi = 2.0 * PI;
    angle - two_pi * (angle / two_pi).floor()
}

/// Wrap an angle in degrees into [0, 360).
pub fn wrap_degrees(angle: f32) -> f32 {
    angle - 360.0 * (angle / 360.0).floor()
}

/// Cosine rule: angle (radians) opposite side c in a triangle with sides
/// a, b, c. The ratio is clamped so slightly-out-of-reach geometry yields a
/// straight arm rather than NaN.
pub fn cosine_rule(a: f32, b: f32, c: f32) -> f32 {
    let val = (a * a + b * b - c * c) / (2.0 * a * b);
    val.clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_radians_range() {
        assert!((wrap_radians(3.0 * PI) - PI).abs() < 1e-6);
        assert!((wrap_radians(-PI / 2.0) - 1.5 * PI).abs() < 1e-6);
        assert_eq!(wrap_radians(0.0), 0.0);
    }

    #[test]
    fn wrap_degrees_range() {
        assert_eq!(wrap_degrees(720.0), 0.0);
        assert!((wrap_degrees(-90.0) - 270.0).abs() < 1e-4);
    }

    #[test]
    fn cosine_rule_right_triangle() {
        // 3-4-5 triangle: the angle opposite the hypotenuse is 90 degrees.
        assert!((cosine_rule(3.0, 4.0, 5.0) - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_rule_clamps_unreachable() {
        // Side c longer than a + b is geometrically impossible; clamp gives PI.
        assert!((cosine_rule(1.0, 1.0, 5.0) - PI).abs() < 1e-6);
    }
}
