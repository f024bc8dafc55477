//! Low-discrepancy sequences and GGX microfacet helpers shared by the
//! prefilter and BRDF integration passes.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

/// Hammersley quasi-random sequence (2D).
#[must_use]
pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

/// Van der Corput radical inverse (base 2)
#[must_use]
pub fn radical_inverse_vdc(mut bits: u32) -> f32 {
    bits = bits.rotate_right(16);
    bits = ((bits & 0x5555_5555) << 1) | ((bits & 0xAAAA_AAAA) >> 1);
    bits = ((bits & 0x3333_3333) << 2) | ((bits & 0xCCCC_CCCC) >> 2);
    bits = ((bits & 0x0F0F_0F0F) << 4) | ((bits & 0xF0F0_F0F0) >> 4);
    bits = ((bits & 0x00FF_00FF) << 8) | ((bits & 0xFF00_FF00) >> 8);
    bits as f32 * 2.328_306_4e-10 // 1.0 / 0x100000000
}

/// Orthonormal tangent and bitangent around `n`.
#[must_use]
pub fn tangent_frame(n: Vec3) -> (Vec3, Vec3) {
    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent, bitangent)
}

/// Maps a 2D sample to a GGX-distributed half vector in tangent space
/// (`z` is the normal).
#[must_use]
pub fn importance_sample_ggx_tangent(xi: Vec2, roughness: f32) -> Vec3 {
    let a = roughness * roughness;

    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

/// GGX importance sampling of a world-space half vector around `n`.
#[must_use]
pub fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let h = importance_sample_ggx_tangent(xi, roughness);
    let (tangent, bitangent) = tangent_frame(n);
    (tangent * h.x + bitangent * h.y + n * h.z).normalize()
}

/// GGX / Trowbridge-Reitz normal distribution function.
#[must_use]
pub fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * denom * denom).max(f32::MIN_POSITIVE)
}

/// Smith's geometry function for IBL (uses k = alpha^2 / 2)
#[must_use]
pub fn geometry_smith_ibl(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let k = a / 2.0;
    let ggx_v = n_dot_v / (n_dot_v * (1.0 - k) + k);
    let ggx_l = n_dot_l / (n_dot_l * (1.0 - k) + k);
    ggx_v * ggx_l
}

/// Reflects `v` about the half vector `h`.
#[must_use]
pub fn reflect_about(v: Vec3, h: Vec3) -> Vec3 {
    (2.0 * v.dot(h) * h - v).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radical_inverse_known_values() {
        assert_eq!(radical_inverse_vdc(0), 0.0);
        assert!((radical_inverse_vdc(1) - 0.5).abs() < 1e-7);
        assert!((radical_inverse_vdc(2) - 0.25).abs() < 1e-7);
        assert!((radical_inverse_vdc(3) - 0.75).abs() < 1e-7);
    }

    #[test]
    fn hammersley_points_stay_in_unit_square() {
        for i in 0..256 {
            let p = hammersley(i, 256);
            assert!((0.0..1.0).contains(&p.x));
            assert!((0.0..1.0).contains(&p.y));
        }
    }

    #[test]
    fn zero_roughness_half_vector_is_normal() {
        let n = Vec3::new(0.3, -0.5, 0.8).normalize();
        for i in 0..16 {
            let h = importance_sample_ggx(hammersley(i, 16), n, 0.0);
            assert!(h.dot(n) > 0.9999, "sample {i} strayed from normal");
        }
    }

    #[test]
    fn tangent_frame_is_orthonormal() {
        for n in [Vec3::Z, Vec3::X, Vec3::NEG_Z, Vec3::new(1.0, 1.0, 1.0)] {
            let n = n.normalize();
            let (t, b) = tangent_frame(n);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(b.dot(n).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5);
            assert!((t.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn smith_geometry_is_one_for_smooth_head_on() {
        assert!((geometry_smith_ibl(1.0, 1.0, 0.0) - 1.0).abs() < 1e-6);
        assert!(geometry_smith_ibl(0.2, 0.3, 0.8) < 1.0);
    }
}
