// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and conversion functions.
use nalgebra::{Isometry3, Matrix4, Rotation3, SMatrix, SVector, Vector3};
use std::sync::atomic::{AtomicU64, Ordering};

/// converts a 4x4 column-major homogenous matrix to an Isometry
pub fn array_to_isometry(array: &[f64; 16]) -> Isometry3<f64> {
    let rot = Rotation3::from_matrix(
        &Matrix4::from_column_slice(array)
            .remove_column(3)
            .remove_row(3),
    );
    Isometry3::from_parts(
        Vector3::new(array[12], array[13], array[14]).into(),
        rot.into(),
    )
}

/// converts an Isometry to a 4x4 column-major homogenous matrix
pub fn isometry_to_array(isometry: &Isometry3<f64>) -> [f64; 16] {
    let mut out = [0.; 16];
    for (i, &x) in isometry.to_homogeneous().iter().enumerate() {
        out[i] = x;
    }
    out
}

/// A Vector with 7 entries
pub type Vector7 = SVector<f64, 7>;
/// A Matrix with 6 rows and 7 columns
pub type Matrix6x7 = SMatrix<f64, 6, 7>;
/// A Matrix with 7 rows and 7 columns
pub type Matrix7 = SMatrix<f64, 7, 7>;

/// A f64 which can be shared between the real-time thread and caller threads.
///
/// Stored as its bit pattern, so loads and stores never tear.
#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        AtomicF64(AtomicU64::new(value.to_bits()))
    }
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release)
    }
}

#[cfg(test)]
mod test {
    use crate::utils::{array_to_isometry, isometry_to_array, AtomicF64};
    use nalgebra::{Isometry3, Rotation3, Translation3, UnitQuaternion, Vector3};

    #[test]
    fn isometry_round_trip() {
        let isometry = Isometry3::from_parts(
            Translation3::new(0.3, -0.1, 0.5),
            UnitQuaternion::from_euler_angles(std::f64::consts::PI, 0.1, -0.4),
        );
        let array = isometry_to_array(&isometry);
        assert_eq!(array[3], 0.);
        assert_eq!(array[15], 1.);
        assert!((array[12] - 0.3).abs() < 1e-12);
        let back = array_to_isometry(&array);
        assert!((back.translation.vector - isometry.translation.vector).norm() < 1e-12);
        assert!(back.rotation.angle_to(&isometry.rotation) < 1e-9);
    }

    #[test]
    fn array_to_isometry_nan_test() {
        let o_t_ee_c = [
            1.0,
            -0.000000011046552201160267,
            0.000000008312911920110592,
            0.0,
            -0.000000011046552077288223,
            -0.9999999999999999,
            -0.000000014901161362226844,
            0.0,
            0.000000008312912084717049,
            0.000000014901161270397825,
            -0.9999999999999999,
            0.0,
            0.30689056578595225,
            -0.000000003883240449999549,
            0.486882056335292,
            1.0,
        ];
        let pose = array_to_isometry(&o_t_ee_c);
        let mut rotation: Rotation3<f64> = pose.rotation.to_rotation_matrix();
        rotation.renormalize();
        for i in rotation.matrix().iter() {
            assert!(i.is_finite());
        }
        assert!(pose.rotation.angle().is_finite());
        assert!((pose.translation.vector - Vector3::new(0.30689056578595225, 0., 0.486882056335292))
            .norm()
            < 1e-8);
    }

    #[test]
    fn atomic_f64() {
        let value = AtomicF64::new(0.25);
        assert_eq!(value.load(), 0.25);
        value.store(-3.5);
        assert_eq!(value.load(), -3.5);
    }
}
