use nalgebra::{matrix, Matrix3, Vector3};

use crate::{
    datatypes::{Plate, Quad},
    error::AmberError,
};

/// Subdivides a rectangle into a grid of quads
///
/// The rectangle spans `width_x` by `width_y`, centered at the origin in
/// the z=0 plane, cut into `divisions_x` by `divisions_y` equal cells. Each
/// cell becomes one quad whose corners run from the (-x, -y) corner through
/// (-x, +y) and (+x, +y) to (+x, -y).
///
/// # Arguments
/// * `width_x` - Plate extent along x
/// * `width_y` - Plate extent along y
/// * `divisions_x` - Number of grid cells along x
/// * `divisions_y` - Number of grid cells along y
///
/// # Returns
/// A Plate owning `divisions_x * divisions_y` quads
pub fn make_plate(
    width_x: f64,
    width_y: f64,
    divisions_x: usize,
    divisions_y: usize,
) -> Result<Plate, AmberError> {
    if !(width_x > 0.0) || !(width_y > 0.0) {
        return Err(AmberError::InvalidGeometry(format!(
            "plate dimensions must be positive, got {} x {}",
            width_x, width_y
        )));
    }
    if divisions_x == 0 || divisions_y == 0 {
        return Err(AmberError::InvalidGeometry(format!(
            "plate division counts must be positive, got {} x {}",
            divisions_x, divisions_y
        )));
    }

    let dx = width_x / divisions_x as f64;
    let dy = width_y / divisions_y as f64;

    let mut quads: Vec<Quad> = Vec::with_capacity(divisions_x * divisions_y);

    for i in 0..divisions_x {
        let x = -width_x / 2.0 + dx * (i as f64 + 0.5);

        for j in 0..divisions_y {
            let y = -width_y / 2.0 + dy * (j as f64 + 0.5);

            quads.push(Quad {
                points: [
                    Vector3::new(x - dx / 2.0, y - dy / 2.0, 0.0),
                    Vector3::new(x - dx / 2.0, y + dy / 2.0, 0.0),
                    Vector3::new(x + dx / 2.0, y + dy / 2.0, 0.0),
                    Vector3::new(x + dx / 2.0, y - dy / 2.0, 0.0),
                ],
            });
        }
    }

    Ok(Plate { quads })
}

// Rotation matrices per https://en.wikipedia.org/wiki/Rotation_matrix

pub fn x_rotation(angle: f64) -> Matrix3<f64> {
    matrix![
        1.0, 0.0, 0.0;
        0.0, angle.cos(), -angle.sin();
        0.0, angle.sin(), angle.cos();
    ]
}

pub fn y_rotation(angle: f64) -> Matrix3<f64> {
    matrix![
        angle.cos(), 0.0, angle.sin();
        0.0, 1.0, 0.0;
        -angle.sin(), 0.0, angle.cos();
    ]
}

pub fn z_rotation(angle: f64) -> Matrix3<f64> {
    matrix![
        angle.cos(), -angle.sin(), 0.0;
        angle.sin(), angle.cos(), 0.0;
        0.0, 0.0, 1.0;
    ]
}

/// Combined rotation about x, then y, then z, as one matrix.
pub fn rotation_xyz(angle_x: f64, angle_y: f64, angle_z: f64) -> Matrix3<f64> {
    z_rotation(angle_z) * y_rotation(angle_y) * x_rotation(angle_x)
}

/// Applies a rotation matrix to every point of every quad. Returns a new
/// plate; the input is never aliased or mutated.
pub fn rotate(plate: &Plate, rotation: &Matrix3<f64>) -> Plate {
    Plate {
        quads: plate
            .quads
            .iter()
            .map(|quad| Quad {
                points: quad.points.map(|point| rotation * point),
            })
            .collect(),
    }
}

pub fn rotate_x(plate: &Plate, angle: f64) -> Plate {
    rotate(plate, &x_rotation(angle))
}

pub fn rotate_y(plate: &Plate, angle: f64) -> Plate {
    rotate(plate, &y_rotation(angle))
}

pub fn rotate_z(plate: &Plate, angle: f64) -> Plate {
    rotate(plate, &z_rotation(angle))
}

/// Adds a constant vector to every point of every quad. Returns a new
/// plate.
pub fn offset(plate: &Plate, vector: Vector3<f64>) -> Plate {
    Plate {
        quads: plate
            .quads
            .iter()
            .map(|quad| Quad {
                points: quad.points.map(|point| point + vector),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// All six pairwise distances between the corners of a quad.
    fn pairwise_distances(quad: &Quad) -> Vec<f64> {
        let mut distances = Vec::new();
        for i in 0..4 {
            for j in (i + 1)..4 {
                distances.push((quad.points[i] - quad.points[j]).norm());
            }
        }
        distances
    }

    #[test]
    fn plate_covers_full_grid() {
        let plate = make_plate(2.0, 1.0, 4, 5).unwrap();

        assert_eq!(plate.quads.len(), 20);

        let points: Vec<_> = plate
            .quads
            .iter()
            .flat_map(|quad| quad.points.iter().copied())
            .collect();

        let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        assert_relative_eq!(min_x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(max_x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(min_y, -0.5, epsilon = 1e-12);
        assert_relative_eq!(max_y, 0.5, epsilon = 1e-12);
        assert!(points.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn unit_plate_corner_order() {
        let plate = make_plate(1.0, 1.0, 1, 1).unwrap();

        assert_eq!(plate.quads.len(), 1);
        let points = plate.quads[0].points;
        assert_relative_eq!(points[0], Vector3::new(-0.5, -0.5, 0.0));
        assert_relative_eq!(points[1], Vector3::new(-0.5, 0.5, 0.0));
        assert_relative_eq!(points[2], Vector3::new(0.5, 0.5, 0.0));
        assert_relative_eq!(points[3], Vector3::new(0.5, -0.5, 0.0));
    }

    #[test]
    fn rejects_bad_plate_parameters() {
        assert!(matches!(
            make_plate(0.0, 1.0, 2, 2),
            Err(AmberError::InvalidGeometry(_))
        ));
        assert!(matches!(
            make_plate(1.0, -3.0, 2, 2),
            Err(AmberError::InvalidGeometry(_))
        ));
        assert!(matches!(
            make_plate(1.0, 1.0, 0, 2),
            Err(AmberError::InvalidGeometry(_))
        ));
        assert!(matches!(
            make_plate(1.0, 1.0, 2, 0),
            Err(AmberError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn transforms_are_rigid() {
        let plate = make_plate(1.5, 0.8, 3, 2).unwrap();

        let moved = offset(
            &rotate_z(&rotate_y(&rotate_x(&plate, 0.7), 1.3), -2.1),
            Vector3::new(4.0, -2.5, 0.75),
        );

        assert_eq!(moved.quads.len(), plate.quads.len());
        for (before, after) in plate.quads.iter().zip(moved.quads.iter()) {
            let original = pairwise_distances(before);
            let transformed = pairwise_distances(after);
            for (a, b) in original.iter().zip(transformed.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn sequential_rotations_match_combined_matrix() {
        let plate = make_plate(1.0, 2.0, 2, 3).unwrap();
        let (ax, ay, az) = (0.31, -1.17, 2.6);

        let sequential = rotate_z(&rotate_y(&rotate_x(&plate, ax), ay), az);
        let combined = rotate(&plate, &rotation_xyz(ax, ay, az));

        for (a, b) in sequential.quads.iter().zip(combined.quads.iter()) {
            for (p, q) in a.points.iter().zip(b.points.iter()) {
                assert_relative_eq!(*p, *q, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn offset_translates_every_point() {
        let plate = make_plate(1.0, 1.0, 2, 2).unwrap();
        let shift = Vector3::new(0.1, -0.2, 0.3);

        let moved = offset(&plate, shift);

        for (before, after) in plate.quads.iter().zip(moved.quads.iter()) {
            for (p, q) in before.points.iter().zip(after.points.iter()) {
                assert_relative_eq!(p + shift, *q);
            }
        }
    }
}
