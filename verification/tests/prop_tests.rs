//! Property-based tests for geofence geometry and face scoring.

use presence_types::{GeoPoint, DEFAULT_GEOFENCE_CENTER};
use presence_verification::face;
use presence_verification::geofence::{destination_point, distance_meters};
use proptest::prelude::*;

fn arb_point() -> impl Strategy<Value = GeoPoint> {
    (-89.0f64..89.0, -179.0f64..179.0).prop_map(|(lat, lng)| GeoPoint::new(lat, lng))
}

proptest! {
    #[test]
    fn distance_is_symmetric(a in arb_point(), b in arb_point()) {
        let ab = distance_meters(&a, &b);
        let ba = distance_meters(&b, &a);
        prop_assert!((ab - ba).abs() < 1e-6, "{ab} vs {ba}");
    }

    #[test]
    fn distance_is_non_negative_and_bounded(a in arb_point(), b in arb_point()) {
        let d = distance_meters(&a, &b);
        prop_assert!(d >= 0.0);
        // Half the Earth's circumference.
        prop_assert!(d <= std::f64::consts::PI * 6_371_000.0 + 1.0);
    }

    #[test]
    fn boundary_is_inclusive_inside_and_exclusive_beyond(
        center in arb_point(),
        radius in 10.0f64..50_000.0,
        bearing in 0.0f64..360.0,
    ) {
        let inside = destination_point(&center, bearing, radius - 1.0);
        let outside = destination_point(&center, bearing, radius + 1.0);
        prop_assert!(distance_meters(&inside, &center) <= radius);
        prop_assert!(distance_meters(&outside, &center) > radius);
    }

    #[test]
    fn face_score_of_identical_images_is_one(image in proptest::collection::vec(any::<u8>(), 1..512)) {
        let a = face::encode(&image);
        let b = face::encode(&image);
        prop_assert_eq!(&a, &b);
        let s = face::score(&a, &b, 0.7);
        prop_assert_eq!(s.value, 1.0);
        prop_assert!(s.matched);
    }

    #[test]
    fn face_score_is_a_fraction(
        x in proptest::collection::vec(any::<u8>(), 1..64),
        y in proptest::collection::vec(any::<u8>(), 1..64),
    ) {
        let s = face::score(&face::encode(&x), &face::encode(&y), 0.6);
        prop_assert!((0.0..=1.0).contains(&s.value));
        prop_assert_eq!(s.matched, s.value >= 0.6);
    }
}

#[test]
fn documented_boundary_example() {
    let near = destination_point(&DEFAULT_GEOFENCE_CENTER, 0.0, 999.0);
    let far = destination_point(&DEFAULT_GEOFENCE_CENTER, 0.0, 1001.0);
    assert!(distance_meters(&near, &DEFAULT_GEOFENCE_CENTER) <= 1000.0);
    assert!(distance_meters(&far, &DEFAULT_GEOFENCE_CENTER) > 1000.0);
}
