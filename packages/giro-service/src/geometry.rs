//! Planar buffering and spatial ordering helpers.
//!
//! Buffering happens in web-mercator meters with the local scale factor
//! applied, so a 2 km buffer is 2 km on the ground at the latitudes
//! involved, then rings are reprojected to lon/lat for the index filter.

use geo::{
	Area, BooleanOps, Contains, Coord, EuclideanLength, HaversineDistance, LineLocatePoint,
	LineString, MultiPolygon, Point, Polygon,
};

use giro_providers::Coordinate;

const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Web mercator cutoff; latitudes beyond it project to infinity.
const MAX_LATITUDE: f64 = 85.06;
const DISK_SEGMENTS: usize = 64;

pub fn project(c: Coordinate) -> Coord<f64> {
	let lat = c.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();

	Coord {
		x: EARTH_RADIUS_M * c.lon.to_radians(),
		y: EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
	}
}

pub fn unproject(p: Coord<f64>) -> Coordinate {
	Coordinate {
		lon: (p.x / EARTH_RADIUS_M).to_degrees(),
		lat: (2.0 * (p.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2)
			.to_degrees(),
	}
}

/// Mercator lengths are inflated by 1/cos(lat); buffer radii are scaled
/// the same way so they stay true on the ground.
fn local_scale(lat: f64) -> f64 {
	1.0 / lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians().cos()
}

fn disk(center: Coord<f64>, radius: f64) -> Polygon<f64> {
	let ring: Vec<(f64, f64)> = (0..DISK_SEGMENTS)
		.map(|step| {
			let angle = std::f64::consts::TAU * step as f64 / DISK_SEGMENTS as f64;

			(center.x + radius * angle.cos(), center.y + radius * angle.sin())
		})
		.collect();

	Polygon::new(LineString::from(ring), Vec::new())
}

fn segment_box(a: Coord<f64>, b: Coord<f64>, radius: f64) -> Option<Polygon<f64>> {
	let dx = b.x - a.x;
	let dy = b.y - a.y;
	let len = (dx * dx + dy * dy).sqrt();

	if len == 0.0 {
		return None;
	}

	let nx = -dy / len * radius;
	let ny = dx / len * radius;

	Some(Polygon::new(
		LineString::from(vec![
			(a.x + nx, a.y + ny),
			(b.x + nx, b.y + ny),
			(b.x - nx, b.y - ny),
			(a.x - nx, a.y - ny),
		]),
		Vec::new(),
	))
}

/// Buffer a single point into a closed disk ring, lon/lat.
pub fn point_buffer(origin: Coordinate, radius_m: f64) -> Vec<Coordinate> {
	let polygon = disk(project(origin), radius_m * local_scale(origin.lat));

	ring_coordinates(&polygon)
}

/// Buffer a polyline into a corridor polygon: the union of one capsule
/// per segment (rectangle plus vertex disks). Self-intersecting routes
/// can union into multiple parts; only the largest-area part is kept.
/// Returns the closed exterior ring in lon/lat, empty for an empty route.
pub fn corridor(route: &[Coordinate], radius_m: f64) -> Vec<Coordinate> {
	let projected: Vec<(Coord<f64>, f64)> =
		route.iter().map(|c| (project(*c), radius_m * local_scale(c.lat))).collect();
	let mut acc: Option<MultiPolygon<f64>> = None;
	let mut merge = |polygon: Polygon<f64>| {
		acc = Some(match acc.take() {
			Some(multi) => multi.union(&MultiPolygon::new(vec![polygon])),
			None => MultiPolygon::new(vec![polygon]),
		});
	};

	for (point, radius) in &projected {
		merge(disk(*point, *radius));
	}
	for pair in projected.windows(2) {
		let radius = (pair[0].1 + pair[1].1) / 2.0;

		if let Some(rectangle) = segment_box(pair[0].0, pair[1].0, radius) {
			merge(rectangle);
		}
	}

	let Some(multi) = acc else {
		return Vec::new();
	};
	let Some(largest) =
		multi.iter().max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
	else {
		return Vec::new();
	};

	ring_coordinates(largest)
}

fn ring_coordinates(polygon: &Polygon<f64>) -> Vec<Coordinate> {
	polygon.exterior().coords().map(|c| unproject(*c)).collect()
}

/// Route polyline projected once for repeated progress lookups.
pub fn route_line(route: &[Coordinate]) -> LineString<f64> {
	LineString::from(route.iter().map(|c| project(*c)).collect::<Vec<_>>())
}

/// Arc length in projected meters from the route start to the closest
/// point of the route. Points that cannot be located sort last.
pub fn route_progress(line: &LineString<f64>, c: Coordinate) -> f64 {
	line.line_locate_point(&Point::from(project(c)))
		.map(|fraction| fraction * line.euclidean_length())
		.unwrap_or(f64::INFINITY)
}

pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
	Point::new(a.lon, a.lat).haversine_distance(&Point::new(b.lon, b.lat))
}

/// True when the ring (lon/lat) contains the coordinate. Used by tests
/// and diagnostics; the index applies the ring natively.
pub fn ring_contains(ring: &[Coordinate], c: Coordinate) -> bool {
	let polygon = Polygon::new(
		LineString::from(ring.iter().map(|p| (p.lon, p.lat)).collect::<Vec<_>>()),
		Vec::new(),
	);

	polygon.contains(&Point::new(c.lon, c.lat))
}

#[cfg(test)]
mod tests {
	use super::*;

	const PADOVA: Coordinate = Coordinate { lon: 11.8768, lat: 45.4064 };

	#[test]
	fn projection_round_trips() {
		let back = unproject(project(PADOVA));

		assert!((back.lon - PADOVA.lon).abs() < 1e-9);
		assert!((back.lat - PADOVA.lat).abs() < 1e-9);
	}

	#[test]
	fn point_buffer_radius_is_true_on_the_ground() {
		let ring = point_buffer(PADOVA, 2_000.0);

		assert_eq!(ring.len(), DISK_SEGMENTS + 1);
		assert_eq!(ring.first(), ring.last());

		for vertex in &ring {
			let distance = haversine_m(PADOVA, *vertex);

			assert!((distance - 2_000.0).abs() < 60.0, "vertex at {distance} m");
		}
	}

	#[test]
	fn corridor_covers_the_route_and_not_the_far_field() {
		let route = [PADOVA, Coordinate { lon: 12.0, lat: 45.44 }];
		let ring = corridor(&route, 1_000.0);

		assert!(ring.len() > 8);
		assert_eq!(ring.first(), ring.last());

		let midpoint = Coordinate {
			lon: (route[0].lon + route[1].lon) / 2.0,
			lat: (route[0].lat + route[1].lat) / 2.0,
		};

		assert!(ring_contains(&ring, route[0]));
		assert!(ring_contains(&ring, route[1]));
		assert!(ring_contains(&ring, midpoint));
		assert!(!ring_contains(&ring, Coordinate { lon: 12.5, lat: 45.9 }));
	}

	#[test]
	fn corridor_of_an_empty_route_is_empty() {
		assert!(corridor(&[], 1_000.0).is_empty());
	}

	#[test]
	fn progress_increases_along_the_route() {
		let route = [
			Coordinate { lon: 11.0, lat: 45.0 },
			Coordinate { lon: 11.5, lat: 45.0 },
			Coordinate { lon: 12.0, lat: 45.0 },
		];
		let line = route_line(&route);
		let near_start = route_progress(&line, Coordinate { lon: 11.05, lat: 45.01 });
		let near_middle = route_progress(&line, Coordinate { lon: 11.5, lat: 44.99 });
		let near_end = route_progress(&line, Coordinate { lon: 11.95, lat: 45.01 });

		assert!(near_start < near_middle);
		assert!(near_middle < near_end);
	}

	#[test]
	fn haversine_matches_a_known_distance() {
		let a = Coordinate { lon: 0.0, lat: 0.0 };
		let b = Coordinate { lon: 1.0, lat: 0.0 };
		let distance = haversine_m(a, b);

		// One degree of longitude at the equator, mean earth radius.
		assert!((distance - 111_195.0).abs() < 200.0);
	}
}
