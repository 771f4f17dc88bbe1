use serde::Serialize;
use serde_json::Value;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
/// Emitted when the reference coordinate is unusable.
pub const NEUTRAL_DISTANCE: &str = "0";

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Coordinate {
	pub lat: f64,
	pub lng: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DistanceExpr {
	pub sql: String,
	/// Why the neutral expression was used, if it was.
	pub failure: Option<String>,
}

/// Parses a degree value given either as a JSON number or a numeric string.
pub fn parse_degrees(raw: &Value) -> Option<f64> {
	let value = match raw {
		Value::Number(number) => number.as_f64(),
		Value::String(text) => text.trim().parse::<f64>().ok(),
		_ => None,
	}?;

	value.is_finite().then_some(value)
}

pub fn parse_coordinate(lat: &Value, lng: &Value) -> Result<Coordinate, String> {
	let Some(lat_deg) = parse_degrees(lat) else {
		return Err(format!("Latitude {lat} is not a number."));
	};
	let Some(lng_deg) = parse_degrees(lng) else {
		return Err(format!("Longitude {lng} is not a number."));
	};

	if !(-90.0..=90.0).contains(&lat_deg) {
		return Err(format!("Latitude {lat_deg} is out of range."));
	}
	if !(-180.0..=180.0).contains(&lng_deg) {
		return Err(format!("Longitude {lng_deg} is out of range."));
	}

	Ok(Coordinate { lat: lat_deg, lng: lng_deg })
}

/// Haversine great-circle distance in whole meters from `origin` to the row at
/// (`lat_column`, `lng_column`).
pub fn haversine_sql(origin: Coordinate, lat_column: &str, lng_column: &str) -> String {
	let Coordinate { lat, lng } = origin;

	format!(
		"ROUND(2 * {EARTH_RADIUS_METERS:.1} * ASIN(SQRT(\
POWER(SIN(RADIANS({lat_column} - ({lat})) / 2), 2) + \
COS(RADIANS({lat})) * COS(RADIANS({lat_column})) * \
POWER(SIN(RADIANS({lng_column} - ({lng})) / 2), 2))))"
	)
}

/// Builds the distance expression, degrading to [`NEUTRAL_DISTANCE`] when the reference
/// coordinate cannot be parsed.
pub fn distance_expression(
	lat: &Value,
	lng: &Value,
	lat_column: &str,
	lng_column: &str,
) -> DistanceExpr {
	match parse_coordinate(lat, lng) {
		Ok(origin) =>
			DistanceExpr { sql: haversine_sql(origin, lat_column, lng_column), failure: None },
		Err(message) => {
			tracing::error!(
				error = %message,
				"Reference coordinate is invalid. Using neutral distance."
			);

			DistanceExpr { sql: NEUTRAL_DISTANCE.to_string(), failure: Some(message) }
		},
	}
}

/// Great-circle distance in meters between two coordinates, matching [`haversine_sql`].
pub fn haversine_meters(a: Coordinate, b: Coordinate) -> f64 {
	let d_lat = (b.lat - a.lat).to_radians();
	let d_lng = (b.lng - a.lng).to_radians();
	let h = (d_lat / 2.0).sin().powi(2)
		+ a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

	(2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()).round()
}
