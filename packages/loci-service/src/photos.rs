//! Photo URLs follow `{images_url}{id:03}{n:02}.jpg` for `n` in `1..=10`.

use serde_json::{Map, Value};

use loci_domain::{plan::PHOTOS_FIELD, score::row_id};

pub const PHOTOS_PER_PLACE: u32 = 10;

pub fn photo_urls(images_url: &str, id: i64) -> Vec<String> {
	(1..=PHOTOS_PER_PLACE).map(|n| format!("{images_url}{id:03}{n:02}.jpg")).collect()
}

pub fn attach_photos(rows: &mut [Map<String, Value>], images_url: &str) {
	for row in rows {
		let photos = match row_id(row) {
			Some(id) => photo_urls(images_url, id).into_iter().map(Value::String).collect(),
			None => Vec::new(),
		};

		row.insert(PHOTOS_FIELD.to_string(), Value::Array(photos));
	}
}
