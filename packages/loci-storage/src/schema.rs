pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_all_places.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_all_places.sql")),
				"tables/002_merchant_category.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_merchant_category.sql")),
				"tables/003_place_merchant_category.sql" => out
					.push_str(include_str!("../../../sql/tables/003_place_merchant_category.sql")),
				"tables/004_tags_overview.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_tags_overview.sql")),
				"tables/005_place_tags.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_place_tags.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
